use crate::error::Error;
use crate::stream::binary_reader::BinaryReader;
use crate::stream::binary_writer::BinaryWriter;
use crate::stream::xml_reader::XmlReader;
use crate::stream::xml_writer::XmlWriter;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::io::Write;

/// A property list value.
///
/// Every integer width the binary format knows collapses into `Integer`, and
/// 32-bit reals widen into `Float`. `Uid` only exists in binary plists and has
/// no XML form.
#[derive(Debug, Clone, PartialEq)]
pub enum Plist {
    Array(Vec<Plist>),
    Dictionary(IndexMap<String, Plist>),
    Boolean(bool),
    Integer(i128),
    Float(f64),
    String(String),
    Date(DateTime<Utc>),
    Data(Vec<u8>),
    Uid(u64),
}

impl Plist {
    /// Decodes a `bplist00` buffer.
    pub fn from_binary(data: &[u8]) -> Result<Self, Error> {
        BinaryReader::parse(data)
    }
    pub fn from_xml(data: &[u8]) -> Result<Self, Error> {
        XmlReader::parse(data)
    }
    pub fn to_binary(&self) -> Result<Vec<u8>, Error> {
        let mut output = vec![];
        self.write_binary(&mut output)?;
        Ok(output)
    }
    pub fn write_binary<W: Write>(&self, output: &mut W) -> Result<(), Error> {
        BinaryWriter::new().write(self, output)
    }
    pub fn to_xml(&self) -> Result<String, Error> {
        let mut output = vec![];
        self.write_xml(&mut output)?;
        // the writer only ever emits UTF-8
        String::from_utf8(output).map_err(|e| Error::UnsupportedValue(e.to_string()))
    }
    /// Writes a complete XML document, declaration and DOCTYPE included.
    pub fn write_xml<W: Write>(&self, output: W) -> Result<(), Error> {
        XmlWriter::new(output).write_document(self)
    }

    pub fn as_dictionary(&self) -> Option<&IndexMap<String, Plist>> {
        match self {
            Plist::Dictionary(dict) => Some(dict),
            _ => None,
        }
    }
    pub fn as_array(&self) -> Option<&[Plist]> {
        match self {
            Plist::Array(list) => Some(list),
            _ => None,
        }
    }
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Plist::String(value) => Some(value),
            _ => None,
        }
    }
    pub fn as_integer(&self) -> Option<i128> {
        match self {
            Plist::Integer(value) => Some(*value),
            _ => None,
        }
    }
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Plist::Boolean(value) => Some(*value),
            _ => None,
        }
    }
    /// Looks up `key` when this value is a dictionary.
    pub fn get(&self, key: &str) -> Option<&Plist> {
        self.as_dictionary().and_then(|dict| dict.get(key))
    }
}

impl From<bool> for Plist {
    fn from(value: bool) -> Self {
        Plist::Boolean(value)
    }
}
impl From<i32> for Plist {
    fn from(value: i32) -> Self {
        Plist::Integer(value.into())
    }
}
impl From<i64> for Plist {
    fn from(value: i64) -> Self {
        Plist::Integer(value.into())
    }
}
impl From<u64> for Plist {
    fn from(value: u64) -> Self {
        Plist::Integer(value.into())
    }
}
impl From<f64> for Plist {
    fn from(value: f64) -> Self {
        Plist::Float(value)
    }
}
impl From<&str> for Plist {
    fn from(value: &str) -> Self {
        Plist::String(value.to_string())
    }
}
impl From<String> for Plist {
    fn from(value: String) -> Self {
        Plist::String(value)
    }
}
impl From<Vec<u8>> for Plist {
    fn from(value: Vec<u8>) -> Self {
        Plist::Data(value)
    }
}
impl From<DateTime<Utc>> for Plist {
    fn from(value: DateTime<Utc>) -> Self {
        Plist::Date(value)
    }
}
impl From<Vec<Plist>> for Plist {
    fn from(value: Vec<Plist>) -> Self {
        Plist::Array(value)
    }
}
impl From<IndexMap<String, Plist>> for Plist {
    fn from(value: IndexMap<String, Plist>) -> Self {
        Plist::Dictionary(value)
    }
}
