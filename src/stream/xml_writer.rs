use crate::error::Error;
use crate::plist::Plist;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Datelike;
use std::io::Write;

const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
"#;
pub(crate) const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Renders a [`Plist`] as an XML property list, one tab per nesting level.
pub struct XmlWriter<W: Write> {
    output: W,
}

/// Escapes `&`, `<`, `>` and `\r`; other C0 controls cannot appear in XML 1.0.
fn escape_text(text: &str) -> Result<String, Error> {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\r' => escaped.push_str("&#13;"),
            '\t' | '\n' => escaped.push(c),
            c if c < ' ' => {
                return Err(Error::UnsupportedValue(format!(
                    "control character U+{:04X} in {text:?}",
                    c as u32
                )));
            }
            c => escaped.push(c),
        }
    }
    Ok(escaped)
}

fn format_real(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        let sign = if value > 0.0 { "" } else { "-" };
        format!("{sign}inf")
    } else {
        // Debug keeps the shortest representation that parses back exactly
        format!("{value:?}")
    }
}

impl<W: Write> XmlWriter<W> {
    pub fn new(output: W) -> Self {
        XmlWriter { output }
    }

    pub fn write_document(&mut self, value: &Plist) -> Result<(), Error> {
        self.output.write_all(XML_HEADER.as_bytes())?;
        self.write_value(value, 0)?;
        self.output.write_all(b"</plist>\n")?;
        self.output.flush()?;
        Ok(())
    }

    fn write_value(&mut self, value: &Plist, indent: usize) -> Result<(), Error> {
        let indent_str = "\t".repeat(indent);
        match value {
            Plist::Array(list) if list.is_empty() => writeln!(self.output, "{indent_str}<array/>")?,
            Plist::Array(list) => {
                writeln!(self.output, "{indent_str}<array>")?;
                for item in list {
                    self.write_value(item, indent + 1)?;
                }
                writeln!(self.output, "{indent_str}</array>")?;
            }
            Plist::Dictionary(dict) if dict.is_empty() => {
                writeln!(self.output, "{indent_str}<dict/>")?
            }
            Plist::Dictionary(dict) => {
                writeln!(self.output, "{indent_str}<dict>")?;
                for (key, value) in dict {
                    writeln!(self.output, "{indent_str}\t<key>{}</key>", escape_text(key)?)?;
                    self.write_value(value, indent + 1)?;
                }
                writeln!(self.output, "{indent_str}</dict>")?;
            }
            Plist::Boolean(true) => writeln!(self.output, "{indent_str}<true/>")?,
            Plist::Boolean(false) => writeln!(self.output, "{indent_str}<false/>")?,
            Plist::Integer(value) => writeln!(self.output, "{indent_str}<integer>{value}</integer>")?,
            Plist::Float(value) => {
                writeln!(self.output, "{indent_str}<real>{}</real>", format_real(*value))?
            }
            Plist::String(value) => {
                writeln!(self.output, "{indent_str}<string>{}</string>", escape_text(value)?)?
            }
            // the XML date form only has room for four-digit years
            Plist::Date(value) if !(0..=9999).contains(&value.year()) => {
                return Err(Error::UnsupportedValue(format!(
                    "date {value} is outside years 0000-9999"
                )));
            }
            Plist::Date(value) => writeln!(
                self.output,
                "{indent_str}<date>{}</date>",
                value.format(DATE_FORMAT)
            )?,
            Plist::Data(value) => self.write_data(value, &indent_str, indent)?,
            Plist::Uid(value) => {
                return Err(Error::UnsupportedValue(format!(
                    "uid {value} has no XML representation"
                )));
            }
        }
        Ok(())
    }

    // base64 lines sit at the element's own indent and shrink as it grows
    fn write_data(&mut self, value: &[u8], indent_str: &str, indent: usize) -> Result<(), Error> {
        let max_line_length = 76usize.saturating_sub(indent * 8).max(16);
        let chunk_size = max_line_length / 4 * 3;
        writeln!(self.output, "{indent_str}<data>")?;
        for chunk in value.chunks(chunk_size) {
            writeln!(self.output, "{indent_str}{}", STANDARD.encode(chunk))?;
        }
        writeln!(self.output, "{indent_str}</data>")?;
        Ok(())
    }
}
