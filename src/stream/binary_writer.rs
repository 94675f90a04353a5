use crate::error::Error;
use crate::plist::Plist;
use crate::stream::APPLE_EPOCH_OFFSET;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io::Write;
use tracing::debug;

enum Object {
    Array(Vec<u64>),
    Dictionary(Vec<u64>, Vec<u64>),
    // fully encoded scalar
    Scalar(Vec<u8>),
}

/// Encoder for `bplist00` buffers.
///
/// The tree is flattened first (containers before their children, root at
/// index 0) so the reference width is known before any container is encoded.
pub(crate) struct BinaryWriter {
    objects: Vec<Object>,
    scalars: HashMap<Vec<u8>, u64>, // 相同标量只写一次
    ref_size: u8,
    offset_size: u8,
}

fn int_size_for(max: u64) -> u8 {
    if max <= 0xFF {
        1
    } else if max <= 0xFFFF {
        2
    } else if max <= 0xFFFFFFFF {
        4
    } else {
        8
    }
}

fn write_sized_uint(buffer: &mut Vec<u8>, value: u64, size: u8) {
    match size {
        1 => buffer.push(value as u8),
        2 => buffer.extend((value as u16).to_be_bytes()),
        4 => buffer.extend((value as u32).to_be_bytes()),
        _ => buffer.extend(value.to_be_bytes()),
    }
}

impl BinaryWriter {
    pub fn new() -> Self {
        BinaryWriter {
            objects: vec![],
            scalars: HashMap::new(),
            ref_size: 1,
            offset_size: 1,
        }
    }

    pub fn write<W: Write>(mut self, value: &Plist, output: &mut W) -> Result<(), Error> {
        //1. 收集所有对象
        let root = self.collect_objects(value);
        self.ref_size = int_size_for(self.objects.len() as u64);
        //2. 对象区
        let mut body = b"bplist00".to_vec();
        let mut offsets = Vec::with_capacity(self.objects.len());
        for object in &self.objects {
            offsets.push(body.len() as u64);
            match object {
                Object::Scalar(bytes) => body.extend(bytes),
                Object::Array(refs) => {
                    Self::write_marker(&mut body, 0xA, refs.len());
                    self.write_refs(&mut body, refs);
                }
                Object::Dictionary(keys, values) => {
                    Self::write_marker(&mut body, 0xD, keys.len());
                    self.write_refs(&mut body, keys);
                    self.write_refs(&mut body, values);
                }
            }
        }
        //3. 偏移表
        let offset_table_start = body.len() as u64;
        self.offset_size = int_size_for(offsets.last().copied().unwrap_or(0));
        for offset in offsets {
            write_sized_uint(&mut body, offset, self.offset_size);
        }
        //4. 尾部
        body.extend(self.generate_trailer(root, offset_table_start));
        debug!(
            objects = self.objects.len(),
            bytes = body.len(),
            "encoded binary plist"
        );
        output.write_all(&body)?;
        Ok(())
    }

    fn collect_objects(&mut self, value: &Plist) -> u64 {
        match value {
            Plist::Array(list) => {
                let index = self.reserve();
                let refs = list.iter().map(|item| self.collect_objects(item)).collect();
                self.objects[index as usize] = Object::Array(refs);
                index
            }
            Plist::Dictionary(dict) => {
                let index = self.reserve();
                let keys = dict
                    .keys()
                    .map(|key| self.collect_scalar(Self::serialize_string(key)))
                    .collect();
                let values = dict.values().map(|value| self.collect_objects(value)).collect();
                self.objects[index as usize] = Object::Dictionary(keys, values);
                index
            }
            Plist::Boolean(value) => self.collect_scalar(vec![if *value { 0x09 } else { 0x08 }]),
            Plist::Integer(value) => self.collect_scalar(Self::serialize_integer(*value)),
            Plist::Float(value) => self.collect_scalar(Self::serialize_float(*value)),
            Plist::String(value) => self.collect_scalar(Self::serialize_string(value)),
            Plist::Date(value) => self.collect_scalar(Self::serialize_date(*value)),
            Plist::Data(value) => {
                let mut buffer = vec![];
                Self::write_marker(&mut buffer, 0x4, value.len());
                buffer.extend(value);
                self.collect_scalar(buffer)
            }
            Plist::Uid(value) => {
                let bytes = value.to_be_bytes();
                let skip = bytes.iter().take(7).take_while(|b| **b == 0).count();
                let mut buffer = vec![0x80 | (7 - skip) as u8];
                buffer.extend(&bytes[skip..]);
                self.collect_scalar(buffer)
            }
        }
    }
    fn reserve(&mut self) -> u64 {
        self.objects.push(Object::Array(vec![]));
        (self.objects.len() - 1) as u64
    }
    fn collect_scalar(&mut self, bytes: Vec<u8>) -> u64 {
        if let Some(index) = self.scalars.get(&bytes) {
            return *index;
        }
        let index = self.objects.len() as u64;
        self.scalars.insert(bytes.clone(), index);
        self.objects.push(Object::Scalar(bytes));
        index
    }
    fn write_refs(&self, buffer: &mut Vec<u8>, refs: &[u64]) {
        for object_ref in refs {
            write_sized_uint(buffer, *object_ref, self.ref_size);
        }
    }
    // lengths of 15 and more follow the marker as an integer object
    fn write_marker(buffer: &mut Vec<u8>, object_type: u8, len: usize) {
        if len < 0xF {
            buffer.push(object_type << 4 | len as u8);
        } else {
            buffer.push(object_type << 4 | 0x0F);
            buffer.extend(Self::serialize_integer(len as i128));
        }
    }
    fn generate_trailer(&self, root_index: u64, offset_table_start: u64) -> [u8; 32] {
        let mut trailer = [0_u8; 32];
        //未使用区域(6字节)
        trailer[6] = self.offset_size;
        trailer[7] = self.ref_size;
        trailer[8..16].copy_from_slice(&(self.objects.len() as u64).to_be_bytes());
        trailer[16..24].copy_from_slice(&root_index.to_be_bytes());
        trailer[24..32].copy_from_slice(&offset_table_start.to_be_bytes());
        trailer
    }
    fn serialize_string(value: &str) -> Vec<u8> {
        let mut buffer = vec![];
        if value.is_ascii() {
            Self::write_marker(&mut buffer, 0x5, value.len());
            buffer.extend(value.as_bytes());
        } else {
            let units: Vec<u16> = value.encode_utf16().collect();
            Self::write_marker(&mut buffer, 0x6, units.len());
            for unit in units {
                buffer.extend(unit.to_be_bytes());
            }
        }
        buffer
    }
    fn serialize_date(value: DateTime<Utc>) -> Vec<u8> {
        let seconds_since_2001 = (value.timestamp() - APPLE_EPOCH_OFFSET) as f64
            + value.timestamp_subsec_nanos() as f64 / 1e9;
        let mut buffer = vec![0x33];
        buffer.extend(seconds_since_2001.to_be_bytes());
        buffer
    }
    fn serialize_float(value: f64) -> Vec<u8> {
        let as_f32 = value as f32;
        let mut buffer = vec![];
        if (as_f32 as f64) == value {
            // 使用 32-bit 浮点数（无精度丢失）
            buffer.push(0x22);
            buffer.extend(as_f32.to_be_bytes());
        } else {
            buffer.push(0x23);
            buffer.extend(value.to_be_bytes());
        }
        buffer
    }
    // 1/2/4-byte integers are unsigned, 8-byte signed, 16-byte signed 128-bit
    fn serialize_integer(value: i128) -> Vec<u8> {
        let mut buffer = vec![];
        match value {
            0..=0xFF => {
                buffer.push(0x10);
                buffer.push(value as u8);
            }
            0x100..=0xFFFF => {
                buffer.push(0x11);
                buffer.extend((value as u16).to_be_bytes());
            }
            0x10000..=0xFFFFFFFF => {
                buffer.push(0x12);
                buffer.extend((value as u32).to_be_bytes());
            }
            _ if i64::try_from(value).is_ok() => {
                buffer.push(0x13);
                buffer.extend((value as i64).to_be_bytes());
            }
            _ => {
                buffer.push(0x14);
                buffer.extend(value.to_be_bytes());
            }
        }
        buffer
    }
}

#[cfg(test)]
mod binary_writer_test {
    use crate::plist::Plist;
    use chrono::{DateTime, Utc};
    use indexmap::IndexMap;

    #[test]
    fn test_write_true() {
        let bytes = Plist::Boolean(true).to_binary().unwrap();
        let mut expected = b"bplist00".to_vec();
        expected.push(0x09);
        expected.push(8);
        expected.extend([0, 0, 0, 0, 0, 0, 1, 1]);
        expected.extend(1u64.to_be_bytes());
        expected.extend(0u64.to_be_bytes());
        expected.extend(9u64.to_be_bytes());
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_scalars_are_shared() {
        let value = Plist::Array(vec![Plist::from("same"), Plist::from("same"), Plist::from(1)]);
        let bytes = value.to_binary().unwrap();
        // array, "same", 1
        let trailer = &bytes[bytes.len() - 32..];
        assert_eq!(u64::from_be_bytes(trailer[8..16].try_into().unwrap()), 3);
        assert_eq!(Plist::from_binary(&bytes).unwrap(), value);
    }

    #[test]
    fn test_integer_widths() {
        let values = [
            0i128,
            255,
            256,
            65536,
            u32::MAX as i128,
            u32::MAX as i128 + 1,
            i64::MAX as i128,
            u64::MAX as i128,
            -1,
            i64::MIN as i128,
            i128::MIN,
        ];
        let value = Plist::Array(values.iter().map(|v| Plist::Integer(*v)).collect());
        assert_eq!(Plist::from_binary(&value.to_binary().unwrap()).unwrap(), value);
    }

    #[test]
    fn test_wide_refs_and_long_lengths() {
        let list: Vec<Plist> = (0..300).map(|i| Plist::from(format!("item {i}"))).collect();
        let mut dict = IndexMap::new();
        dict.insert("items".to_string(), Plist::Array(list));
        dict.insert("blob".to_string(), Plist::Data(vec![7; 70000]));
        dict.insert("text".to_string(), Plist::from("ü".repeat(40)));
        let value = Plist::Dictionary(dict);
        let bytes = value.to_binary().unwrap();
        let trailer = &bytes[bytes.len() - 32..];
        assert_eq!(trailer[6], 4);
        assert_eq!(trailer[7], 2);
        assert_eq!(Plist::from_binary(&bytes).unwrap(), value);
    }

    #[test]
    fn test_floats_dates_uids() {
        let date: DateTime<Utc> = "2001-01-01T00:00:01.5Z".parse().unwrap();
        let value = Plist::Array(vec![
            Plist::Float(0.5),
            Plist::Float(0.1),
            Plist::Date(date),
            Plist::Uid(0),
            Plist::Uid(0x1234),
        ]);
        let bytes = value.to_binary().unwrap();
        assert_eq!(Plist::from_binary(&bytes).unwrap(), value);
    }
}
