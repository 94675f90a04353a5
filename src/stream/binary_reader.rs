use crate::error::Error;
use crate::plist::Plist;
use crate::stream::APPLE_EPOCH_OFFSET;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use nom::IResult;
use nom::Parser;
use nom::bytes::complete::{tag, take};
use nom::combinator::map;
use nom::multi::count;
use nom::number::complete::{be_f32, be_f64, be_i64, be_i128, be_u8, be_u16, be_u32, be_u64};
use nom::sequence::preceded;
use tracing::debug;

const HEADER: &[u8] = b"bplist00";
const TRAILER_SIZE: usize = 32;
const MAX_DEPTH: usize = 512;
// decoded objects plus payload bytes allowed per input byte, with a floor
const EXPANSION_FACTOR: usize = 64;
const MIN_EXPANSION_BUDGET: usize = 1 << 20;

#[derive(Debug)]
struct Trailer {
    sort_version: u8,
    offset_int_size: u8,
    object_ref_size: u8,
    num_objects: u64,
    top_object: u64,
    offset_table_start: u64,
}

/// Decoder for `bplist00` buffers.
///
/// Objects live in `[8, offset_table_start)`; every offset and reference is
/// checked against that region and the object count before it is followed.
/// Objects may be shared, so the decoded tree can be far larger than the
/// input; decoding stops once it outgrows a budget proportional to the input.
pub struct BinaryReader<'a> {
    objects: &'a [u8],
    offsets: Vec<usize>,
    object_ref_size: u8,
    in_progress: Vec<bool>,
    budget: usize,
}

fn truncated<'i>(what: &'static str) -> impl Fn(nom::Err<nom::error::Error<&'i [u8]>>) -> Error {
    move |_| Error::TruncatedInput(format!("{what} runs past the end of the input"))
}

fn is_valid_int_size(size: u8) -> bool {
    matches!(size, 1 | 2 | 4 | 8)
}

fn date_from_apple_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    let unix = seconds + APPLE_EPOCH_OFFSET as f64;
    let whole = unix.floor();
    let mut secs = whole as i64;
    let mut nanos = ((unix - whole) * 1e9).round() as u32;
    if nanos >= 1_000_000_000 {
        secs = secs.checked_add(1)?;
        nanos -= 1_000_000_000;
    }
    DateTime::from_timestamp(secs, nanos)
}

impl<'a> BinaryReader<'a> {
    fn parse_bplist_header(input: &[u8]) -> IResult<&[u8], &[u8]> {
        preceded(tag(&b"bplist"[..]), take(2u8)).parse(input)
    }
    //5 unused bytes, then the sort version
    fn parse_trailer(input: &[u8]) -> IResult<&[u8], Trailer> {
        let (
            input,
            (
                _,
                sort_version,
                offset_int_size,
                object_ref_size,
                num_objects,
                top_object,
                offset_table_start,
            ),
        ) = (take(5u8), be_u8, be_u8, be_u8, be_u64, be_u64, be_u64).parse(input)?;
        Ok((
            input,
            Trailer {
                sort_version,
                offset_int_size,
                object_ref_size,
                num_objects,
                top_object,
                offset_table_start,
            },
        ))
    }
    //high nibble is the object type, low nibble its extra info
    fn parse_header(input: &[u8]) -> IResult<&[u8], (u8, u8)> {
        let (input, header) = be_u8.parse(input)?;
        Ok((input, (header >> 4, header & 0x0F)))
    }
    fn parse_sized_uint(input: &[u8], size: u8) -> IResult<&[u8], u64> {
        match size {
            1 => map(be_u8, u64::from).parse(input),
            2 => map(be_u16, u64::from).parse(input),
            4 => map(be_u32, u64::from).parse(input),
            8 => be_u64.parse(input),
            _ => Err(nom::Err::Failure(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Switch,
            ))),
        }
    }
    fn parse_offset_table(input: &[u8], counts: usize, int_size: u8) -> IResult<&[u8], Vec<u64>> {
        count(|i| Self::parse_sized_uint(i, int_size), counts).parse(input)
    }

    fn check_header(data: &[u8]) -> Result<(), Error> {
        match Self::parse_bplist_header(data) {
            Ok((_, b"00")) => Ok(()),
            Ok((_, version)) => Err(Error::Format(format!(
                "unsupported version {:?}",
                String::from_utf8_lossy(version)
            ))),
            Err(_) if !data.is_empty() && HEADER.starts_with(data) => Err(Error::TruncatedInput(
                "input ends inside the header".to_string(),
            )),
            Err(_) => Err(Error::Format("missing bplist magic".to_string())),
        }
    }

    pub fn parse(data: &'a [u8]) -> Result<Plist, Error> {
        Self::check_header(data)?;
        if data.len() < HEADER.len() + TRAILER_SIZE {
            return Err(Error::TruncatedInput(format!(
                "{} bytes cannot hold the header and trailer",
                data.len()
            )));
        }
        let trailer_start = data.len() - TRAILER_SIZE;
        let (_, trailer) =
            Self::parse_trailer(&data[trailer_start..]).map_err(truncated("trailer"))?;
        debug!(
            num_objects = trailer.num_objects,
            top_object = trailer.top_object,
            offset_table_start = trailer.offset_table_start,
            offset_int_size = trailer.offset_int_size,
            object_ref_size = trailer.object_ref_size,
            sort_version = trailer.sort_version,
            "binary plist trailer"
        );
        if !is_valid_int_size(trailer.offset_int_size) {
            return Err(Error::MalformedStructure(format!(
                "offset int size {}",
                trailer.offset_int_size
            )));
        }
        if !is_valid_int_size(trailer.object_ref_size) {
            return Err(Error::MalformedStructure(format!(
                "object ref size {}",
                trailer.object_ref_size
            )));
        }
        if trailer.num_objects == 0 {
            return Err(Error::MalformedStructure("empty object table".to_string()));
        }
        if trailer.top_object >= trailer.num_objects {
            return Err(Error::MalformedStructure(format!(
                "root object {} of {} objects",
                trailer.top_object, trailer.num_objects
            )));
        }
        let table_start = usize::try_from(trailer.offset_table_start).unwrap_or(usize::MAX);
        if table_start < HEADER.len() {
            return Err(Error::MalformedStructure(format!(
                "offset table starts at {table_start}, inside the header"
            )));
        }
        let table_len = usize::try_from(trailer.num_objects)
            .ok()
            .and_then(|n| n.checked_mul(trailer.offset_int_size as usize))
            .ok_or_else(|| {
                Error::MalformedStructure(format!("{} objects", trailer.num_objects))
            })?;
        if table_start
            .checked_add(table_len)
            .is_none_or(|end| end > trailer_start)
        {
            return Err(Error::TruncatedInput(format!(
                "offset table at {table_start} needs {table_len} bytes before the trailer at {trailer_start}"
            )));
        }
        let num_objects = table_len / trailer.offset_int_size as usize;
        let (_, raw_offsets) = Self::parse_offset_table(
            &data[table_start..trailer_start],
            num_objects,
            trailer.offset_int_size,
        )
        .map_err(truncated("offset table"))?;
        let mut offsets = Vec::with_capacity(num_objects);
        for (index, offset) in raw_offsets.into_iter().enumerate() {
            match usize::try_from(offset) {
                Ok(offset) if offset >= HEADER.len() && offset < table_start => offsets.push(offset),
                _ => {
                    return Err(Error::MalformedStructure(format!(
                        "object {index} at offset {offset} lies outside the object table"
                    )));
                }
            }
        }
        let mut reader = BinaryReader {
            objects: &data[..table_start],
            offsets,
            object_ref_size: trailer.object_ref_size,
            in_progress: vec![false; num_objects],
            budget: data.len().saturating_mul(EXPANSION_FACTOR).max(MIN_EXPANSION_BUDGET),
        };
        reader.parse_object(trailer.top_object as usize, 0)
    }

    fn parse_object(&mut self, index: usize, depth: usize) -> Result<Plist, Error> {
        if depth > MAX_DEPTH {
            return Err(Error::MalformedStructure(format!(
                "nesting deeper than {MAX_DEPTH} levels"
            )));
        }
        self.charge(1)?;
        let offset = self.offsets[index];
        let objects = self.objects;
        let input = &objects[offset..];
        let (input, (object_type, extra_info)) =
            Self::parse_header(input).map_err(truncated("object marker"))?;
        let value = match object_type {
            0x0 => Self::parse_singleton(extra_info),
            0x1 => Self::parse_integer(input, extra_info),
            0x2 => Self::parse_float(input, extra_info),
            0x3 => Self::parse_date(input, extra_info),
            0x4 => Self::parse_data(input, extra_info),
            0x5 => Self::parse_ascii_string(input, extra_info),
            0x6 => Self::parse_utf16_string(input, extra_info),
            0x8 => Self::parse_uid(input, extra_info),
            0xA => self.parse_array(index, input, extra_info, depth),
            0xC => Err(Error::UnsupportedValue(format!(
                "set object {index} has no property list equivalent"
            ))),
            0xD => self.parse_dict(index, input, extra_info, depth),
            _ => Err(Error::MalformedStructure(format!(
                "unknown marker 0x{:02X} for object {index} at offset {offset}",
                object_type << 4 | extra_info
            ))),
        }?;
        match &value {
            Plist::String(text) => self.charge(text.len())?,
            Plist::Data(bytes) => self.charge(bytes.len())?,
            _ => {}
        }
        Ok(value)
    }
    fn charge(&mut self, cost: usize) -> Result<(), Error> {
        self.budget = self.budget.checked_sub(cost).ok_or_else(|| {
            Error::MalformedStructure(
                "shared references expand far beyond the input size".to_string(),
            )
        })?;
        Ok(())
    }
    fn parse_singleton(extra_info: u8) -> Result<Plist, Error> {
        match extra_info {
            0x8 => Ok(Plist::Boolean(false)),
            0x9 => Ok(Plist::Boolean(true)),
            0x0 => Err(Error::UnsupportedValue("null object".to_string())),
            0xF => Err(Error::UnsupportedValue("fill object".to_string())),
            _ => Err(Error::MalformedStructure(format!(
                "unknown marker 0x0{extra_info:X}"
            ))),
        }
    }
    fn parse_integer(input: &[u8], extra_info: u8) -> Result<Plist, Error> {
        let (_, value) = match extra_info {
            0 => map(be_u8, i128::from).parse(input),
            1 => map(be_u16, i128::from).parse(input),
            2 => map(be_u32, i128::from).parse(input),
            3 => map(be_i64, i128::from).parse(input),
            4 => be_i128.parse(input),
            _ => {
                return Err(Error::MalformedStructure(format!(
                    "integer of 2^{extra_info} bytes"
                )));
            }
        }
        .map_err(truncated("integer"))?;
        Ok(Plist::Integer(value))
    }
    fn parse_float(input: &[u8], extra_info: u8) -> Result<Plist, Error> {
        let (_, value) = match extra_info {
            2 => map(be_f32, f64::from).parse(input),
            3 => be_f64.parse(input),
            _ => {
                return Err(Error::MalformedStructure(format!(
                    "real of 2^{extra_info} bytes"
                )));
            }
        }
        .map_err(truncated("real"))?;
        Ok(Plist::Float(value))
    }
    fn parse_date(input: &[u8], extra_info: u8) -> Result<Plist, Error> {
        if extra_info != 3 {
            return Err(Error::MalformedStructure(format!(
                "date of 2^{extra_info} bytes"
            )));
        }
        let (_, seconds_since_2001) = be_f64.parse(input).map_err(truncated("date"))?;
        if !seconds_since_2001.is_finite() {
            return Err(Error::MalformedStructure(format!(
                "date {seconds_since_2001}"
            )));
        }
        date_from_apple_seconds(seconds_since_2001)
            .map(Plist::Date)
            .ok_or_else(|| {
                Error::MalformedStructure(format!("date {seconds_since_2001} is out of range"))
            })
    }
    //a low nibble of 0xF means the length follows as an integer object
    fn parse_length(input: &[u8], extra_info: u8) -> Result<(&[u8], usize), Error> {
        if extra_info != 0xF {
            return Ok((input, extra_info as usize));
        }
        let (input, (object_type, size_exp)) =
            Self::parse_header(input).map_err(truncated("length marker"))?;
        if object_type != 0x1 || size_exp > 3 {
            return Err(Error::MalformedStructure(format!(
                "invalid length marker 0x{:02X}",
                object_type << 4 | size_exp
            )));
        }
        let (input, len) =
            Self::parse_sized_uint(input, 1 << size_exp).map_err(truncated("length"))?;
        let len = usize::try_from(len)
            .map_err(|_| Error::MalformedStructure(format!("length {len}")))?;
        Ok((input, len))
    }
    fn parse_data(input: &[u8], extra_info: u8) -> Result<Plist, Error> {
        let (input, len) = Self::parse_length(input, extra_info)?;
        let (_, data) = take(len).parse(input).map_err(truncated("data"))?;
        Ok(Plist::Data(data.to_vec()))
    }
    //one byte per character, read as Latin-1
    fn parse_ascii_string(input: &[u8], extra_info: u8) -> Result<Plist, Error> {
        let (input, len) = Self::parse_length(input, extra_info)?;
        let (_, str_bytes): (_, &[u8]) = take(len).parse(input).map_err(truncated("string"))?;
        Ok(Plist::String(str_bytes.iter().copied().map(char::from).collect()))
    }
    fn parse_utf16_string(input: &[u8], extra_info: u8) -> Result<Plist, Error> {
        let (input, len) = Self::parse_length(input, extra_info)?;
        let (_, raw_utf16) = count(be_u16, len)
            .parse(input)
            .map_err(truncated("string"))?;
        let str_value = String::from_utf16(&raw_utf16)
            .map_err(|e| Error::MalformedStructure(format!("UTF-16 string: {e}")))?;
        Ok(Plist::String(str_value))
    }
    fn parse_uid(input: &[u8], extra_info: u8) -> Result<Plist, Error> {
        let len = extra_info as usize + 1;
        if len > 8 {
            return Err(Error::MalformedStructure(format!("uid of {len} bytes")));
        }
        let (_, bytes): (_, &[u8]) = take(len).parse(input).map_err(truncated("uid"))?;
        let value = bytes
            .iter()
            .fold(0u64, |value, byte| value << 8 | u64::from(*byte));
        Ok(Plist::Uid(value))
    }
    fn parse_refs<'i>(&self, input: &'i [u8], counts: usize) -> Result<(&'i [u8], Vec<usize>), Error> {
        let (input, refs) = count(|i| Self::parse_sized_uint(i, self.object_ref_size), counts)
            .parse(input)
            .map_err(truncated("object references"))?;
        let refs = refs
            .into_iter()
            .map(|object_ref| match usize::try_from(object_ref) {
                Ok(index) if index < self.offsets.len() => Ok(index),
                _ => Err(Error::MalformedStructure(format!(
                    "reference to object {object_ref} of {}",
                    self.offsets.len()
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok((input, refs))
    }
    fn enter(&mut self, index: usize) -> Result<(), Error> {
        if std::mem::replace(&mut self.in_progress[index], true) {
            return Err(Error::MalformedStructure(format!(
                "object {index} contains itself"
            )));
        }
        Ok(())
    }
    fn leave(&mut self, index: usize) {
        self.in_progress[index] = false;
    }
    fn parse_array(
        &mut self,
        index: usize,
        input: &[u8],
        extra_info: u8,
        depth: usize,
    ) -> Result<Plist, Error> {
        let (input, counts) = Self::parse_length(input, extra_info)?;
        let (_, refs) = self.parse_refs(input, counts)?;
        self.enter(index)?;
        let mut array = Vec::with_capacity(refs.len());
        for object_ref in refs {
            array.push(self.parse_object(object_ref, depth + 1)?);
        }
        self.leave(index);
        Ok(Plist::Array(array))
    }
    //all key refs first, then all value refs
    fn parse_dict(
        &mut self,
        index: usize,
        input: &[u8],
        extra_info: u8,
        depth: usize,
    ) -> Result<Plist, Error> {
        let (input, counts) = Self::parse_length(input, extra_info)?;
        let (input, key_refs) = self.parse_refs(input, counts)?;
        let (_, value_refs) = self.parse_refs(input, counts)?;
        self.enter(index)?;
        let mut dict = IndexMap::with_capacity(counts);
        for (key_ref, value_ref) in key_refs.into_iter().zip(value_refs) {
            let key = match self.parse_object(key_ref, depth + 1)? {
                Plist::String(key) => key,
                other => {
                    return Err(Error::MalformedStructure(format!(
                        "dictionary {index} has a non-string key {other:?}"
                    )));
                }
            };
            if dict.contains_key(&key) {
                return Err(Error::MalformedStructure(format!(
                    "dictionary {index} repeats key {key:?}"
                )));
            }
            let value = self.parse_object(value_ref, depth + 1)?;
            dict.insert(key, value);
        }
        self.leave(index);
        Ok(Plist::Dictionary(dict))
    }
}

#[cfg(test)]
mod binary_reader_test {
    use crate::error::Error;
    use crate::plist::Plist;
    use crate::stream::binary_reader::BinaryReader;
    use chrono::{DateTime, Utc};

    /// Lays `objects` out after the header with one-byte offsets and refs.
    fn bplist(objects: &[&[u8]], top: u64) -> Vec<u8> {
        let mut data = b"bplist00".to_vec();
        let mut offsets = vec![];
        for object in objects {
            offsets.push(data.len() as u8);
            data.extend_from_slice(object);
        }
        let offset_table_start = data.len() as u64;
        data.extend(offsets);
        data.extend([0u8; 6]);
        data.extend([1u8, 1u8]);
        data.extend((objects.len() as u64).to_be_bytes());
        data.extend(top.to_be_bytes());
        data.extend(offset_table_start.to_be_bytes());
        data
    }

    #[test]
    fn test_parse_scalars() {
        assert_eq!(BinaryReader::parse(&bplist(&[&[0x09]], 0)).unwrap(), Plist::Boolean(true));
        assert_eq!(BinaryReader::parse(&bplist(&[&[0x08]], 0)).unwrap(), Plist::Boolean(false));
        assert_eq!(BinaryReader::parse(&bplist(&[&[0x10, 0xFF]], 0)).unwrap(), Plist::Integer(255));
        assert_eq!(
            BinaryReader::parse(&bplist(&[&[0x11, 0x01, 0x00]], 0)).unwrap(),
            Plist::Integer(256)
        );
        assert_eq!(
            BinaryReader::parse(&bplist(&[&[0x13, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]], 0))
                .unwrap(),
            Plist::Integer(-1)
        );
        let mut big = vec![0x14];
        big.extend(u128::from(u64::MAX).to_be_bytes());
        assert_eq!(
            BinaryReader::parse(&bplist(&[&big], 0)).unwrap(),
            Plist::Integer(u64::MAX as i128)
        );
        let mut real = vec![0x22];
        real.extend(1.5f32.to_be_bytes());
        assert_eq!(BinaryReader::parse(&bplist(&[&real], 0)).unwrap(), Plist::Float(1.5));
        assert_eq!(
            BinaryReader::parse(&bplist(&[&[0x43, 1, 2, 3]], 0)).unwrap(),
            Plist::Data(vec![1, 2, 3])
        );
        assert_eq!(
            BinaryReader::parse(&bplist(&[&[0x80, 0x07]], 0)).unwrap(),
            Plist::Uid(7)
        );
    }

    #[test]
    fn test_parse_strings() {
        assert_eq!(
            BinaryReader::parse(&bplist(&[b"\x53abc"], 0)).unwrap(),
            Plist::from("abc")
        );
        let mut utf16 = vec![0x65];
        for unit in "héllo".encode_utf16() {
            utf16.extend(unit.to_be_bytes());
        }
        assert_eq!(
            BinaryReader::parse(&bplist(&[&utf16], 0)).unwrap(),
            Plist::from("héllo")
        );
        let mut long = vec![0x5F, 0x10, 20];
        long.extend([b'x'; 20]);
        assert_eq!(
            BinaryReader::parse(&bplist(&[&long], 0)).unwrap(),
            Plist::from("x".repeat(20))
        );
        // lone surrogate
        assert!(matches!(
            BinaryReader::parse(&bplist(&[&[0x61, 0xD8, 0x00]], 0)),
            Err(Error::MalformedStructure(_))
        ));
    }

    #[test]
    fn test_parse_date() {
        let mut date = vec![0x33];
        date.extend(745_553_090.0f64.to_be_bytes());
        let expected: DateTime<Utc> = "2024-08-17T02:04:50Z".parse().unwrap();
        assert_eq!(BinaryReader::parse(&bplist(&[&date], 0)).unwrap(), Plist::Date(expected));

        let mut date = vec![0x33];
        date.extend(f64::NAN.to_be_bytes());
        assert!(matches!(
            BinaryReader::parse(&bplist(&[&date], 0)),
            Err(Error::MalformedStructure(_))
        ));
    }

    #[test]
    fn test_parse_containers_keep_order() {
        // {"b": [1, 2], "a": true}
        let data = bplist(
            &[&[0xD2, 1, 2, 3, 4], b"\x51b", b"\x51a", &[0xA2, 5, 6], &[0x09], &[0x10, 1], &[0x10, 2]],
            0,
        );
        let value = BinaryReader::parse(&data).unwrap();
        let dict = value.as_dictionary().unwrap();
        assert_eq!(dict.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(dict["b"], Plist::Array(vec![Plist::Integer(1), Plist::Integer(2)]));
        assert_eq!(dict["a"], Plist::Boolean(true));
    }

    #[test]
    fn test_shared_objects_are_not_cycles() {
        let data = bplist(&[&[0xA2, 1, 1], &[0x09]], 0);
        assert_eq!(
            BinaryReader::parse(&data).unwrap(),
            Plist::Array(vec![Plist::Boolean(true), Plist::Boolean(true)])
        );
    }

    #[test]
    fn test_bad_header() {
        assert!(matches!(BinaryReader::parse(b""), Err(Error::Format(_))));
        assert!(matches!(
            BinaryReader::parse(b"<?xml version=\"1.0\"?><plist/>"),
            Err(Error::Format(_))
        ));
        let mut data = bplist(&[&[0x09]], 0);
        data[6..8].copy_from_slice(b"15");
        assert!(matches!(BinaryReader::parse(&data), Err(Error::Format(_))));
        assert!(matches!(BinaryReader::parse(b"bplist0"), Err(Error::TruncatedInput(_))));
    }

    #[test]
    fn test_truncated() {
        let data = bplist(&[&[0xA2, 1, 2], b"\x53abc", &[0x10, 1]], 0);
        // cut inside the object table
        for len in 8..17 {
            assert!(
                matches!(BinaryReader::parse(&data[..len]), Err(Error::TruncatedInput(_))),
                "cut at {len}"
            );
        }
        for len in 17..data.len() {
            assert!(BinaryReader::parse(&data[..len]).is_err(), "cut at {len}");
        }
        // payload running into the offset table
        let data = bplist(&[b"\x55abc"], 0);
        assert!(matches!(BinaryReader::parse(&data), Err(Error::TruncatedInput(_))));
        // array refs running into the offset table
        let data = bplist(&[&[0xA4, 0, 0]], 0);
        assert!(matches!(BinaryReader::parse(&data), Err(Error::TruncatedInput(_))));
    }

    #[test]
    fn test_malformed_structure() {
        // reference past the object count
        let data = bplist(&[&[0xA1, 5]], 0);
        assert!(matches!(BinaryReader::parse(&data), Err(Error::MalformedStructure(_))));
        // array containing itself
        let data = bplist(&[&[0xA1, 0]], 0);
        assert!(matches!(BinaryReader::parse(&data), Err(Error::MalformedStructure(_))));
        // indirect cycle
        let data = bplist(&[&[0xA1, 1], &[0xA1, 0]], 0);
        assert!(matches!(BinaryReader::parse(&data), Err(Error::MalformedStructure(_))));
        // integer key
        let data = bplist(&[&[0xD1, 1, 1], &[0x10, 1]], 0);
        assert!(matches!(BinaryReader::parse(&data), Err(Error::MalformedStructure(_))));
        // root index past the object count
        let data = bplist(&[&[0x09]], 3);
        assert!(matches!(BinaryReader::parse(&data), Err(Error::MalformedStructure(_))));
        // offset pointing into the offset table
        let mut data = bplist(&[&[0x09]], 0);
        data[9] = 9;
        assert!(matches!(BinaryReader::parse(&data), Err(Error::MalformedStructure(_))));
        // unknown marker
        let data = bplist(&[&[0x70]], 0);
        assert!(matches!(BinaryReader::parse(&data), Err(Error::MalformedStructure(_))));
        // ref size of 3
        let mut data = bplist(&[&[0x09]], 0);
        let ref_size = data.len() - 25;
        data[ref_size] = 3;
        assert!(matches!(BinaryReader::parse(&data), Err(Error::MalformedStructure(_))));
    }

    #[test]
    fn test_deep_nesting() {
        // 599 arrays each holding the next one, two-byte offsets and refs
        let mut data = b"bplist00".to_vec();
        let mut offsets = vec![];
        for i in 0..600u16 {
            offsets.push(data.len() as u16);
            if i < 599 {
                data.push(0xA1);
                data.extend((i + 1).to_be_bytes());
            } else {
                data.push(0x09);
            }
        }
        let offset_table_start = data.len() as u64;
        for offset in offsets {
            data.extend(offset.to_be_bytes());
        }
        data.extend([0u8; 6]);
        data.extend([2u8, 2u8]);
        data.extend(600u64.to_be_bytes());
        data.extend(0u64.to_be_bytes());
        data.extend(offset_table_start.to_be_bytes());
        assert!(matches!(BinaryReader::parse(&data), Err(Error::MalformedStructure(_))));
    }

    #[test]
    fn test_shared_reference_expansion_is_bounded() {
        // each array holds its successor twice: 2^40 leaves from ~200 bytes
        let levels = 40u8;
        let mut objects: Vec<Vec<u8>> = (0..levels).map(|i| vec![0xA2, i + 1, i + 1]).collect();
        objects.push(vec![0x09]);
        let objects: Vec<&[u8]> = objects.iter().map(Vec::as_slice).collect();
        let data = bplist(&objects, 0);
        assert!(data.len() < 256);
        assert!(matches!(BinaryReader::parse(&data), Err(Error::MalformedStructure(_))));

        // a handful of doublings stays within the budget
        let mut objects: Vec<Vec<u8>> = (0..8u8).map(|i| vec![0xA2, i + 1, i + 1]).collect();
        objects.push(vec![0x09]);
        let objects: Vec<&[u8]> = objects.iter().map(Vec::as_slice).collect();
        assert!(BinaryReader::parse(&bplist(&objects, 0)).is_ok());
    }

    #[test]
    fn test_repeated_dictionary_key() {
        // {"a": 1, "a": 2}
        let data = bplist(&[&[0xD2, 1, 1, 2, 3], b"\x51a", &[0x10, 1], &[0x10, 2]], 0);
        assert!(matches!(BinaryReader::parse(&data), Err(Error::MalformedStructure(_))));
    }

    #[test]
    fn test_unsupported_objects() {
        assert!(matches!(
            BinaryReader::parse(&bplist(&[&[0x00]], 0)),
            Err(Error::UnsupportedValue(_))
        ));
        assert!(matches!(
            BinaryReader::parse(&bplist(&[&[0xC1, 1], &[0x09]], 0)),
            Err(Error::UnsupportedValue(_))
        ));
    }
}
