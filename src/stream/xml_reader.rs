use crate::error::Error;
use crate::plist::Plist;
use crate::stream::xml_writer::DATE_FORMAT;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, NaiveDateTime, Utc};
use indexmap::IndexMap;
use nom::IResult;
use nom::Parser;
use nom::branch::alt;
use nom::bytes::complete::{is_not, tag, take_until};
use nom::character::complete::{char, digit1, multispace0};
use nom::combinator::{eof, map, map_res, opt, recognize, value};
use nom::multi::many0;
use nom::sequence::{delimited, pair, terminated};

/// Resolves the predefined entities and numeric character references.
fn unescape(text: &str) -> Result<String, Error> {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        output.push_str(&rest[..start]);
        let end = rest[start..]
            .find(';')
            .map(|end| start + end)
            .ok_or_else(|| Error::Xml(format!("unterminated entity in {text:?}")))?;
        let entity = &rest[start + 1..end];
        let c = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .map(|hex| u32::from_str_radix(hex, 16))
                .or_else(|| entity.strip_prefix('#').map(str::parse::<u32>))
                .and_then(Result::ok)
                .and_then(char::from_u32),
        };
        output.push(c.ok_or_else(|| Error::Xml(format!("unknown entity &{entity};")))?);
        rest = &rest[end + 1..];
    }
    output.push_str(rest);
    Ok(output)
}

fn parse_date_text(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, DATE_FORMAT)
        .map(|naive| naive.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(text).map(|date| date.with_timezone(&Utc)))
}

pub struct XmlReader {}
impl XmlReader {
    fn parse_key(input: &str) -> IResult<&str, String> {
        let (input, _) = multispace0(input)?;
        map_res(
            delimited(tag("<key>"), take_until("<"), tag("</key>")),
            unescape,
        )
        .parse(input)
    }
    fn parse_string(input: &str) -> IResult<&str, String> {
        if input.starts_with("<string/>") {
            return value(String::new(), tag("<string/>")).parse(input);
        }
        map_res(
            delimited(tag("<string>"), take_until("<"), tag("</string>")),
            unescape,
        )
        .parse(input)
    }
    fn parse_float(input: &str) -> IResult<&str, f64> {
        map_res(
            delimited(tag("<real>"), take_until("<"), tag("</real>")),
            |text: &str| text.trim().parse::<f64>(),
        )
        .parse(input)
    }
    fn parse_date(input: &str) -> IResult<&str, DateTime<Utc>> {
        map_res(
            delimited(tag("<date>"), take_until("<"), tag("</date>")),
            parse_date_text,
        )
        .parse(input)
    }
    fn parse_data(input: &str) -> IResult<&str, Vec<u8>> {
        if input.starts_with("<data/>") {
            return value(vec![], tag("<data/>")).parse(input);
        }
        map_res(
            delimited(tag("<data>"), take_until("<"), tag("</data>")),
            |text: &str| {
                let encoded: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
                STANDARD.decode(encoded)
            },
        )
        .parse(input)
    }
    fn parse_integer(input: &str) -> IResult<&str, i128> {
        map_res(
            delimited(
                pair(tag("<integer>"), multispace0),
                recognize(pair(opt(alt((char('-'), char('+')))), digit1)),
                pair(multispace0, tag("</integer>")),
            ),
            |s: &str| s.parse(),
        )
        .parse(input)
    }
    fn parse_boolean(input: &str) -> IResult<&str, bool> {
        alt((value(true, tag("<true/>")), value(false, tag("<false/>")))).parse(input)
    }

    fn parse_dict(input: &str) -> IResult<&str, IndexMap<String, Plist>> {
        if input.starts_with("<dict/>") {
            return value(IndexMap::new(), tag("<dict/>")).parse(input);
        }
        let (input, _) = tag("<dict>").parse(input)?;
        let (input, values) = many0((Self::parse_key, Self::parse_value)).parse(input)?;
        let (input, _) = (multispace0, tag("</dict>")).parse(input)?;
        Ok((input, values.into_iter().collect()))
    }
    fn parse_array(input: &str) -> IResult<&str, Vec<Plist>> {
        if input.starts_with("<array/>") {
            return value(vec![], tag("<array/>")).parse(input);
        }
        let (input, _) = tag("<array>").parse(input)?;
        let (input, values) = many0(Self::parse_value).parse(input)?;
        let (input, _) = (multispace0, tag("</array>")).parse(input)?;
        Ok((input, values))
    }
    fn parse_value(input: &str) -> IResult<&str, Plist> {
        let (input, _) = multispace0(input)?;
        if input.starts_with("<string") {
            map(Self::parse_string, Plist::String).parse(input)
        } else if input.starts_with("<real>") {
            map(Self::parse_float, Plist::Float).parse(input)
        } else if input.starts_with("<date>") {
            map(Self::parse_date, Plist::Date).parse(input)
        } else if input.starts_with("<data") {
            map(Self::parse_data, Plist::Data).parse(input)
        } else if input.starts_with("<integer>") {
            map(Self::parse_integer, Plist::Integer).parse(input)
        } else if input.starts_with("<true") || input.starts_with("<false") {
            map(Self::parse_boolean, Plist::Boolean).parse(input)
        } else if input.starts_with("<dict") {
            map(Self::parse_dict, Plist::Dictionary).parse(input)
        } else {
            map(Self::parse_array, Plist::Array).parse(input)
        }
    }
    fn parse_document(input: &str) -> IResult<&str, Plist> {
        let (input, _) = take_until("<plist").parse(input)?; //skip <?xml version="1.0" encoding="UTF-8"?> and DOCTYPE
        let (input, _) = terminated(is_not(">"), tag(">")).parse(input)?; //skip <plist ..>
        let (input, value) = Self::parse_value(input)?;
        let (input, _) = (multispace0, tag("</plist>"), multispace0, eof).parse(input)?;
        Ok((input, value))
    }
    pub fn parse(input: &[u8]) -> Result<Plist, Error> {
        let input = std::str::from_utf8(input).map_err(|e| Error::Xml(e.to_string()))?;
        let (_, value) = Self::parse_document(input)?;
        Ok(value)
    }
}
