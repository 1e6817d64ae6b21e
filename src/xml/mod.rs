//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! # The XML plist reader.
//!
//! A conventional SAX-style walk over the Apple PLIST 1.0 DTD,
//! producing the same `Node` tree the binary reader produces. See
//! `SPEC_FULL.md` §4.3.

use quick_xml::Reader;
use quick_xml::events::Event;
use time::format_description::well_known::Rfc3339;

use crate::error::{Error, Result};
use crate::node::{Date, Dictionary, Node, Number};

/// Seconds from the Unix epoch to the Core Data epoch (2001-01-01T00:00:00Z),
/// the zero point every plist date is expressed relative to.
const CORE_DATA_EPOCH_UNIX_SECONDS: i64 = 978_307_200;

fn xml_err(e: quick_xml::Error) -> Error {
    Error::malformed(e.to_string())
}

/// Parses a complete XML plist document into a `Node` tree.
pub fn from_bytes(input: &[u8]) -> Result<Node> {
    let mut reader = Reader::from_reader(input);
    reader.trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event(&mut buf).map_err(xml_err)? {
            Event::Start(ref e) if e.name() == b"plist" => break,
            Event::Empty(ref e) if e.name() == b"plist" => {
                return Err(Error::malformed("<plist> has no content"));
            }
            Event::Eof => return Err(Error::malformed("no <plist> element found")),
            _ => {}
        }
        buf.clear();
    }
    buf.clear();

    let node = parse_value(&mut reader, &mut buf)?;

    loop {
        match reader.read_event(&mut buf).map_err(xml_err)? {
            Event::End(ref e) if e.name() == b"plist" => break,
            Event::Eof => return Err(Error::malformed("unexpected end of document inside <plist>")),
            _ => {}
        }
        buf.clear();
    }

    Ok(node)
}

/// Reads the next start tag and dispatches on it, returning exactly one value.
fn parse_value(reader: &mut Reader<&[u8]>, buf: &mut Vec<u8>) -> Result<Node> {
    loop {
        let (name, is_empty) = match reader.read_event(buf).map_err(xml_err)? {
            Event::Start(ref e) => (e.name().to_vec(), false),
            Event::Empty(ref e) => (e.name().to_vec(), true),
            Event::End(_) => return Err(Error::malformed("expected a value, found a closing tag")),
            Event::Eof => return Err(Error::malformed("unexpected end of document")),
            Event::Text(_) | Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {
                buf.clear();
                continue;
            }
            _ => {
                buf.clear();
                continue;
            }
        };
        buf.clear();
        return parse_element(reader, buf, &name, is_empty);
    }
}

/// Dispatches a single element (already consumed as `Start` or `Empty`) by tag name.
fn parse_element(reader: &mut Reader<&[u8]>, buf: &mut Vec<u8>, name: &[u8], is_empty: bool) -> Result<Node> {
    match name {
        b"dict" => {
            if is_empty {
                Ok(Node::Dictionary(Dictionary::new()))
            } else {
                parse_dict(reader, buf)
            }
        }
        b"array" => {
            if is_empty {
                Ok(Node::Array(Vec::new()))
            } else {
                parse_array(reader, buf)
            }
        }
        b"true" => {
            if !is_empty {
                consume_end(reader, buf, b"true")?;
            }
            Ok(Node::Boolean(true))
        }
        b"false" => {
            if !is_empty {
                consume_end(reader, buf, b"false")?;
            }
            Ok(Node::Boolean(false))
        }
        b"string" => {
            let text = if is_empty { String::new() } else { read_text_until_end(reader, buf, b"string")? };
            Ok(Node::String(text))
        }
        b"integer" => {
            let text = if is_empty { String::new() } else { read_text_until_end(reader, buf, b"integer")? };
            let value: i64 = text.trim().parse()
                .map_err(|_| Error::malformed(format!("invalid <integer> value `{}`", text)))?;
            Ok(Node::Number(Number::Integer(value)))
        }
        b"real" => {
            let text = if is_empty { String::new() } else { read_text_until_end(reader, buf, b"real")? };
            let value: f64 = text.trim().parse()
                .map_err(|_| Error::malformed(format!("invalid <real> value `{}`", text)))?;
            Ok(Node::Number(Number::from(value)))
        }
        b"date" => {
            let text = if is_empty { String::new() } else { read_text_until_end(reader, buf, b"date")? };
            let parsed = time::OffsetDateTime::parse(text.trim(), &Rfc3339)
                .map_err(|e| Error::malformed(format!("invalid <date> value `{}`: {}", text, e)))?;
            let seconds = (parsed.unix_timestamp() - CORE_DATA_EPOCH_UNIX_SECONDS) as f64
                + (parsed.nanosecond() as f64 / 1_000_000_000.0);
            Ok(Node::Date(Date::from_core_data_epoch_seconds(seconds)))
        }
        b"data" => {
            let text = if is_empty { String::new() } else { read_text_until_end(reader, buf, b"data")? };
            let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = base64::decode(&cleaned)
                .map_err(|e| Error::malformed(format!("invalid base64 <data>: {}", e)))?;
            Ok(Node::Data(bytes))
        }
        other => Err(Error::malformed(format!(
            "unrecognised plist element <{}>", String::from_utf8_lossy(other)
        ))),
    }
}

/// Consumes events up to and including the matching `</name>`, erroring on content.
fn consume_end(reader: &mut Reader<&[u8]>, buf: &mut Vec<u8>, name: &[u8]) -> Result<()> {
    loop {
        match reader.read_event(buf).map_err(xml_err)? {
            Event::End(ref e) if e.name() == name => {
                buf.clear();
                return Ok(());
            }
            Event::Eof => return Err(Error::malformed("unexpected end of document")),
            _ => {}
        }
        buf.clear();
    }
}

/// Reads and concatenates text content up to the matching closing tag.
fn read_text_until_end(reader: &mut Reader<&[u8]>, buf: &mut Vec<u8>, name: &[u8]) -> Result<String> {
    let mut text = String::new();
    loop {
        match reader.read_event(buf).map_err(xml_err)? {
            Event::Text(e) => {
                text.push_str(&e.unescape_and_decode(reader).map_err(xml_err)?);
            }
            Event::CData(e) => {
                text.push_str(&String::from_utf8_lossy(&e));
            }
            Event::End(ref e) if e.name() == name => {
                buf.clear();
                break;
            }
            Event::Eof => return Err(Error::malformed("unexpected end of document")),
            _ => {}
        }
        buf.clear();
    }
    Ok(text)
}

/// Parses a `<dict>` body: alternating `<key>` and value elements.
fn parse_dict(reader: &mut Reader<&[u8]>, buf: &mut Vec<u8>) -> Result<Node> {
    let mut dict = Dictionary::new();
    loop {
        match reader.read_event(buf).map_err(xml_err)? {
            Event::End(ref e) if e.name() == b"dict" => {
                buf.clear();
                break;
            }
            Event::Start(ref e) if e.name() == b"key" => {
                buf.clear();
                let key = read_text_until_end(reader, buf, b"key")?;
                if key.is_empty() {
                    return Err(Error::malformed("dictionary key is empty"));
                }
                let value = parse_value(reader, buf)?;
                if dict.get(&key).is_some() {
                    return Err(Error::malformed(format!("duplicate dictionary key `{}`", key)));
                }
                dict.insert(key, value);
            }
            Event::Empty(ref e) if e.name() == b"key" => {
                return Err(Error::malformed("dictionary key is empty"));
            }
            Event::Text(_) | Event::Comment(_) => {
                buf.clear();
                continue;
            }
            Event::Eof => return Err(Error::malformed("unterminated <dict>")),
            _ => return Err(Error::malformed("expected <key> as a direct child of <dict>")),
        }
        buf.clear();
    }
    Ok(Node::Dictionary(dict))
}

/// Parses an `<array>` body: zero or more value elements.
fn parse_array(reader: &mut Reader<&[u8]>, buf: &mut Vec<u8>) -> Result<Node> {
    let mut items = Vec::new();
    loop {
        let (name, is_empty) = match reader.read_event(buf).map_err(xml_err)? {
            Event::End(ref e) if e.name() == b"array" => {
                buf.clear();
                break;
            }
            Event::Start(ref e) => (e.name().to_vec(), false),
            Event::Empty(ref e) => (e.name().to_vec(), true),
            Event::Text(_) | Event::Comment(_) => {
                buf.clear();
                continue;
            }
            Event::Eof => return Err(Error::malformed("unterminated <array>")),
            _ => {
                buf.clear();
                continue;
            }
        };
        buf.clear();
        items.push(parse_element(reader, buf, &name, is_empty)?);
    }
    Ok(Node::Array(items))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s2_dict_with_integer() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0"><dict><key>k</key><integer>42</integer></dict></plist>"#;
        let node = from_bytes(xml).unwrap();
        let dict = node.as_dict().unwrap();
        assert_eq!(dict.get("k"), Some(&Node::Number(Number::Integer(42))));
    }

    #[test]
    fn test_nested_array_and_string() {
        let xml = br#"<plist><array><string>First</string><string>Second</string></array></plist>"#;
        let node = from_bytes(xml).unwrap();
        assert_eq!(node, Node::Array(vec![
            Node::String("First".to_owned()),
            Node::String("Second".to_owned()),
        ]));
    }

    #[test]
    fn test_booleans_and_empty_containers() {
        let xml = br#"<plist><dict><key>a</key><true/><key>b</key><false/><key>c</key><array/></dict></plist>"#;
        let node = from_bytes(xml).unwrap();
        let dict = node.as_dict().unwrap();
        assert_eq!(dict.get("a"), Some(&Node::Boolean(true)));
        assert_eq!(dict.get("b"), Some(&Node::Boolean(false)));
        assert_eq!(dict.get("c"), Some(&Node::Array(vec![])));
    }

    #[test]
    fn test_real_and_data() {
        let xml = br#"<plist><dict><key>pi</key><real>3.5</real><key>blob</key><data>aGVsbG8=</data></dict></plist>"#;
        let node = from_bytes(xml).unwrap();
        let dict = node.as_dict().unwrap();
        assert_eq!(dict.get("pi").unwrap().as_number_f64().unwrap(), 3.5);
        assert_eq!(dict.get("blob").unwrap().as_bytes().unwrap(), b"hello");
    }

    #[test]
    fn test_date_parses_to_core_data_epoch_offset() {
        let xml = br#"<plist><date>2001-01-01T00:00:00Z</date></plist>"#;
        let node = from_bytes(xml).unwrap();
        assert_eq!(node.as_date().unwrap().seconds_since_epoch, 0.0);
    }

    #[test]
    fn test_dangling_key_is_malformed() {
        let xml = br#"<plist><dict><key>k</key></dict></plist>"#;
        assert!(from_bytes(xml).is_err());
    }

    #[test]
    fn test_empty_key_is_malformed() {
        let xml = br#"<plist><dict><key></key><string>v</string></dict></plist>"#;
        assert!(from_bytes(xml).is_err());
    }

    #[test]
    fn test_unrecognised_element_is_malformed() {
        let xml = br#"<plist><not-a-real-tag/></plist>"#;
        assert!(from_bytes(xml).is_err());
    }

    #[test]
    fn test_duplicate_key_is_malformed() {
        let xml = br#"<plist><dict><key>k</key><integer>1</integer><key>k</key><integer>2</integer></dict></plist>"#;
        assert!(from_bytes(xml).is_err());
    }
}
