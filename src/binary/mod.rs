//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! # The binary plist (`bplist00`) reader.
//!
//! Parses a self-describing tagged binary format with an offset table
//! and size-parameterized object references into a `Node` tree. See
//! `SPEC_FULL.md` §4.2.

pub(crate) mod document;
pub(crate) mod marker;
pub(crate) mod utils;

use std::collections::HashSet;
use std::convert::TryFrom;
use std::ops::Range;

use ascii::AsciiStr;

use crate::error::{Error, Result};
use crate::node::{Date, Dictionary, Node, Number};

use self::document::{
    HEADER_SIZE, HEADER_VERSION_00, OffsetTable, TRAILER_SIZE,
};
use self::marker::Tag;

/// Metadata needed to interpret the object table: where each object
/// lives, how wide a reference is, and which object is the root.
#[derive(Clone, Eq, PartialEq, Debug)]
struct Metadata {
    offset_table: OffsetTable,
    object_reference_size: usize,
    root_object: usize,
    object_table_range: Range<usize>,
}

impl Metadata {
    /// Resolves an object index to its byte offset, bounds-checked
    /// against the offset table's extent (§4.2: `0 <= ref < num_objects`).
    fn offset_of(&self, object: usize) -> Result<usize> {
        self.offset_table
            .get(object)
            .copied()
            .ok_or_else(|| Error::malformed(format!("object reference {} out of range", object)))
    }
}

/// Provides bounds-checked access to objects within the object table.
struct ObjectTable<'a> {
    input: &'a [u8],
    metadata: Metadata,
}

impl<'a> ObjectTable<'a> {
    /// Returns the slice of input starting at the given object, having
    /// checked that its offset both lies within the file and within the
    /// object table's extent (§4.2: `0 <= offset < file_length`).
    fn data_for(&self, object: usize) -> Result<&'a [u8]> {
        let offset = self.metadata.offset_of(object)?;
        if offset >= self.input.len() || !self.metadata.object_table_range.contains(&offset) {
            return Err(Error::malformed(format!("object {} has an out-of-range offset", object)));
        }
        Ok(&self.input[offset..])
    }

    /// Recursively materializes the object at `object` into a `Node`.
    ///
    /// `visiting` guards against a container referencing an ancestor of
    /// itself, which would otherwise recurse without bound; this is a
    /// genuine cycle in the object table (distinct from the legitimate
    /// sharing NSKeyedArchiver relies on, where the *same* object is
    /// referenced from multiple places that are not ancestors of each other).
    fn parse_node(&self, object: usize, visiting: &mut HashSet<usize>) -> Result<Node> {
        let data = self.data_for(object)?;
        let (rest, (tag, low)) = marker::any_marker(data)
            .map_err(|_| Error::malformed(format!("object {} has an unrecognised marker byte", object)))?;

        match tag {
            Tag::Null => Ok(Node::Null),
            Tag::BooleanFalse => Ok(Node::Boolean(false)),
            Tag::BooleanTrue => Ok(Node::Boolean(true)),

            Tag::Integer => {
                let (_, value) = marker::integer_payload(low)(rest)
                    .map_err(|_| Error::malformed(format!("object {} has a truncated integer payload", object)))?;
                let value = i64::try_from(value)
                    .map_err(|_| Error::NumericOverflow)?;
                Ok(Node::Number(Number::Integer(value)))
            }

            Tag::Real => {
                let (_, value) = marker::real_payload(low)(rest)
                    .map_err(|_| Error::malformed(format!("object {} has a truncated real payload", object)))?;
                Ok(Node::Number(Number::from(value)))
            }

            Tag::Date => {
                let (_, seconds) = marker::date_payload(rest)
                    .map_err(|_| Error::malformed(format!("object {} has a truncated date payload", object)))?;
                Ok(Node::Date(Date::from_core_data_epoch_seconds(seconds)))
            }

            Tag::Data => {
                let (input, length) = marker::payload_count(low)(rest)
                    .map_err(|_| Error::malformed(format!("object {} has a truncated data length", object)))?;
                let bytes = input
                    .get(0..length)
                    .ok_or_else(|| Error::malformed(format!("object {} data payload runs past end of file", object)))?;
                Ok(Node::Data(bytes.to_vec()))
            }

            Tag::AsciiString => {
                let (input, length) = marker::payload_count(low)(rest)
                    .map_err(|_| Error::malformed(format!("object {} has a truncated string length", object)))?;
                let bytes = input
                    .get(0..length)
                    .ok_or_else(|| Error::malformed(format!("object {} ascii string runs past end of file", object)))?;
                let ascii = AsciiStr::from_ascii(bytes)
                    .map_err(|_| Error::malformed(format!("object {} is not valid ASCII", object)))?;
                Ok(Node::String(ascii.as_str().to_owned()))
            }

            Tag::Utf16String => {
                let (input, length) = marker::payload_count(low)(rest)
                    .map_err(|_| Error::malformed(format!("object {} has a truncated string length", object)))?;
                let byte_len = length.checked_mul(2)
                    .ok_or_else(|| Error::malformed(format!("object {} string length overflows", object)))?;
                let bytes = input
                    .get(0..byte_len)
                    .ok_or_else(|| Error::malformed(format!("object {} utf16 string runs past end of file", object)))?;
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect();
                let text = String::from_utf16(&units)
                    .map_err(|_| Error::malformed(format!("object {} is not valid UTF-16", object)))?;
                Ok(Node::String(text))
            }

            Tag::Uid => {
                // A UID is only meaningful inside an NSKeyedArchiver envelope, where
                // it is represented as the single-key `{CF$UID: n}` dictionary shape
                // the unarchiver expects (§4.5). The raw bplist object format is an
                // opaque `(low + 1)`-byte big-endian blob.
                let width = (low as usize) + 1;
                let bytes = rest
                    .get(0..width)
                    .ok_or_else(|| Error::malformed(format!("object {} uid payload runs past end of file", object)))?;
                let value = bytes.iter().fold(0u64, |acc, b| (acc << 8) + *b as u64);
                let mut dict = Dictionary::new();
                dict.insert("CF$UID".to_owned(), Node::Number(Number::Integer(value as i64)));
                Ok(Node::Dictionary(dict))
            }

            Tag::Array => {
                if !visiting.insert(object) {
                    return Err(Error::malformed(format!("object {} participates in a reference cycle", object)));
                }
                let (refs_input, length) = marker::payload_count(low)(rest)
                    .map_err(|_| Error::malformed(format!("object {} has a truncated array length", object)))?;
                let (_, refs) = marker::refs(length, self.metadata.object_reference_size)(refs_input)
                    .map_err(|_| Error::malformed(format!("object {} has truncated element references", object)))?;

                let mut items = Vec::with_capacity(refs.len());
                for r in refs {
                    items.push(self.parse_node(r, visiting)?);
                }
                visiting.remove(&object);
                Ok(Node::Array(items))
            }

            Tag::Dictionary => {
                if !visiting.insert(object) {
                    return Err(Error::malformed(format!("object {} participates in a reference cycle", object)));
                }
                let (refs_input, count) = marker::payload_count(low)(rest)
                    .map_err(|_| Error::malformed(format!("object {} has a truncated dictionary length", object)))?;
                let (refs_input, key_refs) = marker::refs(count, self.metadata.object_reference_size)(refs_input)
                    .map_err(|_| Error::malformed(format!("object {} has truncated key references", object)))?;
                let (_, value_refs) = marker::refs(count, self.metadata.object_reference_size)(refs_input)
                    .map_err(|_| Error::malformed(format!("object {} has truncated value references", object)))?;

                let mut dict = Dictionary::new();
                for (key_ref, value_ref) in key_refs.into_iter().zip(value_refs.into_iter()) {
                    let key_node = self.parse_node(key_ref, visiting)?;
                    let key = match key_node {
                        Node::String(s) => s,
                        other => return Err(Error::malformed(format!(
                            "dictionary key for object {} is a {}, not a string", object, other.kind()
                        ))),
                    };
                    if key.is_empty() {
                        return Err(Error::malformed(format!("object {} has an empty dictionary key", object)));
                    }
                    if dict.get(&key).is_some() {
                        return Err(Error::malformed(format!("object {} has duplicate dictionary key `{}`", object, key)));
                    }
                    let value_node = self.parse_node(value_ref, visiting)?;
                    dict.insert(key, value_node);
                }
                visiting.remove(&object);
                Ok(Node::Dictionary(dict))
            }
        }
    }
}

/// Parses the bplist00 metadata (header, trailer, offset table).
fn parse_metadata(input: &[u8]) -> Result<Metadata> {
    if input.len() < HEADER_SIZE + 1 + TRAILER_SIZE {
        return Err(Error::malformed("input too short to contain a bplist00 document"));
    }

    let header_slice = &input[0..HEADER_SIZE];
    let (_, header) = document::header(header_slice)
        .map_err(|_| Error::malformed("missing or invalid bplist00 header"))?;
    if header.version != HEADER_VERSION_00 {
        return Err(Error::malformed("unsupported bplist version"));
    }

    let trailer_slice = &input[input.len() - TRAILER_SIZE..];
    let (_, trailer) = document::trailer(trailer_slice)
        .map_err(|_| Error::malformed("missing or invalid bplist00 trailer"))?;

    if trailer.root_object >= trailer.number_of_objects {
        return Err(Error::malformed("root object index out of range"));
    }
    if trailer.offset_table_entry_size == 0 || trailer.offset_table_entry_size > 8 {
        return Err(Error::malformed("invalid offset table entry size"));
    }
    if trailer.object_reference_size == 0 || trailer.object_reference_size > 8 {
        return Err(Error::malformed("invalid object reference size"));
    }

    let offset_table_start = trailer.offset_table_offset;
    let offset_table_length = trailer.number_of_objects * trailer.offset_table_entry_size;
    if offset_table_start > input.len()
        || offset_table_length > input.len() - offset_table_start
        || (offset_table_start + offset_table_length) > (input.len() - TRAILER_SIZE)
    {
        return Err(Error::malformed("offset table overruns the document"));
    }

    let offset_table_slice = &input[offset_table_start..offset_table_start + offset_table_length];
    let (_, offset_table) = document::offset_table(trailer.number_of_objects, trailer.offset_table_entry_size)(offset_table_slice)
        .map_err(|_| Error::malformed("invalid offset table"))?;

    for &offset in &offset_table {
        if offset >= input.len() {
            return Err(Error::malformed("offset table entry points past end of file"));
        }
    }

    Ok(Metadata {
        offset_table,
        object_reference_size: trailer.object_reference_size,
        root_object: trailer.root_object,
        object_table_range: HEADER_SIZE..offset_table_start,
    })
}

/// Parses a complete `bplist00` document into a `Node` tree.
pub fn from_bytes(input: &[u8]) -> Result<Node> {
    let metadata = parse_metadata(input)?;
    let root_object = metadata.root_object;
    let object_table = ObjectTable { input, metadata };

    tracing::trace!(root_object, "parsing binary plist");
    let mut visiting = HashSet::new();
    object_table.parse_node(root_object, &mut visiting)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bplist(object_table: &[u8], offsets: &[u8], offset_size: u8, ref_size: u8, num_objects: u8, root: u8) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"bplist00");
        buf.extend_from_slice(object_table);
        let offset_table_offset = buf.len() as u64;
        buf.extend_from_slice(offsets);
        // Trailer: 5 unused, sort_version, offset_size, ref_size, num_objects(8), root(8), offset_table_offset(8)
        buf.extend_from_slice(&[0u8; 5]);
        buf.push(0); // sort version
        buf.push(offset_size);
        buf.push(ref_size);
        buf.extend_from_slice(&(num_objects as u64).to_be_bytes());
        buf.extend_from_slice(&(root as u64).to_be_bytes());
        buf.extend_from_slice(&offset_table_offset.to_be_bytes());
        buf
    }

    #[test]
    fn test_s1_boolean_true_document() {
        // A single-object document: object table is just `0x09` (Boolean true).
        let data = bplist(&[0b0000_1001], &[8], 1, 1, 1, 0);
        let node = from_bytes(&data).unwrap();
        assert_eq!(node, Node::Boolean(true));
    }

    #[test]
    fn test_null_object() {
        let data = bplist(&[0b0000_0000], &[8], 1, 1, 1, 0);
        let node = from_bytes(&data).unwrap();
        assert_eq!(node, Node::Null);
    }

    #[test]
    fn test_integer_object() {
        // Object 0: integer, 1-byte payload (0x10 0x2A = 42).
        let data = bplist(&[0b0001_0000, 0x2A], &[8], 1, 1, 1, 0);
        let node = from_bytes(&data).unwrap();
        assert_eq!(node, Node::Number(Number::Integer(42)));
    }

    #[test]
    fn test_ascii_string_object() {
        // "Hi" -> marker 0b0101_0010, then 'H','i'.
        let data = bplist(&[0b0101_0010, b'H', b'i'], &[8], 1, 1, 1, 0);
        let node = from_bytes(&data).unwrap();
        assert_eq!(node, Node::String("Hi".to_owned()));
    }

    #[test]
    fn test_empty_array_object() {
        let data = bplist(&[0b1010_0000], &[8], 1, 1, 1, 0);
        let node = from_bytes(&data).unwrap();
        assert_eq!(node, Node::Array(vec![]));
    }

    #[test]
    fn test_array_of_integers() {
        // Objects: 0 = array(refs 1,2), 1 = integer(1), 2 = integer(2).
        let object_table = [
            0b1010_0010, 0x01, 0x02, // array, 2 elements, refs to objects 1 and 2
            0b0001_0000, 0x01,       // object 1: integer 1
            0b0001_0000, 0x02,       // object 2: integer 2
        ];
        let offsets = [8u8, 11, 13];
        let data = bplist(&object_table, &offsets, 1, 1, 3, 0);
        let node = from_bytes(&data).unwrap();
        assert_eq!(node, Node::Array(vec![
            Node::Number(Number::Integer(1)),
            Node::Number(Number::Integer(2)),
        ]));
    }

    #[test]
    fn test_dictionary_object() {
        // Object 0 = dict {1: 2} where 1 = key "k" (object 1), 2 = value 42 (object 2).
        let object_table = [
            0b1101_0001, 0x01, 0x02, // dict, 1 entry: key ref 1, value ref 2
            0b0101_0001, b'k',       // object 1: ascii "k"
            0b0001_0000, 0x2A,       // object 2: integer 42
        ];
        let offsets = [8u8, 11, 13];
        let data = bplist(&object_table, &offsets, 1, 1, 3, 0);
        let node = from_bytes(&data).unwrap();
        let dict = node.as_dict().unwrap();
        assert_eq!(dict.get("k"), Some(&Node::Number(Number::Integer(42))));
    }

    #[test]
    fn test_cycle_is_detected() {
        // Object 0 is an array whose single element refers back to itself.
        let object_table = [
            0b1010_0001, 0x00, // array, 1 element, ref to object 0
        ];
        let offsets = [8u8];
        let data = bplist(&object_table, &offsets, 1, 1, 1, 0);
        assert!(from_bytes(&data).is_err());
    }

    #[test]
    fn test_duplicate_dictionary_key_rejected() {
        // Object 0 = dict with 2 entries both keyed "k" (object 1).
        let object_table = [
            0b1101_0010, 0x01, 0x01, 0x02, 0x03, // dict, 2 entries: keys [1,1] values [2,3]
            0b0101_0001, b'k',                   // object 1: ascii "k"
            0b0001_0000, 0x01,                   // object 2: integer 1
            0b0001_0000, 0x02,                   // object 3: integer 2
        ];
        let offsets = [8u8, 13, 15, 17];
        let data = bplist(&object_table, &offsets, 1, 1, 4, 0);
        assert!(from_bytes(&data).is_err());
    }

    #[test]
    fn test_out_of_range_reference_is_malformed() {
        // Object 0 is an array referencing nonexistent object 5.
        let object_table = [
            0b1010_0001, 0x05,
        ];
        let offsets = [8u8];
        let data = bplist(&object_table, &offsets, 1, 1, 1, 0);
        assert!(from_bytes(&data).is_err());
    }
}
