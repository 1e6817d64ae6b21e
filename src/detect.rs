//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! # Format detection façade.
//!
//! Sniffs the head of a byte buffer and dispatches to the binary or
//! XML reader. See `SPEC_FULL.md` §4.4.

use std::fs;
use std::path::Path;

use crate::binary;
use crate::error::Result;
use crate::node::Node;
use crate::xml;

const BINARY_MAGIC: &[u8] = b"bplist00";

/// Parses a plist document from an in-memory buffer, detecting whether it
/// is binary or XML from its first few bytes.
///
/// Returns `Error::UnknownFormat` if neither magic is recognised.
pub fn read_plist(bytes: &[u8]) -> Result<Node> {
    let head = &bytes[..bytes.len().min(8)];
    if head == BINARY_MAGIC {
        return binary::from_bytes(bytes);
    }

    let head_lower: Vec<u8> = head.iter().map(|b| b.to_ascii_lowercase()).collect();
    if head_lower.starts_with(b"<?xml") || head_lower.starts_with(b"<!doc") {
        return xml::from_bytes(bytes);
    }

    Err(crate::error::Error::UnknownFormat)
}

/// Reads and parses a plist document from a file path.
pub fn read_plist_from_path(path: impl AsRef<Path>) -> Result<Node> {
    let bytes = fs::read(path)?;
    read_plist(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_s7_not_a_plist_is_unknown_format() {
        let bytes = b"<not-a-plist/>";
        assert!(matches!(read_plist(bytes), Err(Error::UnknownFormat)));
    }

    #[test]
    fn test_empty_input_is_unknown_format() {
        assert!(matches!(read_plist(&[]), Err(Error::UnknownFormat)));
    }

    #[test]
    fn test_xml_declaration_is_detected() {
        let xml = br#"<?xml version="1.0"?><plist><true/></plist>"#;
        assert_eq!(read_plist(xml).unwrap(), crate::node::Node::Boolean(true));
    }

    #[test]
    fn test_doctype_prefix_is_detected_case_insensitively() {
        let xml = br#"<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd"><plist><false/></plist>"#;
        assert_eq!(read_plist(xml).unwrap(), crate::node::Node::Boolean(false));
    }
}
