//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! # The bplist document format.
//!
//! A bplist document is organized into four segments:
//!
//! 1. Header (8 bytes: magic + version).
//! 2. Object Table (variable: concatenation of tagged objects).
//! 3. Offset Table (`num_objects` fixed-width entries).
//! 4. Trailer (32 bytes).
//!
//! # References
//!
//! 1. https://github.com/opensource-apple/CF/blob/master/ForFoundationOnly.h
//! 2. https://opensource.apple.com/source/CF/CF-855.17/CFBinaryPList.c

/// The number of bytes of data required to define a bplist header.
pub const HEADER_SIZE: usize = 8;

/// The bplist magic number ("bplist").
pub const HEADER_MAGIC_NUMBER: &[u8] = &[0x62, 0x70, 0x6C, 0x69, 0x73, 0x74];

/// The bplist version 00 identifier ("00").
pub const HEADER_VERSION_00: (u8, u8) = (0x30, 0x30);

/// Binary property list header.
#[derive(Debug, Eq, PartialEq, Copy, Clone, Hash)]
pub struct Header {
    /// The bplist version as two 8-bit values.
    pub version: (u8, u8),
}

/// Binary property list offset table: element index -> byte offset from file start.
pub type OffsetTable = Vec<usize>;

/// The number of bytes of data required to define a bplist trailer.
pub const TRAILER_SIZE: usize = 32;

/// The number of unused bytes in the trailer preamble.
pub const TRAILER_PREAMBLE_UNUSED_SIZE: usize = 5;

/// Binary property list trailer.
///
/// Contains the information necessary to interpret the preceding
/// document, particularly the size of variably-sized offsets and
/// references.
#[derive(Debug, Eq, PartialEq, Copy, Clone, Hash)]
pub struct Trailer {
    /// The sort version.
    pub sort_version: u8,
    /// Number of bytes needed for each offset table entry.
    pub offset_table_entry_size: usize,
    /// Number of bytes needed for each object reference in a container.
    pub object_reference_size: usize,
    /// Number of objects encoded in the document.
    pub number_of_objects: usize,
    /// Element id of the root object.
    pub root_object: usize,
    /// Offset into the file denoting the start of the offset table.
    pub offset_table_offset: usize,
}

use nom::{
    IResult,
    bytes::complete::{tag, take},
    combinator::map,
    multi::many_m_n,
    number::complete::be_u8,
    sequence::tuple,
};

use crate::binary::utils::be_usize_n;

/// Parses a fixed-sized 8-byte header object from the input slice.
pub fn header(input: &[u8]) -> IResult<&[u8], Header> {
    map(
        tuple((tag(HEADER_MAGIC_NUMBER), be_u8, be_u8)),
        |(_, version_major, version_minor)| Header { version: (version_major, version_minor) },
    )(input)
}

/// Returns a parser for an offset table with the specified number of entries,
/// each of the specified size.
pub fn offset_table(entries: usize, entry_size: usize) -> impl Fn(&[u8]) -> IResult<&[u8], OffsetTable> {
    move |input: &[u8]| many_m_n(entries, entries, be_usize_n(entry_size))(input)
}

/// Parses a fixed-sized 32-byte trailer object from the input array.
pub fn trailer(input: &[u8]) -> IResult<&[u8], Trailer> {
    map(
        tuple((
            take(TRAILER_PREAMBLE_UNUSED_SIZE),
            be_u8,
            be_usize_n(1),
            be_usize_n(1),
            be_usize_n(8),
            be_usize_n(8),
            be_usize_n(8),
        )),
        |(
            _,
            sort_version,
            offset_table_entry_size,
            object_reference_size,
            number_of_objects,
            root_object,
            offset_table_offset,
        )| Trailer {
            sort_version,
            offset_table_entry_size,
            object_reference_size,
            number_of_objects,
            root_object,
            offset_table_offset,
        },
    )(input)
}
