//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! Marker-byte and payload-length parsing for bplist00 tagged objects.
//!
//! Every object begins with a marker byte split into a high nibble
//! (the tag, identifying the object's kind) and a low nibble (either
//! an embedded value, or a payload count, or unused). See
//! `SPEC_FULL.md` §4.2 for the full (type, info) table.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::take,
    combinator::{map, map_res, verify},
    multi::many_m_n,
    number::complete::{be_i64, be_u16, be_u32, be_u8},
    sequence::tuple,
};

use std::convert::TryFrom;

use crate::binary::utils::be_usize_n;

/// The tag encoded in the high nibble of a bplist00 marker byte.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Tag {
    Null,
    BooleanFalse,
    BooleanTrue,
    Integer,
    Real,
    Date,
    Data,
    AsciiString,
    Utf16String,
    Uid,
    Array,
    Dictionary,
}

/// Returns a parser which consumes a marker matching the given high
/// nibble (and, for the singleton tags, the given low nibble too),
/// yielding the tag and the raw low-nibble value.
fn marker(high: u8, low_fixed: Option<u8>) -> impl Fn(&[u8]) -> IResult<&[u8], u8> {
    move |input: &[u8]| {
        map(
            verify(take(1usize), move |b: &[u8]| -> bool {
                let byte = b[0];
                let matches_high = (byte >> 4) == high;
                match low_fixed {
                    Some(low) => matches_high && (byte & 0x0F) == low,
                    None => matches_high,
                }
            }),
            |b: &[u8]| b[0] & 0x0F,
        )(input)
    }
}

/// Parses any recognised marker byte and returns its tag plus the raw low nibble.
pub fn any_marker(input: &[u8]) -> IResult<&[u8], (Tag, u8)> {
    alt((
        map(marker(0x0, Some(0x0)), |low| (Tag::Null, low)),
        map(marker(0x0, Some(0x8)), |low| (Tag::BooleanFalse, low)),
        map(marker(0x0, Some(0x9)), |low| (Tag::BooleanTrue, low)),
        map(marker(0x1, None), |low| (Tag::Integer, low)),
        map(marker(0x2, None), |low| (Tag::Real, low)),
        map(marker(0x3, Some(0x3)), |low| (Tag::Date, low)),
        map(marker(0x4, None), |low| (Tag::Data, low)),
        map(marker(0x5, None), |low| (Tag::AsciiString, low)),
        map(marker(0x6, None), |low| (Tag::Utf16String, low)),
        map(marker(0x8, None), |low| (Tag::Uid, low)),
        map(marker(0xA, None), |low| (Tag::Array, low)),
        map(marker(0xD, None), |low| (Tag::Dictionary, low)),
    ))(input)
}

/// Parses a big-endian signed integer payload of `2^info` bytes, following
/// the marker byte. Widths of 1 and 2 bytes are zero-extended (the format
/// treats them as unsigned); widths of 4, 8 and 16 bytes are sign-extended
/// two's complement.
pub fn integer_payload(info: u8) -> impl Fn(&[u8]) -> IResult<&[u8], i128> {
    move |input: &[u8]| {
        let width = 1usize << info;
        match width {
            1 => map(be_u8, |v| v as i128)(input),
            2 => map(be_u16, |v| v as i128)(input),
            4 => map(be_u32, |v| v as i128)(input),
            8 => map(be_i64, |v| v as i128)(input),
            16 => map(tuple((be_i64, nom::number::complete::be_u64)), |(hi, lo)| {
                ((hi as i128) << 64) | (lo as i128)
            })(input),
            _ => Err(nom::Err::Failure(nom::error::make_error(input, nom::error::ErrorKind::LengthValue))),
        }
    }
}

/// Parses a big-endian IEEE-754 real of `2^info` bytes (4 or 8).
pub fn real_payload(info: u8) -> impl Fn(&[u8]) -> IResult<&[u8], f64> {
    move |input: &[u8]| {
        let width = 1usize << info;
        match width {
            4 => map(nom::number::complete::be_f32, |v| v as f64)(input),
            8 => map(nom::number::complete::be_f64, |v| v)(input),
            _ => Err(nom::Err::Failure(nom::error::make_error(input, nom::error::ErrorKind::LengthValue))),
        }
    }
}

/// Parses the 8-byte big-endian CFAbsoluteTime payload of a date object.
pub fn date_payload(input: &[u8]) -> IResult<&[u8], f64> {
    nom::number::complete::be_f64(input)
}

/// Parses a count value following the given low nibble. If the nibble is
/// `0xF`, the real count is an immediately-following nested integer marker
/// (which must itself be of integer type); otherwise the nibble directly
/// encodes the count.
pub fn payload_count(low_nibble: u8) -> impl Fn(&[u8]) -> IResult<&[u8], usize> {
    move |input: &[u8]| {
        if low_nibble == 0x0F {
            let (input, info) = marker(0x1, None)(input)?;
            map_res(integer_payload(info), |value| usize::try_from(value))(input)
        } else {
            Ok((input, low_nibble as usize))
        }
    }
}

/// Parses `count` fixed-width big-endian object references.
pub fn refs(count: usize, ref_size: usize) -> impl Fn(&[u8]) -> IResult<&[u8], Vec<usize>> {
    assert!(ref_size >= 1 && ref_size <= 8, "object references must be 1 to 8 bytes long");
    move |input: &[u8]| many_m_n(count, count, be_usize_n(ref_size))(input)
}
