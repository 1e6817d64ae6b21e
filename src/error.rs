//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

use thiserror::Error;

use crate::node::Node;

pub type Result<T> = std::result::Result<T, Error>;

/// Property-list decoding error.
///
/// Every failure mode is surfaced to the caller; nothing is silently
/// coerced or swallowed.
#[derive(Error, Debug)]
pub enum Error {
    /// Underlying read failure (file-opening glue).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The first 8 bytes of the stream matched neither the bplist magic
    /// nor an XML/DOCTYPE prefix.
    #[error("unrecognized plist format")]
    UnknownFormat,

    /// A well-formed-ness violation in either the binary or XML encoding.
    #[error("malformed plist: {0}")]
    MalformedFormat(String),

    /// An NSKeyedArchiver envelope is missing a required key, or a
    /// required key has the wrong type.
    #[error("invalid archive: {0}")]
    InvalidArchive(String),

    /// A node inside an archive violates the shape the archive format
    /// requires of it (e.g. a dictionary dispatched as a class instance
    /// with no `$class`).
    #[error("malformed archive node at `{key}`: {detail}")]
    MalformedNode {
        /// The offending key, or an empty string if not keyed.
        key: String,
        /// Human-readable detail.
        detail: String,
        /// The offending node, for diagnostics.
        node: Box<Node>,
    },

    /// The resolution depth exceeded the limit (100).
    #[error("recursion limit exceeded at depth {depth}")]
    RecursionLimit {
        /// The depth at which the limit was tripped.
        depth: usize,
        /// Whatever was materialized for this object before the limit hit, if anything.
        partial: Option<Box<Node>>,
    },

    /// A typed accessor was called on a `Node` of the wrong variant.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// A typed numeric accessor could not represent the stored value.
    #[error("numeric overflow")]
    NumericOverflow,
}

impl Error {
    /// Convenience constructor for `MalformedFormat`.
    pub fn malformed(detail: impl Into<String>) -> Error {
        Error::MalformedFormat(detail.into())
    }

    /// Convenience constructor for `InvalidArchive`.
    pub fn invalid_archive(detail: impl Into<String>) -> Error {
        Error::InvalidArchive(detail.into())
    }

    /// Convenience constructor for `MalformedNode`.
    pub fn malformed_node(key: impl Into<String>, detail: impl Into<String>, node: Node) -> Error {
        Error::MalformedNode {
            key: key.into(),
            detail: detail.into(),
            node: Box::new(node),
        }
    }
}
