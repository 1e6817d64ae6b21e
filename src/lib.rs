//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! Reads Apple property-list documents — binary `bplist00` and XML —
//! and de-flattens NSKeyedArchiver object graphs into a plain tree of
//! plist values, without linking to Apple's runtime.
//!
//! ```no_run
//! let node = nsplist::read_plist_from_path("archive.plist")?;
//! let unarchived = nsplist::unarchive(node, nsplist::UnarchiveOptions::default())?;
//! # Ok::<(), nsplist::Error>(())
//! ```

pub mod binary;
mod detect;
mod error;
pub mod node;
pub mod unarchive;
pub mod xml;

pub use detect::{read_plist, read_plist_from_path};
pub use error::{Error, Result};
pub use node::{Date, Dictionary, Node, Number};
pub use unarchive::{register_class_handler, unarchive, UnarchiveOptions};
