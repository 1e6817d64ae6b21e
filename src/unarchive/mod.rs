//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! # The NSKeyedArchiver de-flattener.
//!
//! Consumes a `Node` that is an NSKeyedArchiver envelope and produces
//! a plain `Node` tree, resolving `CF$UID` references, detecting
//! cycles, bounding recursion depth, and dispatching archived classes
//! to built-in or registered handlers. See `SPEC_FULL.md` §4.5, §4.6.

pub(crate) mod registry;

use std::collections::{HashMap, HashSet};
use std::convert::TryFrom;

pub use registry::register_class_handler;

use crate::error::{Error, Result};
use crate::node::{Date, Dictionary, Node};

/// The recursion depth at which `resolve` gives up (§4.5).
const RECURSION_LIMIT: usize = 100;

/// Runtime options controlling unarchiving behaviour.
#[derive(Copy, Clone, Debug)]
pub struct UnarchiveOptions {
    /// When true (the default), a dictionary whose class metadata was
    /// consumed has its `$class` key removed from the output.
    pub remove_class_names: bool,
}

impl Default for UnarchiveOptions {
    fn default() -> Self {
        UnarchiveOptions { remove_class_names: true }
    }
}

/// Unarchives an NSKeyedArchiver envelope into a plain `Node` tree.
pub fn unarchive(node: Node, options: UnarchiveOptions) -> Result<Node> {
    let envelope = node.as_dict()
        .map_err(|_| Error::invalid_archive("envelope is not a dictionary"))?;

    let archiver_name = envelope.get("$archiver")
        .ok_or_else(|| Error::invalid_archive("missing $archiver"))?
        .as_string()
        .map_err(|_| Error::invalid_archive("$archiver is not a string"))?;
    if archiver_name != "NSKeyedArchiver" {
        return Err(Error::invalid_archive(format!("unsupported archiver `{}`", archiver_name)));
    }

    envelope.get("$version")
        .ok_or_else(|| Error::invalid_archive("missing $version"))?
        .as_number_f64()
        .map_err(|_| Error::invalid_archive("$version is not a number"))?;

    let objects: Vec<Node> = envelope.get("$objects")
        .ok_or_else(|| Error::invalid_archive("missing $objects"))?
        .as_array()
        .map_err(|_| Error::invalid_archive("$objects is not an array"))?
        .to_vec();

    let top = envelope.get("$top")
        .ok_or_else(|| Error::invalid_archive("missing $top"))?
        .as_dict()
        .map_err(|_| Error::invalid_archive("$top is not a dictionary"))?
        .clone();

    let mut unarchiver = Unarchiver {
        objects,
        registry: registry::global_snapshot(),
        resolved: HashMap::new(),
        in_flight: HashSet::new(),
        options,
    };

    if top.len() == 1 {
        if let Some(root) = top.get("root") {
            return unarchiver.resolve_node(root.clone(), 0);
        }
    }

    let mut out = Dictionary::new();
    for (key, value) in top.iter() {
        let resolved = unarchiver.resolve_node(value.clone(), 0)?;
        out.insert(key.clone(), resolved);
    }
    Ok(Node::Dictionary(out))
}

struct Unarchiver {
    objects: Vec<Node>,
    registry: registry::Registry,
    resolved: HashMap<usize, Node>,
    in_flight: HashSet<usize>,
    options: UnarchiveOptions,
}

impl Unarchiver {
    /// Resolves a single UID reference, memoizing and cycle-guarding
    /// per the algorithm in §4.5.
    fn resolve_uid(&mut self, index: usize, depth: usize) -> Result<Node> {
        if depth > RECURSION_LIMIT {
            let partial = self.resolved.get(&index).cloned().map(Box::new);
            return Err(Error::RecursionLimit { depth, partial });
        }
        if self.in_flight.contains(&index) {
            tracing::warn!(index, "breaking reference cycle with $ref sentinel");
            return Ok(Node::String(format!("$ref{}", index)));
        }
        if let Some(cached) = self.resolved.get(&index) {
            tracing::debug!(index, "resolved object from cache");
            return Ok(cached.clone());
        }

        self.in_flight.insert(index);
        let raw = self.objects.get(index).cloned()
            .ok_or_else(|| Error::invalid_archive(format!("$objects has no index {}", index)))?;

        tracing::trace!(index, depth, "resolving object");
        let value = self.resolve_node(raw, depth + 1)?;
        self.in_flight.remove(&index);
        self.resolved.insert(index, value.clone());
        Ok(value)
    }

    /// Resolves a node already materialized from the incoming tree:
    /// follows UID references, de-flattens class dictionaries, and
    /// recurses into arrays, passing everything else through.
    fn resolve_node(&mut self, node: Node, depth: usize) -> Result<Node> {
        if let Node::Dictionary(ref dict) = node {
            if let Some(index) = uid_index(dict) {
                return self.resolve_uid(index, depth);
            }
        }

        match node {
            Node::String(ref s) if s == "$null" => Ok(Node::Null),
            Node::Dictionary(dict) => self.resolve_dict(dict, depth),
            Node::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.resolve_node(item, depth)?);
                }
                Ok(Node::Array(out))
            }
            other => Ok(other),
        }
    }

    /// `$class` is required exactly when the dictionary carries any
    /// `NS.*`-prefixed field (§4.5c): that prefix is what marks a
    /// dictionary as an archived class instance rather than plain,
    /// incidental data. A dictionary with neither `$class` nor any
    /// `NS.*` field — such as a `$class` UID's own class-metadata
    /// dictionary, which carries `$classes`/`$classname` instead — is
    /// resolved as an ordinary dictionary.
    fn resolve_dict(&mut self, dict: Dictionary, depth: usize) -> Result<Node> {
        let class_ref = dict.get("$class").cloned();

        let class_ref = match class_ref {
            Some(class_ref) => class_ref,
            None => {
                if dict.keys().any(|k| k.starts_with("NS.")) {
                    return Err(Error::malformed_node(
                        "$class",
                        "archived object has NS.* fields but no $class",
                        Node::Dictionary(dict),
                    ));
                }
                return self.resolve_fields(dict, depth);
            }
        };

        let class_node = self.resolve_node(class_ref, depth)?;
        let class_dict = class_node.as_dict()
            .map_err(|_| Error::malformed_node("$class", "class metadata is not a dictionary", class_node.clone()))?
            .clone();
        let class_name = class_dict.get("$classes")
            .ok_or_else(|| Error::malformed_node("$classes", "class metadata is missing $classes", Node::Dictionary(class_dict.clone())))?
            .as_array()
            .map_err(|_| Error::malformed_node("$classes", "$classes is not an array", Node::Dictionary(class_dict.clone())))?
            .first()
            .ok_or_else(|| Error::malformed_node("$classes", "$classes is empty", Node::Dictionary(class_dict.clone())))?
            .as_string()
            .map_err(|_| Error::malformed_node("$classes", "$classes[0] is not a string", Node::Dictionary(class_dict.clone())))?
            .to_owned();

        let mut raw_fields = dict;
        if self.options.remove_class_names {
            raw_fields.remove("$class");
        }

        let resolved_fields = match self.resolve_fields(raw_fields, depth)? {
            Node::Dictionary(fields) => fields,
            _ => unreachable!("resolve_fields always returns a Dictionary"),
        };

        tracing::trace!(class = %class_name, "dispatching archived class");
        self.dispatch_class(&class_name, resolved_fields)
    }

    /// Resolves every value of a plain dictionary, preserving key order.
    fn resolve_fields(&mut self, dict: Dictionary, depth: usize) -> Result<Node> {
        let mut out = Dictionary::new();
        for (key, value) in dict.iter() {
            let resolved = self.resolve_node(value.clone(), depth)?;
            out.insert(key.clone(), resolved);
        }
        Ok(Node::Dictionary(out))
    }

    /// Dispatches an archived class instance (fields already fully
    /// resolved) to its built-in handling, a registered handler, or the
    /// plain-dictionary fallback (§4.6).
    fn dispatch_class(&self, class_name: &str, fields: Dictionary) -> Result<Node> {
        match class_name {
            "NSArray" | "NSMutableArray" | "NSSet" | "NSMutableSet" => {
                Ok(fields.get("NS.objects").cloned().unwrap_or_else(|| Node::Array(Vec::new())))
            }
            "NSDictionary" | "NSMutableDictionary" => {
                let empty: Vec<Node> = Vec::new();
                let keys = fields.get("NS.keys").and_then(|n| n.as_array().ok()).unwrap_or(&empty);
                let objects = fields.get("NS.objects").and_then(|n| n.as_array().ok()).unwrap_or(&empty);
                let mut out = Dictionary::new();
                for (key, value) in keys.iter().zip(objects.iter()) {
                    if let Node::String(s) = key {
                        out.insert(s.clone(), value.clone());
                    }
                }
                Ok(Node::Dictionary(out))
            }
            "NSString" | "NSMutableString" => {
                Ok(fields.get("NS.string").cloned().unwrap_or_else(|| Node::String(String::new())))
            }
            "NSDate" => {
                let seconds = fields.get("NS.time")
                    .ok_or_else(|| Error::malformed_node("NS.time", "NSDate is missing NS.time", Node::Dictionary(fields.clone())))?
                    .as_number_f64()?;
                Ok(Node::Date(Date::from_core_data_epoch_seconds(seconds)))
            }
            "NSData" | "NSMutableData" => {
                Ok(fields.get("NS.data").cloned().unwrap_or_else(|| Node::Data(Vec::new())))
            }
            _ => {
                if let Some(handler) = self.registry.get(class_name) {
                    Ok(handler(&fields))
                } else {
                    tracing::warn!(class = class_name, "no built-in or registered handler; passing through as plain dictionary");
                    Ok(Node::Dictionary(fields))
                }
            }
        }
    }
}

/// Returns the `$objects` index if `dict` is exactly the single-key
/// `{CF$UID: n}` shape that marks a UID reference.
fn uid_index(dict: &Dictionary) -> Option<usize> {
    if dict.len() != 1 {
        return None;
    }
    let (key, value) = dict.iter().next()?;
    if key != "CF$UID" {
        return None;
    }
    match value {
        Node::Number(number) => number.as_i64().and_then(|i| usize::try_from(i).ok()),
        _ => None,
    }
}
