//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! # Class-handler registry.
//!
//! A mapping from archived class name to a pure function that turns
//! the class instance's resolved fields into a plain `Node`. See
//! `SPEC_FULL.md` §4.6, §5.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;

use crate::node::{Dictionary, Node, Number};

/// A class handler: a pure function from the class instance's resolved
/// fields to the `Node` it should materialize as.
pub type ClassHandler = Arc<dyn Fn(&Dictionary) -> Node + Send + Sync>;

/// An immutable snapshot of the registry, taken once per `Unarchiver`
/// instance at construction (§5's copy-on-construct discipline).
#[derive(Clone)]
pub(crate) struct Registry {
    handlers: HashMap<String, ClassHandler>,
}

impl Registry {
    fn with_defaults() -> Self {
        let mut handlers: HashMap<String, ClassHandler> = HashMap::new();
        handlers.insert("NSColor".to_owned(), Arc::new(handle_ns_color));
        handlers.insert("NSAttributedString".to_owned(), Arc::new(handle_ns_attributed_string));
        handlers.insert("NSMutableAttributedString".to_owned(), Arc::new(handle_ns_attributed_string));
        handlers.insert("NSURLRequest".to_owned(), Arc::new(handle_ns_url_request));
        handlers.insert("NSURL".to_owned(), Arc::new(handle_ns_url));
        handlers.insert("NSValue".to_owned(), Arc::new(handle_ns_value));
        handlers.insert("NSNumber".to_owned(), Arc::new(handle_ns_number));
        handlers.insert("NSDecimalNumber".to_owned(), Arc::new(handle_ns_decimal_number));
        handlers.insert("NSTimeZone".to_owned(), Arc::new(handle_ns_time_zone));
        handlers.insert("NSLocale".to_owned(), Arc::new(handle_ns_locale));
        handlers.insert("NSRange".to_owned(), Arc::new(handle_ns_range));
        handlers.insert("NSPoint".to_owned(), Arc::new(handle_ns_point));
        handlers.insert("NSSize".to_owned(), Arc::new(handle_ns_size));
        handlers.insert("NSRect".to_owned(), Arc::new(handle_ns_rect));
        Registry { handlers }
    }

    pub(crate) fn get(&self, name: &str) -> Option<&ClassHandler> {
        self.handlers.get(name)
    }
}

static GLOBAL: Lazy<Mutex<Registry>> = Lazy::new(|| Mutex::new(Registry::with_defaults()));

/// Registers a handler for `name`, the only process-wide mutable state
/// this crate has (§5). Takes effect for every `Unarchiver` snapshot
/// constructed after this call returns; instances already constructed
/// keep whatever they captured at their own construction time (P6).
pub fn register_class_handler<F>(name: impl Into<String>, handler: F)
where
    F: Fn(&Dictionary) -> Node + Send + Sync + 'static,
{
    GLOBAL.lock().unwrap().handlers.insert(name.into(), Arc::new(handler));
}

/// Takes an immutable snapshot of the current registry state.
pub(crate) fn global_snapshot() -> Registry {
    GLOBAL.lock().unwrap().clone()
}

fn handle_ns_color(fields: &Dictionary) -> Node {
    match fields.get("NSRGB").and_then(|n| n.as_bytes().ok()) {
        Some(bytes) if bytes.len() >= 3 => {
            let mut out = Dictionary::new();
            out.insert("Red".to_owned(), Node::Number(Number::from(bytes[0] as f64 / 255.0)));
            out.insert("Green".to_owned(), Node::Number(Number::from(bytes[1] as f64 / 255.0)));
            out.insert("Blue".to_owned(), Node::Number(Number::from(bytes[2] as f64 / 255.0)));
            if bytes.len() >= 4 {
                out.insert("Alpha".to_owned(), Node::Number(Number::from(bytes[3] as f64 / 255.0)));
            }
            Node::Dictionary(out)
        }
        _ => Node::Null,
    }
}

fn handle_ns_attributed_string(fields: &Dictionary) -> Node {
    let mut out = Dictionary::new();
    if let Some(v) = fields.get("NSString") {
        out.insert("string".to_owned(), v.clone());
    }
    if let Some(v) = fields.get("NSAttributes") {
        out.insert("attributes".to_owned(), v.clone());
    }
    Node::Dictionary(out)
}

fn handle_ns_url_request(fields: &Dictionary) -> Node {
    let mut out = Dictionary::new();
    if let Some(v) = fields.get("URL") {
        out.insert("URL".to_owned(), v.clone());
    }
    if let Some(v) = fields.get("method") {
        out.insert("method".to_owned(), v.clone());
    }
    if let Some(v) = fields.get("body") {
        out.insert("body".to_owned(), v.clone());
    }
    Node::Dictionary(out)
}

fn handle_ns_url(fields: &Dictionary) -> Node {
    let string = fields.get("NS.string").and_then(|n| n.as_string().ok()).unwrap_or("");
    let base = fields.get("NS.base").and_then(|n| n.as_string().ok()).filter(|s| !s.is_empty());

    match base {
        Some(base) => match url::Url::parse(base).and_then(|b| b.join(string)) {
            Ok(joined) => Node::String(joined.to_string()),
            Err(_) => Node::String(string.to_owned()),
        },
        None => Node::String(string.to_owned()),
    }
}

fn handle_ns_value(fields: &Dictionary) -> Node {
    match fields.get("NS.special-type") {
        Some(Node::String(tag)) => match tag.as_str() {
            "CGPoint" => handle_ns_point(fields),
            "CGSize" => handle_ns_size(fields),
            "CGRect" => handle_ns_rect(fields),
            "_NSRange" => handle_ns_range(fields),
            _ => Node::Null,
        },
        _ => Node::Null,
    }
}

fn handle_ns_number(fields: &Dictionary) -> Node {
    fields.get("NS.number").cloned().unwrap_or(Node::Null)
}

fn handle_ns_decimal_number(fields: &Dictionary) -> Node {
    match fields.get("NS.decimal") {
        Some(Node::String(text)) => text.parse::<f64>()
            .map(|value| Node::Number(Number::from(value)))
            .unwrap_or(Node::Null),
        Some(other) => other.clone(),
        None => Node::Null,
    }
}

fn handle_ns_time_zone(fields: &Dictionary) -> Node {
    fields.get("NS.name").cloned().unwrap_or(Node::Null)
}

fn handle_ns_locale(fields: &Dictionary) -> Node {
    fields.get("NS.identifier").cloned().unwrap_or(Node::Null)
}

fn handle_ns_range(fields: &Dictionary) -> Node {
    let mut out = Dictionary::new();
    if let Some(v) = fields.get("location") {
        out.insert("location".to_owned(), v.clone());
    }
    if let Some(v) = fields.get("length") {
        out.insert("length".to_owned(), v.clone());
    }
    Node::Dictionary(out)
}

fn handle_ns_point(fields: &Dictionary) -> Node {
    let mut out = Dictionary::new();
    if let Some(v) = fields.get("x") {
        out.insert("x".to_owned(), v.clone());
    }
    if let Some(v) = fields.get("y") {
        out.insert("y".to_owned(), v.clone());
    }
    Node::Dictionary(out)
}

fn handle_ns_size(fields: &Dictionary) -> Node {
    let mut out = Dictionary::new();
    if let Some(v) = fields.get("width") {
        out.insert("width".to_owned(), v.clone());
    }
    if let Some(v) = fields.get("height") {
        out.insert("height".to_owned(), v.clone());
    }
    Node::Dictionary(out)
}

fn handle_ns_rect(fields: &Dictionary) -> Node {
    let mut out = Dictionary::new();
    out.insert("origin".to_owned(), handle_ns_point(fields));
    out.insert("size".to_owned(), handle_ns_size(fields));
    Node::Dictionary(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ns_color_rgb_triplet() {
        let mut fields = Dictionary::new();
        fields.insert("NSRGB".to_owned(), Node::Data(vec![0, 128, 255]));
        let node = handle_ns_color(&fields);
        let dict = node.as_dict().unwrap();
        assert_eq!(dict.get("Red").unwrap().as_number_f64().unwrap(), 0.0);
        assert!((dict.get("Blue").unwrap().as_number_f64().unwrap() - 1.0).abs() < 1e-9);
        assert!(dict.get("Alpha").is_none());
    }

    #[test]
    fn test_ns_range() {
        let mut fields = Dictionary::new();
        fields.insert("location".to_owned(), Node::Number(Number::Integer(3)));
        fields.insert("length".to_owned(), Node::Number(Number::Integer(7)));
        let node = handle_ns_range(&fields);
        let dict = node.as_dict().unwrap();
        assert_eq!(dict.get("location"), Some(&Node::Number(Number::Integer(3))));
        assert_eq!(dict.get("length"), Some(&Node::Number(Number::Integer(7))));
    }

    #[test]
    fn test_register_class_handler_affects_new_snapshots() {
        register_class_handler("ExampleWidget", |_fields: &Dictionary| Node::String("widget".to_owned()));
        let snapshot = global_snapshot();
        let handler = snapshot.get("ExampleWidget").expect("handler should be registered");
        assert_eq!(handler(&Dictionary::new()), Node::String("widget".to_owned()));
    }
}
