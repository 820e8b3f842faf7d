// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # DSN Parsing
//!
//! Turns a `gps://<host>[/<topic>][?<query>]` DSN into a nested option tree.
//! The query uses bracket notation, `topic[options][labels][]=x` becomes
//! `{"topic": {"options": {"labels": ["x"]}}}`. Every leaf parsed from a DSN is a
//! string; coercion happens later in the resolver.

use crate::errors::GpsError;
use serde_json::{Map, Value};
use url::{form_urlencoded, Url};

/// Scheme reserved for this transport.
pub const GPS_SCHEME: &str = "gps";

/// Host used when rendering a DSN, it is ignored on parse.
pub const PLACEHOLDER_HOST: &str = "default";

/// Parses the DSN into an option tree. The path segment, when present, seeds
/// `topic.name` unless the query already sets it.
pub fn parse(dsn: &str) -> Result<Map<String, Value>, GpsError> {
    let url = Url::parse(dsn)
        .map_err(|err| GpsError::ValidationError(format!("invalid dsn `{}`: {}", dsn, err)))?;

    let mut options = Map::new();

    if let Some(query) = url.query().filter(|q| !q.is_empty()) {
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            insert(&mut options, &split_key(&key), Value::String(value.into_owned()));
        }
    }

    let path = url.path().trim_start_matches('/');
    if !path.is_empty() {
        let topic = options
            .entry("topic")
            .or_insert_with(|| Value::Object(Map::new()));
        if !topic.is_object() {
            *topic = Value::Object(Map::new());
        }
        if let Value::Object(topic) = topic {
            topic
                .entry("name")
                .or_insert_with(|| Value::String(path.to_owned()));
        }
    }

    Ok(options)
}

/// Merges `overlay` into `base`; objects are merged key by key at every depth,
/// anything else in `overlay` replaces the value in `base`.
pub fn deep_merge(base: &mut Map<String, Value>, overlay: Map<String, Value>) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Object(current)), Value::Object(incoming)) => {
                deep_merge(current, incoming)
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Renders an option tree as a bracket-notation query string.
pub fn to_query(options: &Map<String, Value>) -> String {
    let mut pairs = vec![];
    for (key, value) in options {
        flatten(key.clone(), value, &mut pairs);
    }

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        serializer.append_pair(&key, &value);
    }
    serializer.finish()
}

fn flatten(prefix: String, value: &Value, pairs: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, value) in map {
                flatten(format!("{}[{}]", prefix, key), value, pairs);
            }
        }
        Value::Array(items) => {
            for item in items {
                flatten(format!("{}[]", prefix), item, pairs);
            }
        }
        Value::String(s) => pairs.push((prefix, s.clone())),
        Value::Bool(b) => pairs.push((prefix, if *b { "1" } else { "0" }.to_owned())),
        Value::Number(n) => pairs.push((prefix, n.to_string())),
        Value::Null => pairs.push((prefix, String::new())),
    }
}

/// `a[b][]` -> `["a", "b", ""]`. An unbalanced bracket ends the key, the rest
/// of it is ignored.
fn split_key(key: &str) -> Vec<String> {
    let Some(open) = key.find('[') else {
        return vec![key.to_owned()];
    };

    let mut segments = vec![key[..open].to_owned()];
    let mut rest = &key[open..];

    while let Some(stripped) = rest.strip_prefix('[') {
        let Some(close) = stripped.find(']') else {
            break;
        };
        segments.push(stripped[..close].to_owned());
        rest = &stripped[close + 1..];
    }

    segments
}

fn insert(target: &mut Map<String, Value>, segments: &[String], value: Value) {
    let Some((head, tail)) = segments.split_first() else {
        return;
    };

    if tail.is_empty() {
        target.insert(head.clone(), value);
        return;
    }

    let child = target.entry(head.clone()).or_insert(Value::Null);
    insert_value(child, tail, value);
}

fn insert_value(slot: &mut Value, segments: &[String], value: Value) {
    let (head, tail) = match segments.split_first() {
        Some(split) => split,
        None => {
            *slot = value;
            return;
        }
    };

    // `[]` appends to a list
    if head.is_empty() {
        if !slot.is_array() {
            *slot = Value::Array(vec![]);
        }
        if let Value::Array(items) = slot {
            let mut item = Value::Null;
            insert_value(&mut item, tail, value);
            items.push(item);
        }
        return;
    }

    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    if let Value::Object(map) = slot {
        let child = map.entry(head.clone()).or_insert(Value::Null);
        insert_value(child, tail, value);
    }
}
