//! Query-string building and parsing.
//!
//! Every key and value is percent-encoded on its own with the same reserved set
//! as `encodeURIComponent`, so browser and native clients produce identical
//! request URLs. Repeated keys keep their insertion order.

use std::fmt;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use serde_json::Value;

/// Characters left untouched: `A-Z a-z 0-9 - _ . ! ~ * ' ( )`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub fn encode_component(input: &str) -> String {
    utf8_percent_encode(input, COMPONENT).to_string()
}

/// Decode one percent-encoded component. `+` is kept literally.
pub fn decode_component(input: &str) -> String {
    percent_decode_str(input).decode_utf8_lossy().into_owned()
}

/// Ordered list of query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pairs: Vec<(String, String)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.pairs.push((key.into(), value.into()));
        self
    }

    pub fn push_opt(&mut self, key: &str, value: Option<&str>) -> &mut Self {
        if let Some(value) = value {
            self.push(key, value);
        }
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(key, value);
        self
    }

    pub fn append(&mut self, other: Query) -> &mut Self {
        self.pairs.extend(other.pairs);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// Flatten a JSON object into parameters.
    ///
    /// Arrays become one pair per element, strings are taken verbatim, other
    /// scalars use their JSON text and nested objects are serialized whole.
    /// Anything but an object yields an empty query.
    pub fn from_json(value: &Value) -> Self {
        let mut query = Self::new();
        let Value::Object(map) = value else {
            return query;
        };
        for (name, value) in map {
            match value {
                Value::Array(items) => {
                    for item in items {
                        query.push(name.as_str(), json_scalar(item));
                    }
                }
                other => {
                    query.push(name.as_str(), json_scalar(other));
                }
            }
        }
        query
    }

    /// Render as `k=v&k=v` with every component percent-encoded.
    pub fn encode(&self) -> String {
        self.pairs
            .iter()
            .map(|(k, v)| format!("{}={}", encode_component(k), encode_component(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

fn json_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Query {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            pairs: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Decoded query string: names in first-seen order, each with all its values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedQuery {
    entries: Vec<(String, Vec<String>)>,
}

impl ParsedQuery {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).first().map(String::as_str)
    }

    pub fn get_all(&self, name: &str) -> &[String] {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, values)| values.as_slice())
            .unwrap_or(&[])
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }
}

/// Parse `a=1&b=x%20y&a=2`. A leading `?` and empty segments are ignored; a
/// segment without `=` decodes to an empty value.
pub fn parse_query(input: &str) -> ParsedQuery {
    let input = input.strip_prefix('?').unwrap_or(input);
    let mut parsed = ParsedQuery::default();
    for item in input.split('&').filter(|s| !s.is_empty()) {
        let (name, value) = match item.split_once('=') {
            Some((n, v)) => (decode_component(n), decode_component(v)),
            None => (decode_component(item), String::new()),
        };
        match parsed.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, values)) => values.push(value),
            None => parsed.entries.push((name, vec![value])),
        }
    }
    parsed
}
