//! The event record exchanged with the server.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::protocol::{
    E_DATA, E_ERROR, EventKind, P_EVENT, P_FROM, P_ID, P_REASON, P_SEQ, P_SUBJECT, P_TIME, P_TO,
    P_WAIT,
};
use crate::query::Query;

/// Name/value record parsed from one protocol element.
///
/// Fields are fixed once the event is built; builders consume `self`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Event {
    fields: BTreeMap<String, String>,
}

impl Event {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self::default().with_field(P_EVENT, event_type)
    }

    /// A `data` event on `subject`.
    pub fn data(subject: impl Into<String>) -> Self {
        Self::new(E_DATA).with_field(P_SUBJECT, subject)
    }

    /// An `error` event carrying `reason`.
    pub fn error(reason: impl Into<String>) -> Self {
        Self::new(E_ERROR).with_field(P_REASON, reason)
    }

    pub fn from_fields<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn field_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.field(name).unwrap_or(default)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The `p_event` value, or `""` when absent.
    pub fn event_type(&self) -> &str {
        self.field_or(P_EVENT, "")
    }

    pub fn kind(&self) -> EventKind {
        EventKind::classify(self.event_type())
    }

    pub fn subject(&self) -> Option<&str> {
        self.field(P_SUBJECT)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.field(P_ID)
    }

    pub fn reason(&self) -> Option<&str> {
        self.field(P_REASON)
    }

    /// `p_wait` as a delay; `None` when missing or not a millisecond count.
    pub fn wait(&self) -> Option<Duration> {
        self.field(P_WAIT)?
            .trim()
            .parse::<u64>()
            .ok()
            .map(Duration::from_millis)
    }

    /// Server timestamp (`p_time`, seconds since the epoch).
    pub fn time(&self) -> Option<u64> {
        self.field(P_TIME)?.parse().ok()
    }

    pub fn seq(&self) -> Option<u64> {
        self.field(P_SEQ)?.parse().ok()
    }

    pub fn from(&self) -> Option<&str> {
        self.field(P_FROM)
    }

    pub fn to(&self) -> Option<&str> {
        self.field(P_TO)
    }

    pub fn to_query_string(&self) -> String {
        self.fields().collect::<Query>().encode()
    }

    /// Render as a single `<event .../>` element. `strict` escapes attribute text.
    pub fn to_xml(&self, strict: bool) -> String {
        let mut xml = String::from("<event ");
        for (name, value) in self.fields() {
            let value = if strict {
                quick_xml::escape::escape(value)
            } else {
                value.into()
            };
            xml.push_str(&format!("{name}=\"{value}\" "));
        }
        xml.push_str("/>");
        xml
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.fields() {
            writeln!(f, "{name}={value}")?;
        }
        Ok(())
    }
}
