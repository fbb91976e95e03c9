//! Decode filter and the typed view of a watch notification.
//!
//! Each line is decoded best-effort. Only top-level JSON objects are
//! forwarded to handlers; everything else is an explicit discard outcome.

use std::fmt;

use serde_json::{Map, Value};

/// The JSON type of a decoded, non-object line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonKind {
    Null,
    Bool,
    Number,
    String,
    Array,
}

impl fmt::Display for JsonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool => write!(f, "boolean"),
            Self::Number => write!(f, "number"),
            Self::String => write!(f, "string"),
            Self::Array => write!(f, "array"),
        }
    }
}

/// Result of decoding one raw line.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    /// A JSON object: dispatched to the handler.
    Object(Map<String, Value>),
    /// Valid JSON of another type: discarded.
    NotAnObject(JsonKind),
    /// Not valid JSON (including empty lines): discarded.
    Malformed(String),
}

impl DecodeOutcome {
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, Self::Object(_))
    }
}

/// Decode one line and classify it.
pub fn decode_line(line: &[u8]) -> DecodeOutcome {
    match serde_json::from_slice::<Value>(line) {
        Ok(Value::Object(map)) => DecodeOutcome::Object(map),
        Ok(Value::Null) => DecodeOutcome::NotAnObject(JsonKind::Null),
        Ok(Value::Bool(_)) => DecodeOutcome::NotAnObject(JsonKind::Bool),
        Ok(Value::Number(_)) => DecodeOutcome::NotAnObject(JsonKind::Number),
        Ok(Value::String(_)) => DecodeOutcome::NotAnObject(JsonKind::String),
        Ok(Value::Array(_)) => DecodeOutcome::NotAnObject(JsonKind::Array),
        Err(e) => DecodeOutcome::Malformed(e.to_string()),
    }
}

/// Watch notification type (`"type"` field).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Added,
    Modified,
    Deleted,
    Bookmark,
    Error,
    /// Missing or unrecognised type; carries the raw value.
    Unknown(String),
}

impl EventKind {
    pub fn parse(s: &str) -> Self {
        match s {
            "ADDED" => Self::Added,
            "MODIFIED" => Self::Modified,
            "DELETED" => Self::Deleted,
            "BOOKMARK" => Self::Bookmark,
            "ERROR" => Self::Error,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => write!(f, "ADDED"),
            Self::Modified => write!(f, "MODIFIED"),
            Self::Deleted => write!(f, "DELETED"),
            Self::Bookmark => write!(f, "BOOKMARK"),
            Self::Error => write!(f, "ERROR"),
            Self::Unknown(s) => write!(f, "{s}"),
        }
    }
}

/// Best-effort typed view of `{"type": ..., "object": {...}}`.
///
/// Never fails: missing fields become `EventKind::Unknown("")` and
/// `Value::Null`. The engine itself does not use this type.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent<'a> {
    pub kind: EventKind,
    pub object: &'a Value,
}

static NULL: Value = Value::Null;

impl<'a> WatchEvent<'a> {
    pub fn from_object(map: &'a Map<String, Value>) -> Self {
        let kind = EventKind::parse(map.get("type").and_then(Value::as_str).unwrap_or(""));
        Self {
            kind,
            object: map.get("object").unwrap_or(&NULL),
        }
    }

    /// `object.kind`, e.g. `"Pod"`.
    pub fn object_kind(&self) -> Option<&'a str> {
        self.object.get("kind").and_then(Value::as_str)
    }

    /// `object.metadata.name`.
    pub fn name(&self) -> Option<&'a str> {
        self.metadata_str("name")
    }

    /// `object.metadata.namespace`.
    pub fn namespace(&self) -> Option<&'a str> {
        self.metadata_str("namespace")
    }

    /// `object.metadata.resourceVersion`.
    pub fn resource_version(&self) -> Option<&'a str> {
        self.metadata_str("resourceVersion")
    }

    fn metadata_str(&self, field: &str) -> Option<&'a str> {
        self.object.get("metadata")?.get(field)?.as_str()
    }
}
