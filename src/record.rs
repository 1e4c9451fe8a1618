//! Records flowing from cursors through converters to sinks

use crate::work_unit::Marker;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Schema descriptor established once per work unit.
///
/// Converters treat it as opaque JSON; an empty schema is `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema(Value);

impl Schema {
    pub fn new(descriptor: Value) -> Self {
        Self(descriptor)
    }

    pub fn empty() -> Self {
        Self(Value::Null)
    }

    pub fn descriptor(&self) -> &Value {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_null()
    }
}

/// Keyed JSON document, ready for a document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonDocument {
    pub key: String,
    /// The serialized JSON body.
    pub value: String,
}

impl JsonDocument {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Source-defined record body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    /// Raw text that could not be read as JSON.
    Text(String),
    Document(JsonDocument),
}

impl std::fmt::Display for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(value) => write!(f, "{}", value),
            Self::Text(text) => write!(f, "{}", text),
            Self::Document(doc) => {
                let body = serde_json::to_string(doc).map_err(|_| std::fmt::Error)?;
                write!(f, "{}", body)
            }
        }
    }
}

/// A payload plus an optional per-record schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub payload: Payload,
    pub schema: Option<Schema>,
}

impl Record {
    pub fn json(value: Value) -> Self {
        Self {
            payload: Payload::Json(value),
            schema: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            payload: Payload::Text(text.into()),
            schema: None,
        }
    }

    pub fn document(doc: JsonDocument) -> Self {
        Self {
            payload: Payload::Document(doc),
            schema: None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match &self.payload {
            Payload::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Serialized form written by sinks: JSON values and documents as JSON, text verbatim.
    pub fn to_line(&self) -> serde_json::Result<String> {
        match &self.payload {
            Payload::Json(value) => serde_json::to_string(value),
            Payload::Document(doc) => serde_json::to_string(doc),
            Payload::Text(text) => Ok(text.clone()),
        }
    }
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.payload.fmt(f)
    }
}

/// A record as yielded by a cursor, tagged with the marker to resume after it.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub resume_at: Marker,
    pub record: Record,
}

impl SourceRecord {
    pub fn new(resume_at: Marker, record: Record) -> Self {
        Self { resume_at, record }
    }
}
