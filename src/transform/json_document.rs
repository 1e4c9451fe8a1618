//! JSON document converter
//!
//! Turns object-shaped records into keyed [`JsonDocument`]s for a document
//! store: the configured key field becomes the document key and the whole
//! record, serialized as compact JSON, becomes the value.

use crate::config::Properties;
use crate::error::{ExtractError, Result};
use crate::etl::{Converter, Emitted, emit_one};
use crate::record::{JsonDocument, Payload, Record, Schema};
use serde_json::Value;

pub const KEY_FIELD: &str = "converter.json_document.key.field";

const DEFAULT_KEY_FIELD: &str = "key";

/// Converter from JSON objects to keyed JSON documents
///
/// # Example
/// ```
/// use incremental_extractor::etl::Converter;
/// use incremental_extractor::record::{JsonDocument, Payload, Record, Schema};
/// use incremental_extractor::transform::JsonDocumentConverter;
/// use serde_json::json;
///
/// let converter = JsonDocumentConverter::new("id");
/// let out: Vec<Record> = converter
///     .convert_record(&Schema::empty(), Record::json(json!({"id": "abc", "value": 1})))
///     .unwrap()
///     .collect();
///
/// assert_eq!(
///     out[0].payload,
///     Payload::Document(JsonDocument::new("abc", r#"{"id":"abc","value":1}"#))
/// );
/// ```
#[derive(Debug, Clone)]
pub struct JsonDocumentConverter {
    key_field: String,
}

impl JsonDocumentConverter {
    pub fn new(key_field: impl Into<String>) -> Self {
        Self {
            key_field: key_field.into(),
        }
    }

    /// Reads the key field from `converter.json_document.key.field`, falling back to `key`.
    pub fn from_properties(props: &Properties) -> Self {
        match props.get(KEY_FIELD) {
            Some(field) => {
                log::info!("Using the field '{}' from config as the document key", field);
                Self::new(field)
            }
            None => {
                log::warn!(
                    "No configuration for which field to use as the key ({}). Using the default '{}'",
                    KEY_FIELD,
                    DEFAULT_KEY_FIELD
                );
                Self::new(DEFAULT_KEY_FIELD)
            }
        }
    }

    pub fn key_field(&self) -> &str {
        &self.key_field
    }

    fn fail(&self, message: String, record: &impl std::fmt::Display) -> ExtractError {
        ExtractError::conversion(self.name(), message, record)
    }
}

impl Converter for JsonDocumentConverter {
    fn name(&self) -> &str {
        "json_document"
    }

    fn convert_schema(&self, _input: &Schema) -> Result<Schema> {
        Ok(Schema::empty())
    }

    fn convert_record(&self, _output_schema: &Schema, record: Record) -> Result<Emitted> {
        let object = match &record.payload {
            Payload::Json(Value::Object(object)) => object,
            _ => {
                return Err(self.fail(
                    format!("expecting {} to be a JSON object", record),
                    &record,
                ));
            }
        };

        let key_value = object.get(&self.key_field).ok_or_else(|| {
            self.fail(format!("could not find key field '{}'", self.key_field), &record)
        })?;

        let key = match key_value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => {
                return Err(self.fail(
                    format!("could not get the key {} as a string", other),
                    &record,
                ));
            }
        };

        let value = serde_json::to_string(object).map_err(|e| {
            self.fail(format!("failed to serialize record: {}", e), &record)
        })?;

        Ok(emit_one(Record::document(JsonDocument::new(key, value))))
    }
}
