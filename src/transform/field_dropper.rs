//! Field dropper converter
//!
//! Removes configured top-level fields from object records, typically
//! bookkeeping columns that should not reach the destination.

use crate::config::Properties;
use crate::error::{ExtractError, Result};
use crate::etl::{Converter, Emitted, emit_one};
use crate::record::{Payload, Record, Schema};

pub const FIELDS: &str = "converter.drop_fields.fields";

/// Converter that drops specified fields from objects
///
/// Records that are not JSON objects pass through untouched.
///
/// # Example
/// ```
/// use incremental_extractor::etl::Converter;
/// use incremental_extractor::record::{Record, Schema};
/// use incremental_extractor::transform::FieldDropper;
/// use serde_json::json;
///
/// let dropper = FieldDropper::new(vec!["updated_at", "etag"]);
/// let input = Record::json(json!({
///     "id": "abc",
///     "updated_at": "2024-01-01",
///     "etag": "W/1",
///     "title": "My Object"
/// }));
///
/// let output: Vec<Record> = dropper.convert_record(&Schema::empty(), input).unwrap().collect();
/// let obj = output[0].as_json().unwrap().as_object().unwrap();
/// assert!(!obj.contains_key("updated_at"));
/// assert!(!obj.contains_key("etag"));
/// assert_eq!(obj["title"], "My Object");
/// ```
#[derive(Debug, Clone)]
pub struct FieldDropper {
    fields: Vec<String>,
}

impl FieldDropper {
    /// Create a new field dropper with the specified fields to remove
    pub fn new(fields: Vec<&str>) -> Self {
        Self {
            fields: fields.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Fields from `converter.drop_fields.fields` (comma separated, required).
    pub fn from_properties(props: &Properties) -> Result<Self> {
        let fields = props.list(FIELDS);
        if fields.is_empty() {
            return Err(ExtractError::config(format!(
                "drop_fields converter needs at least one field in '{}'",
                FIELDS
            )));
        }
        Ok(Self { fields })
    }
}

impl Converter for FieldDropper {
    fn name(&self) -> &str {
        "drop_fields"
    }

    fn convert_record(&self, _output_schema: &Schema, mut record: Record) -> Result<Emitted> {
        if let Payload::Json(value) = &mut record.payload
            && let Some(obj) = value.as_object_mut()
        {
            for field in &self.fields {
                obj.remove(field);
            }
        }
        Ok(emit_one(record))
    }
}
