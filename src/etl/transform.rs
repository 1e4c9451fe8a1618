//! Converter trait for record transformation

use crate::error::Result;
use crate::record::{Record, Schema};

/// Lazily produced output of one conversion: zero, one or many records.
pub type Emitted = Box<dyn Iterator<Item = Record> + Send>;

/// Emit exactly one record.
pub fn emit_one(record: Record) -> Emitted {
    Box::new(std::iter::once(record))
}

/// Emit nothing (filter the record out).
pub fn emit_none() -> Emitted {
    Box::new(std::iter::empty())
}

/// One stage of a transform pipeline.
///
/// Implementors define:
/// - Schema conversion, run once per work unit before records flow
/// - Record conversion with structural validation
///
/// # Example
/// ```
/// use incremental_extractor::error::{ExtractError, Result};
/// use incremental_extractor::etl::{Converter, Emitted, emit_none, emit_one};
/// use incremental_extractor::record::{Record, Schema};
///
/// struct DropNulls;
///
/// impl Converter for DropNulls {
///     fn name(&self) -> &str {
///         "drop_nulls"
///     }
///
///     fn convert_record(&self, _schema: &Schema, record: Record) -> Result<Emitted> {
///         match record.as_json() {
///             Some(value) if value.is_null() => Ok(emit_none()),
///             Some(_) => Ok(emit_one(record)),
///             None => Err(ExtractError::conversion(self.name(), "expected JSON", &record)),
///         }
///     }
/// }
/// ```
pub trait Converter: Send + Sync {
    /// Name used in logs and conversion errors.
    fn name(&self) -> &str;

    /// Output schema for `input`. Defaults to passing the schema through.
    ///
    /// # Errors
    /// Returns an error if the input schema is unusable for this stage.
    fn convert_schema(&self, input: &Schema) -> Result<Schema> {
        Ok(input.clone())
    }

    /// Convert one record against the already established output schema.
    ///
    /// # Errors
    /// Returns [`ExtractError::RecordConversion`](crate::error::ExtractError::RecordConversion)
    /// carrying the record's textual form when validation fails.
    fn convert_record(&self, output_schema: &Schema, record: Record) -> Result<Emitted>;
}

/// Converter that passes records through unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityConverter;

impl IdentityConverter {
    pub fn new() -> Self {
        Self
    }
}

impl Converter for IdentityConverter {
    fn name(&self) -> &str {
        "identity"
    }

    fn convert_record(&self, _output_schema: &Schema, record: Record) -> Result<Emitted> {
        Ok(emit_one(record))
    }
}
