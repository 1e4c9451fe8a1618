//! Built-in converters
//!
//! Concrete [`Converter`](crate::etl::Converter) implementations that can be
//! chained in a job's transform pipeline.

mod explode;
mod field_dropper;
mod json_document;

pub use explode::ArrayExploder;
pub use field_dropper::FieldDropper;
pub use json_document::JsonDocumentConverter;

pub mod keys {
    pub use super::explode::FIELD as EXPLODE_FIELD;
    pub use super::field_dropper::FIELDS as DROP_FIELDS;
    pub use super::json_document::KEY_FIELD as JSON_DOCUMENT_KEY_FIELD;
}
