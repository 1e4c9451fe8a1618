//! Array exploder: one output record per element of an array field

use crate::config::Properties;
use crate::error::{ExtractError, Result};
use crate::etl::{Converter, Emitted};
use crate::record::{Payload, Record, Schema};
use serde_json::Value;

pub const FIELD: &str = "converter.explode.field";

/// Fans a record out over the elements of `field`.
///
/// `{"order": 7, "items": [a, b]}` becomes `{"order": 7, "items": a}` and
/// `{"order": 7, "items": b}`. An empty array emits nothing.
#[derive(Debug, Clone)]
pub struct ArrayExploder {
    field: String,
}

impl ArrayExploder {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    pub fn from_properties(props: &Properties) -> Result<Self> {
        Ok(Self::new(props.require(FIELD)?))
    }
}

impl Converter for ArrayExploder {
    fn name(&self) -> &str {
        "explode"
    }

    fn convert_record(&self, _output_schema: &Schema, record: Record) -> Result<Emitted> {
        let Record { payload, schema } = record;
        let mut template = match payload {
            Payload::Json(Value::Object(object)) => object,
            payload => {
                return Err(ExtractError::conversion(
                    self.name(),
                    "expecting a JSON object",
                    Record { payload, schema },
                ));
            }
        };

        // Taken out of the template so each output only clones the other fields.
        let message = match template.remove(&self.field) {
            Some(Value::Array(elements)) => {
                let field = self.field.clone();
                return Ok(Box::new(elements.into_iter().map(move |element| {
                    let mut object = template.clone();
                    object.insert(field.clone(), element);
                    Record {
                        payload: Payload::Json(Value::Object(object)),
                        schema: schema.clone(),
                    }
                })));
            }
            Some(other) => {
                template.insert(self.field.clone(), other);
                format!("field '{}' is not an array", self.field)
            }
            None => format!("could not find field '{}'", self.field),
        };

        Err(ExtractError::conversion(
            self.name(),
            message,
            Record {
                payload: Payload::Json(Value::Object(template)),
                schema,
            },
        ))
    }
}
