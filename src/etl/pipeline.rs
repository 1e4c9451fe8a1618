//! Ordered chain of converters applied to every extracted record

use super::Converter;
use crate::error::Result;
use crate::record::{Record, Schema};

/// Transform pipeline: converters applied in order, each seeing only what the
/// previous stage emitted.
///
/// # Example
/// ```
/// use incremental_extractor::etl::{IdentityConverter, TransformPipeline};
/// use incremental_extractor::record::{Record, Schema};
/// use serde_json::json;
///
/// # fn example() -> incremental_extractor::error::Result<()> {
/// let pipeline = TransformPipeline::new(vec![Box::new(IdentityConverter::new())]);
/// let bound = pipeline.bind(&Schema::empty())?;
/// let out = bound.process(Record::json(json!({"id": 1})))?;
/// assert_eq!(out.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct TransformPipeline {
    stages: Vec<Box<dyn Converter>>,
}

impl TransformPipeline {
    pub fn new(stages: Vec<Box<dyn Converter>>) -> Self {
        Self { stages }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Establish every stage's output schema once, for one work unit.
    ///
    /// # Errors
    /// Returns the first stage's schema conversion error.
    pub fn bind(&self, input: &Schema) -> Result<BoundPipeline<'_>> {
        let mut schemas = Vec::with_capacity(self.stages.len());
        let mut current = input.clone();
        for stage in &self.stages {
            current = stage.convert_schema(&current)?;
            log::debug!("Stage '{}' established its output schema", stage.name());
            schemas.push(current.clone());
        }
        Ok(BoundPipeline {
            pipeline: self,
            schemas,
        })
    }
}

impl std::fmt::Debug for TransformPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformPipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

/// A pipeline with its per-stage schemas fixed for the duration of a work unit.
pub struct BoundPipeline<'a> {
    pipeline: &'a TransformPipeline,
    schemas: Vec<Schema>,
}

impl BoundPipeline<'_> {
    /// Schema leaving the last stage.
    pub fn output_schema(&self) -> Option<&Schema> {
        self.schemas.last()
    }

    /// Push one record through every stage, preserving emission order.
    ///
    /// # Errors
    /// Returns the first conversion error; no partial output is returned.
    pub fn process(&self, record: Record) -> Result<Vec<Record>> {
        let mut current = vec![record];
        for (stage, schema) in self.pipeline.stages.iter().zip(&self.schemas) {
            let mut next = Vec::with_capacity(current.len());
            for record in current {
                next.extend(stage.convert_record(schema, record)?);
            }
            if next.is_empty() {
                return Ok(next);
            }
            current = next;
        }
        Ok(current)
    }
}
