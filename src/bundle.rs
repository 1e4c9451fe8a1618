//! Data source + extractor bundle
//!
//! Discovery and reading are separate capabilities so they can be combined
//! freely; [`SourceBundle`] joins an eagerly built pair into one [`Source`].

use crate::checkpoint::{Checkpoints, SourceState};
use crate::coordinator::JobOutcome;
use crate::error::Result;
use crate::etl::{Cursor, DataSource, Extractor, Source};
use crate::partition::Partitioner;
use crate::record::Schema;
use crate::work_unit::WorkUnit;
use async_trait::async_trait;
use std::sync::Arc;

/// A [`DataSource`] and an [`Extractor`] presented as a single [`Source`].
pub struct SourceBundle {
    data_source: Arc<dyn DataSource>,
    extractor: Arc<dyn Extractor>,
    partitioner: Partitioner,
}

impl SourceBundle {
    pub fn new(data_source: Arc<dyn DataSource>, extractor: Arc<dyn Extractor>) -> Self {
        Self {
            data_source,
            extractor,
            partitioner: Partitioner::default(),
        }
    }

    pub fn with_partitioner(mut self, partitioner: Partitioner) -> Self {
        self.partitioner = partitioner;
        self
    }
}

#[async_trait]
impl Source for SourceBundle {
    async fn plan(&self, prior: &Checkpoints, state: &SourceState) -> Result<Vec<WorkUnit>> {
        let metadata = self.data_source.metadata(state).await?;
        self.partitioner.plan(&metadata, prior)
    }

    fn input_schema(&self) -> Schema {
        self.extractor.input_schema()
    }

    async fn open_cursor(&self, unit: &WorkUnit) -> Result<Box<dyn Cursor>> {
        self.extractor.open_cursor(unit).await
    }

    async fn shutdown(&self, outcome: &JobOutcome) -> Result<SourceState> {
        self.data_source.shutdown(outcome).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::{PartitionDescriptor, SourceMetadata};
    use crate::record::{Record, SourceRecord};
    use crate::work_unit::Marker;
    use serde_json::json;

    struct TwoPartitions;

    #[async_trait]
    impl DataSource for TwoPartitions {
        async fn metadata(&self, _state: &SourceState) -> Result<SourceMetadata> {
            Ok(SourceMetadata::new(vec![
                PartitionDescriptor::new("A", Marker::new(3)),
                PartitionDescriptor::new("B", Marker::new(2)),
            ]))
        }
    }

    struct Counter {
        next: u64,
        end: u64,
    }

    #[async_trait]
    impl Cursor for Counter {
        async fn next(&mut self) -> Result<Option<SourceRecord>> {
            if self.next >= self.end {
                return Ok(None);
            }
            let record = Record::json(json!({ "n": self.next }));
            self.next += 1;
            Ok(Some(SourceRecord::new(Marker::new(self.next), record)))
        }
    }

    struct CountingExtractor;

    #[async_trait]
    impl Extractor for CountingExtractor {
        async fn open_cursor(&self, unit: &WorkUnit) -> Result<Box<dyn Cursor>> {
            Ok(Box::new(Counter {
                next: unit.start().position(),
                end: unit.end().position(),
            }))
        }
    }

    #[tokio::test]
    async fn test_bundle_plans_and_reads() {
        let bundle = SourceBundle::new(Arc::new(TwoPartitions), Arc::new(CountingExtractor));

        let prior = Checkpoints::from([("A".to_string(), Marker::new(1))]);
        let units = bundle.plan(&prior, &SourceState::new()).await.unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].id(), "A:1..3");

        let mut cursor = bundle.open_cursor(&units[0]).await.unwrap();
        let first = cursor.next().await.unwrap().unwrap();
        assert_eq!(first.resume_at, Marker::new(2));
        assert_eq!(first.record, Record::json(json!({"n": 1})));
        assert!(cursor.next().await.unwrap().is_some());
        assert!(cursor.next().await.unwrap().is_none());

        assert!(bundle.input_schema().is_empty());
    }
}
