//! Incremental Extractor
//!
//! Splits a partitioned data source into work units, streams each unit's
//! records through a chain of converters into a sink, and durably records how
//! far each partition has been extracted so the next run picks up from there.

pub mod bundle;
pub mod checkpoint;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod etl;
pub mod job;
pub mod partition;
pub mod record;
pub mod registry;
pub mod retry;
pub mod runner;
pub mod storage;
pub mod transform;
pub mod work_unit;

// Re-exports for convenience
pub use bundle::SourceBundle;
pub use checkpoint::{
    CheckpointStore, Checkpoints, FileCheckpointStore, MemoryCheckpointStore, SourceState,
};
pub use config::Properties;
pub use coordinator::{
    CommitPolicy, CoordinatorConfig, JobOutcome, JobStatus, JobSummary, RunCoordinator,
};
pub use error::{ExtractError, Result};
pub use etl::{Converter, Cursor, DataSource, Extractor, Loader, Sink, Source, TransformPipeline};
pub use job::Job;
pub use partition::{PartitionDescriptor, Partitioner, SourceMetadata};
pub use record::{JsonDocument, Payload, Record, Schema, SourceRecord};
pub use registry::PluginRegistry;
pub use retry::RetryPolicy;
pub use runner::{ErrorPolicy, ExtractionRunner, RunnerState, UnitOutcome, UnitResult};
pub use work_unit::{Marker, WorkUnit};
