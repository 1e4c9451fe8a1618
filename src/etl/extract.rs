//! Source-side traits: data sources, extractors and cursors

use crate::checkpoint::{Checkpoints, SourceState};
use crate::coordinator::JobOutcome;
use crate::error::Result;
use crate::partition::SourceMetadata;
use crate::record::{Schema, SourceRecord};
use crate::work_unit::WorkUnit;
use async_trait::async_trait;

/// Discovers what a source currently holds.
///
/// Implementors describe their partitions and the current upper bound of each,
/// e.g. files in a directory, topic partitions, or date-sharded tables.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Current partitions and their bounds. `state` is whatever the previous
    /// run's [`shutdown`](Self::shutdown) saved.
    ///
    /// # Errors
    /// Returns an error if the source cannot be inspected.
    async fn metadata(&self, state: &SourceState) -> Result<SourceMetadata>;

    /// Called exactly once when the job completes, whatever its outcome.
    ///
    /// Returned entries are saved next to the checkpoints and handed to the
    /// next run's [`metadata`](Self::metadata).
    async fn shutdown(&self, _outcome: &JobOutcome) -> Result<SourceState> {
        Ok(SourceState::new())
    }
}

/// Opens cursors over planned work units.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Schema of the records this extractor yields.
    fn input_schema(&self) -> Schema {
        Schema::empty()
    }

    /// Open a cursor bound to `unit`'s range.
    ///
    /// # Errors
    /// Returns an error if the underlying partition cannot be opened.
    async fn open_cursor(&self, unit: &WorkUnit) -> Result<Box<dyn Cursor>>;
}

/// Forward-only reader over one work unit.
///
/// A failed `next` must not advance the cursor, so it can be retried.
#[async_trait]
pub trait Cursor: Send {
    /// Next record in source order, or `Ok(None)` at the end of the partition range.
    async fn next(&mut self) -> Result<Option<SourceRecord>>;
}

/// Everything the coordinator needs from a source: plan, read, shut down.
///
/// [`SourceBundle`](crate::bundle::SourceBundle) builds one from a
/// [`DataSource`] and an [`Extractor`].
#[async_trait]
pub trait Source: Send + Sync {
    /// Work units for this run, given checkpoints and source state saved by earlier runs.
    async fn plan(&self, prior: &Checkpoints, state: &SourceState) -> Result<Vec<WorkUnit>>;

    fn input_schema(&self) -> Schema;

    async fn open_cursor(&self, unit: &WorkUnit) -> Result<Box<dyn Cursor>>;

    /// Source state to save for the next run.
    async fn shutdown(&self, outcome: &JobOutcome) -> Result<SourceState>;
}
