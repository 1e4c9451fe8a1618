//! Durable partition checkpoints
//!
//! A checkpoint maps a partition key to the marker the next run resumes from.
//! Previous checkpoints are read-only inputs to planning; a run's new
//! checkpoints are written as one set through [`CheckpointStore::commit_all`].
//! The same store keeps the source's supplementary [`SourceState`].

mod file;
mod memory;

pub use file::FileCheckpointStore;
pub use memory::MemoryCheckpointStore;

use crate::error::Result;
use crate::work_unit::Marker;
use std::collections::BTreeMap;

/// Partition key → resumption marker.
pub type Checkpoints = BTreeMap<String, Marker>;

/// Key-value state a data source hands from one run to the next.
pub type SourceState = BTreeMap<String, String>;

/// Storage contract for checkpoints.
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn CheckpointStore>`
/// and must serialize concurrent `commit_all` calls.
pub trait CheckpointStore: Send + Sync {
    /// Marker last committed for `partition`, `Ok(None)` if never committed.
    fn get(&self, partition: &str) -> Result<Option<Marker>>;

    /// Every committed checkpoint, as of the last successful `commit_all`.
    fn snapshot(&self) -> Result<Checkpoints>;

    /// All-or-nothing commit of a set of checkpoints.
    ///
    /// Either every key's new marker is visible to the next `get`, or none is.
    /// Markers never regress: an update lower than the stored marker is
    /// dropped. Returns the entries that were actually advanced.
    fn commit_all(&self, updates: &Checkpoints) -> Result<Checkpoints>;

    /// Source state saved by earlier runs, empty if none.
    fn source_state(&self) -> Result<SourceState>;

    /// Overwrite the given source state entries in one atomic write.
    fn commit_source_state(&self, updates: &SourceState) -> Result<()>;
}

/// Fold `updates` into `current`, skipping regressions. Returns the applied entries.
pub(crate) fn merge_monotonic(current: &mut Checkpoints, updates: &Checkpoints) -> Checkpoints {
    let mut applied = Checkpoints::new();
    for (partition, marker) in updates {
        match current.get(partition) {
            Some(existing) if marker < existing => {
                log::warn!(
                    "Refusing to regress checkpoint for '{}' from {} to {}",
                    partition,
                    existing,
                    marker
                );
            }
            Some(existing) if marker == existing => {}
            _ => {
                current.insert(partition.clone(), *marker);
                applied.insert(partition.clone(), *marker);
            }
        }
    }
    applied
}
