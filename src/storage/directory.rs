//! Directory-based NDJSON partitions
//!
//! Every `*.ndjson` file in a directory is one partition, keyed by its file
//! stem. The loader side mirrors this layout: one output file per partition.
//! The partitions seen by a run are saved as source state, so the next run can
//! warn about partition files that have disappeared.

use super::ndjson::{NdjsonCursor, NdjsonSink, count_records};
use crate::checkpoint::SourceState;
use crate::config::Properties;
use crate::coordinator::JobOutcome;
use crate::error::{ExtractError, Result};
use crate::etl::{Cursor, DataSource, Extractor, Loader, Sink};
use crate::partition::{PartitionDescriptor, SourceMetadata};
use crate::work_unit::WorkUnit;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const SOURCE_DIR: &str = "source.ndjson.dir";
pub const LOADER_DIR: &str = "loader.ndjson.dir";
/// Source state key holding the JSON array of partitions the last run saw.
pub const PARTITIONS_STATE: &str = "source.ndjson.partitions";

const PATH_METADATA: &str = "path";

fn is_ndjson(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some("ndjson")
}

/// Discovers and reads NDJSON partitions from a directory
pub struct DirectorySource {
    path: PathBuf,
    seen: Mutex<Option<Vec<String>>>,
}

impl DirectorySource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            seen: Mutex::new(None),
        }
    }

    pub fn from_properties(props: &Properties) -> Result<Self> {
        Ok(Self::new(props.require(SOURCE_DIR)?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn partition_path(&self, unit: &WorkUnit) -> PathBuf {
        unit.metadata()
            .get(PATH_METADATA)
            .map(PathBuf::from)
            .unwrap_or_else(|| self.path.join(format!("{}.ndjson", unit.partition())))
    }
}

fn previous_partitions(state: &SourceState) -> Vec<String> {
    let Some(raw) = state.get(PARTITIONS_STATE) else {
        return Vec::new();
    };
    serde_json::from_str(raw).unwrap_or_else(|e| {
        log::warn!("Ignoring unreadable '{}' state: {}", PARTITIONS_STATE, e);
        Vec::new()
    })
}

#[async_trait]
impl DataSource for DirectorySource {
    async fn metadata(&self, state: &SourceState) -> Result<SourceMetadata> {
        let mut entries = tokio::fs::read_dir(&self.path)
            .await
            .map_err(|e| ExtractError::source_io_from(self.path.display(), e))?;

        let mut partitions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ExtractError::source_io_from(self.path.display(), e))?
        {
            let path = entry.path();
            if !is_ndjson(&path) {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
                log::warn!("Skipping file with a non UTF-8 name: {}", path.display());
                continue;
            };

            let end = count_records(&path).await?;
            log::debug!("Found partition '{}' with {} record(s)", key, end);
            partitions.push(
                PartitionDescriptor::new(key, end)
                    .with_metadata(PATH_METADATA, path.display().to_string()),
            );
        }

        log::info!(
            "Found {} partition(s) in {}",
            partitions.len(),
            self.path.display()
        );

        let mut keys: Vec<String> = partitions.iter().map(|p| p.key.clone()).collect();
        keys.sort();
        for gone in previous_partitions(state)
            .iter()
            .filter(|key| keys.binary_search(key).is_err())
        {
            log::warn!(
                "Partition '{}' was present in the last run but {} no longer holds it",
                gone,
                self.path.display()
            );
        }
        if let Ok(mut seen) = self.seen.lock() {
            *seen = Some(keys);
        }

        Ok(SourceMetadata::new(partitions))
    }

    async fn shutdown(&self, _outcome: &JobOutcome) -> Result<SourceState> {
        let seen = match self.seen.lock() {
            Ok(mut seen) => seen.take(),
            Err(_) => None,
        };
        let Some(keys) = seen else {
            return Ok(SourceState::new());
        };
        let encoded = serde_json::to_string(&keys).map_err(|e| {
            ExtractError::Internal(format!("failed to encode partition list: {}", e))
        })?;
        Ok(SourceState::from([(PARTITIONS_STATE.to_string(), encoded)]))
    }
}

#[async_trait]
impl Extractor for DirectorySource {
    async fn open_cursor(&self, unit: &WorkUnit) -> Result<Box<dyn Cursor>> {
        let cursor = NdjsonCursor::open(self.partition_path(unit), unit).await?;
        Ok(Box::new(cursor))
    }
}

/// Appends each partition's records to `<dir>/<partition>.ndjson`
pub struct DirectoryLoader {
    path: PathBuf,
}

impl DirectoryLoader {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)
            .map_err(|e| ExtractError::sink_io_from(path.display(), e))?;
        Ok(Self { path })
    }

    pub fn from_properties(props: &Properties) -> Result<Self> {
        Self::new(props.require(LOADER_DIR)?)
    }
}

#[async_trait]
impl Loader for DirectoryLoader {
    async fn open(&self, unit: &WorkUnit) -> Result<Box<dyn Sink>> {
        let target = self.path.join(format!("{}.ndjson", unit.partition()));
        Ok(Box::new(NdjsonSink::append(target).await?))
    }

    async fn shutdown(&self, outcome: &JobOutcome) -> Result<()> {
        log::debug!(
            "Loader for {} shutting down after job '{}'",
            self.path.display(),
            outcome.job
        );
        Ok(())
    }
}
