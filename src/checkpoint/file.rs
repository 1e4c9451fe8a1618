//! JSON file checkpoint store with staged, atomically renamed commits
//!
//! File format:
//! ```json
//! {
//!   "version": 1,
//!   "checkpoints": { "orders": 250, "users": 40 },
//!   "source_state": { "source.ndjson.partitions": "[\"orders\",\"users\"]" }
//! }
//! ```

use super::{CheckpointStore, Checkpoints, SourceState, merge_monotonic};
use crate::error::{ExtractError, Result};
use crate::work_unit::Marker;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointFile {
    version: u32,
    #[serde(default)]
    checkpoints: Checkpoints,
    #[serde(default)]
    source_state: SourceState,
}

impl CheckpointFile {
    fn new(checkpoints: Checkpoints, source_state: SourceState) -> Self {
        Self {
            version: FORMAT_VERSION,
            checkpoints,
            source_state,
        }
    }
}

/// Checkpoint store persisted as a single JSON file.
///
/// `commit_all` writes the merged state to `<path>.staging`, syncs it, and
/// renames it over `<path>`. A crash at any point leaves either the old or
/// the new file in place; a stale staging file is never read.
#[derive(Debug)]
pub struct FileCheckpointStore {
    path: PathBuf,
    commit_lock: Mutex<()>,
}

impl FileCheckpointStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                ExtractError::config(format!(
                    "cannot create checkpoint directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let staging = staging_path(&path);
        if staging.exists() {
            log::warn!(
                "Ignoring leftover staging file from an interrupted commit: {}",
                staging.display()
            );
        }

        Ok(Self {
            path,
            commit_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<CheckpointFile> {
        if !self.path.exists() {
            return Ok(CheckpointFile::new(Checkpoints::new(), SourceState::new()));
        }

        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            ExtractError::Commit(format!(
                "failed to read checkpoint file {}: {}",
                self.path.display(),
                e
            ))
        })?;
        let file: CheckpointFile = serde_json::from_str(&content).map_err(|e| {
            ExtractError::config(format!(
                "malformed checkpoint file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        if file.version != FORMAT_VERSION {
            return Err(ExtractError::config(format!(
                "unsupported checkpoint file version {} in {}",
                file.version,
                self.path.display()
            )));
        }

        Ok(file)
    }

    /// Write `contents` to the staging file and sync it. Nothing is visible yet.
    fn stage(&self, contents: &CheckpointFile) -> Result<PathBuf> {
        let staging = staging_path(&self.path);
        let body = serde_json::to_string_pretty(contents)
            .map_err(|e| ExtractError::Commit(format!("failed to serialize checkpoints: {}", e)))?;

        let mut file = std::fs::File::create(&staging).map_err(|e| commit_io("create", &staging, e))?;
        file.write_all(body.as_bytes())
            .and_then(|_| file.write_all(b"\n"))
            .map_err(|e| commit_io("write", &staging, e))?;
        file.sync_all().map_err(|e| commit_io("sync", &staging, e))?;

        Ok(staging)
    }

    /// Atomically replace the live file with the staged one.
    fn publish(&self, staging: &Path) -> Result<()> {
        std::fs::rename(staging, &self.path).map_err(|e| commit_io("rename", staging, e))?;

        #[cfg(unix)]
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::File::open(parent)
                .and_then(|dir| dir.sync_all())
                .map_err(|e| commit_io("sync directory", parent, e))?;
        }

        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.commit_lock
            .lock()
            .map_err(|_| ExtractError::Commit("checkpoint store lock poisoned".to_string()))
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn get(&self, partition: &str) -> Result<Option<Marker>> {
        let _guard = self.lock()?;
        Ok(self.read()?.checkpoints.get(partition).copied())
    }

    fn snapshot(&self) -> Result<Checkpoints> {
        let _guard = self.lock()?;
        Ok(self.read()?.checkpoints)
    }

    fn commit_all(&self, updates: &Checkpoints) -> Result<Checkpoints> {
        let _guard = self.lock()?;

        let mut file = self.read()?;
        let applied = merge_monotonic(&mut file.checkpoints, updates);
        if applied.is_empty() {
            log::debug!("No checkpoint advanced, skipping write");
            return Ok(applied);
        }

        let staging = self.stage(&file)?;
        self.publish(&staging)?;

        log::debug!(
            "Committed {} checkpoint(s) to {}",
            applied.len(),
            self.path.display()
        );
        Ok(applied)
    }

    fn source_state(&self) -> Result<SourceState> {
        let _guard = self.lock()?;
        Ok(self.read()?.source_state)
    }

    fn commit_source_state(&self, updates: &SourceState) -> Result<()> {
        let _guard = self.lock()?;

        let mut file = self.read()?;
        let before = file.source_state.clone();
        file.source_state
            .extend(updates.iter().map(|(k, v)| (k.clone(), v.clone())));
        if file.source_state == before {
            return Ok(());
        }

        let staging = self.stage(&file)?;
        self.publish(&staging)?;
        log::debug!(
            "Saved {} source state entr(ies) to {}",
            updates.len(),
            self.path.display()
        );
        Ok(())
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".staging");
    PathBuf::from(name)
}

fn commit_io(action: &str, path: &Path, e: std::io::Error) -> ExtractError {
    ExtractError::Commit(format!("failed to {} {}: {}", action, path.display(), e))
}
