//! Dead-letter channel for records rejected under the skip policy

use crate::error::{ExtractError, Result};
use crate::runner::RejectedRecord;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct DeadLetter<'a> {
    job: &'a str,
    #[serde(flatten)]
    rejected: &'a RejectedRecord,
}

/// Appends rejected records to an NDJSON file, one object per line
#[derive(Debug, Clone)]
pub struct DeadLetterWriter {
    path: PathBuf,
}

impl DeadLetterWriter {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append and sync `rejected`. A failure here must keep the job from committing.
    pub fn append(&self, job: &str, rejected: &[RejectedRecord]) -> Result<()> {
        let fail = |e: std::io::Error| ExtractError::sink_io_from(self.path.display(), e);

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(fail)?;
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(fail)?;

        for rejected in rejected {
            let line = serde_json::to_string(&DeadLetter { job, rejected }).map_err(|e| {
                ExtractError::sink_io(format!("failed to serialize dead letter: {}", e), false)
            })?;
            writeln!(file, "{}", line).map_err(fail)?;
        }

        file.sync_all().map_err(fail)
    }
}
