//! NDJSON (Newline Delimited JSON) file operations
//!
//! Markers over an NDJSON file are offsets in non-empty lines: the record on
//! the n-th non-empty line (0-based) resumes at `n + 1`.

use crate::error::{ExtractError, Result};
use crate::etl::{Cursor, Sink};
use crate::record::{Record, SourceRecord};
use crate::work_unit::{Marker, WorkUnit};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter, Lines};

/// Parse one NDJSON line; anything that is not valid JSON is kept as text.
pub fn parse_line(line: &str) -> Record {
    match serde_json::from_str::<Value>(line) {
        Ok(value) => Record::json(value),
        Err(_) => Record::text(line),
    }
}

/// Count the non-empty lines of a file, i.e. the marker just past its last record.
pub async fn count_records(path: &Path) -> Result<Marker> {
    let file = File::open(path)
        .await
        .map_err(|e| ExtractError::source_io_from(path.display(), e))?;
    let mut lines = BufReader::new(file).lines();
    let mut count = 0;
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| ExtractError::source_io_from(path.display(), e))?
    {
        if !line.trim().is_empty() {
            count += 1;
        }
    }
    Ok(Marker::new(count))
}

/// Reads the records of one work unit from an NDJSON file
pub struct NdjsonCursor {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    position: u64,
    end: u64,
}

impl NdjsonCursor {
    /// Open `path` and skip ahead to the unit's start marker.
    pub async fn open(path: impl AsRef<Path>, unit: &WorkUnit) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .await
            .map_err(|e| ExtractError::source_io_from(path.display(), e))?;

        let mut cursor = Self {
            path,
            lines: BufReader::new(file).lines(),
            position: 0,
            end: unit.end().position(),
        };

        while cursor.position < unit.start().position() {
            if cursor.next_non_empty().await?.is_none() {
                return Err(ExtractError::source_io(
                    format!(
                        "{} has fewer than {} records",
                        cursor.path.display(),
                        unit.start()
                    ),
                    false,
                ));
            }
        }

        log::debug!("Opened {} at record {}", cursor.path.display(), cursor.position);
        Ok(cursor)
    }

    async fn next_non_empty(&mut self) -> Result<Option<String>> {
        loop {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|e| ExtractError::source_io_from(self.path.display(), e))?;
            match line {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => {
                    self.position += 1;
                    return Ok(Some(line));
                }
                None => return Ok(None),
            }
        }
    }
}

#[async_trait]
impl Cursor for NdjsonCursor {
    async fn next(&mut self) -> Result<Option<SourceRecord>> {
        if self.position >= self.end {
            return Ok(None);
        }
        match self.next_non_empty().await? {
            Some(line) => Ok(Some(SourceRecord::new(
                Marker::new(self.position),
                parse_line(&line),
            ))),
            None => Err(ExtractError::source_io(
                format!(
                    "{} ended at record {} before the planned end {}",
                    self.path.display(),
                    self.position,
                    self.end
                ),
                false,
            )),
        }
    }
}

/// Appends records to an NDJSON file, one line per record
pub struct NdjsonSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl NdjsonSink {
    /// Open `path` for appending, creating it if needed.
    pub async fn append(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| ExtractError::sink_io_from(path.display(), e))?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Sink for NdjsonSink {
    async fn write(&mut self, record: &Record) -> Result<()> {
        let line = record.to_line().map_err(|e| {
            ExtractError::sink_io(format!("failed to serialize record: {}", e), false)
        })?;
        self.writer
            .write_all(format!("{}\n", line).as_bytes())
            .await
            .map_err(|e| ExtractError::sink_io_from(self.path.display(), e))
    }

    async fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .await
            .map_err(|e| ExtractError::sink_io_from(self.path.display(), e))?;
        self.writer
            .get_ref()
            .sync_all()
            .await
            .map_err(|e| ExtractError::sink_io_from(self.path.display(), e))
    }
}
