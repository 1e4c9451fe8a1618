//! File system storage
//!
//! This module handles all file I/O for the built-in plugins:
//! - NDJSON cursors and sinks
//! - Directory-of-partitions sources and loaders
//! - The dead-letter channel

mod dead_letter;
mod directory;
mod ndjson;

pub use dead_letter::DeadLetterWriter;
pub use directory::{DirectoryLoader, DirectorySource, LOADER_DIR, SOURCE_DIR};
pub use ndjson::{NdjsonCursor, NdjsonSink, count_records, parse_line};
