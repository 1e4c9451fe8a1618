//! Core extraction abstractions
//!
//! Trait definitions for the collaborators a job is assembled from: sources
//! that discover and read partitions, converters that reshape records, and
//! loaders that write them out.

mod extract;
mod load;
mod pipeline;
mod transform;

pub use extract::{Cursor, DataSource, Extractor, Source};
pub use load::{Loader, Sink};
pub use pipeline::{BoundPipeline, TransformPipeline};
pub use transform::{Converter, Emitted, IdentityConverter, emit_none, emit_one};
