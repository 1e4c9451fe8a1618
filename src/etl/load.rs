//! Sink-side traits: loaders and per-unit sinks

use crate::coordinator::JobOutcome;
use crate::error::Result;
use crate::record::Record;
use crate::work_unit::WorkUnit;
use async_trait::async_trait;

/// Opens a sink for each work unit.
///
/// Each runner gets its own [`Sink`], so concurrent units never share
/// writer state.
///
/// # Example
/// ```no_run
/// use async_trait::async_trait;
/// use incremental_extractor::error::Result;
/// use incremental_extractor::etl::{Loader, Sink};
/// use incremental_extractor::record::Record;
/// use incremental_extractor::work_unit::WorkUnit;
///
/// struct StdoutLoader;
/// struct StdoutSink;
///
/// #[async_trait]
/// impl Sink for StdoutSink {
///     async fn write(&mut self, record: &Record) -> Result<()> {
///         println!("{}", record);
///         Ok(())
///     }
///     async fn flush(&mut self) -> Result<()> {
///         Ok(())
///     }
/// }
///
/// #[async_trait]
/// impl Loader for StdoutLoader {
///     async fn open(&self, _unit: &WorkUnit) -> Result<Box<dyn Sink>> {
///         Ok(Box::new(StdoutSink))
///     }
/// }
/// ```
#[async_trait]
pub trait Loader: Send + Sync {
    /// Open a sink for `unit`'s output.
    ///
    /// # Errors
    /// Returns an error if the destination cannot be opened.
    async fn open(&self, unit: &WorkUnit) -> Result<Box<dyn Sink>>;

    /// Called exactly once when the job completes, whatever its outcome.
    async fn shutdown(&self, _outcome: &JobOutcome) -> Result<()> {
        Ok(())
    }
}

/// Destination for one work unit's records, in emission order.
#[async_trait]
pub trait Sink: Send {
    async fn write(&mut self, record: &Record) -> Result<()>;

    /// Make everything written so far durable.
    async fn flush(&mut self) -> Result<()>;
}
