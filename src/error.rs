//! Error taxonomy for extraction jobs
//!
//! Every failure a runner can hit is folded into [`ExtractError`] before it
//! reaches the coordinator, so job outcomes only ever carry structured causes.

/// Errors produced while planning, extracting, converting, loading or committing.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// Missing or invalid setup: unknown plugin name, malformed partition bounds, bad option value.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A single record failed a converter's structural validation.
    #[error("record conversion failed in '{stage}': {message} (record: {record})")]
    RecordConversion {
        stage: String,
        message: String,
        record: String,
    },

    /// Failure while reading from a source cursor.
    #[error("source i/o error: {message}")]
    SourceIo { message: String, transient: bool },

    /// Failure while writing to or flushing a sink.
    #[error("sink i/o error: {message}")]
    SinkIo { message: String, transient: bool },

    /// The checkpoint store could not durably commit.
    #[error("checkpoint commit failed: {0}")]
    Commit(String),

    /// The job was cancelled before the work unit finished.
    #[error("cancelled")]
    Cancelled,

    /// The work unit exceeded its time budget.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// A worker task died without reporting an outcome.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, ExtractError>;

impl ExtractError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Build a conversion error carrying the offending record's textual form.
    pub fn conversion(
        stage: impl Into<String>,
        message: impl Into<String>,
        record: impl std::fmt::Display,
    ) -> Self {
        Self::RecordConversion {
            stage: stage.into(),
            message: message.into(),
            record: record.to_string(),
        }
    }

    pub fn source_io(message: impl Into<String>, transient: bool) -> Self {
        Self::SourceIo {
            message: message.into(),
            transient,
        }
    }

    pub fn sink_io(message: impl Into<String>, transient: bool) -> Self {
        Self::SinkIo {
            message: message.into(),
            transient,
        }
    }

    /// Only transient I/O failures at the cursor or sink boundary are retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::SourceIo { transient, .. } | Self::SinkIo { transient, .. } => *transient,
            _ => false,
        }
    }

    /// Short machine-friendly label used in summaries and dead letters.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::RecordConversion { .. } => "record_conversion",
            Self::SourceIo { .. } => "source_io",
            Self::SinkIo { .. } => "sink_io",
            Self::Commit(_) => "commit",
            Self::Cancelled => "cancelled",
            Self::Timeout(_) => "timeout",
            Self::Internal(_) => "internal",
        }
    }
}

fn is_transient(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::Interrupted
            | std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::WouldBlock
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
    )
}

impl ExtractError {
    /// Classify an I/O failure on the sink side, prefixing `context`.
    pub fn sink_io_from(context: impl std::fmt::Display, e: std::io::Error) -> Self {
        Self::sink_io(format!("{}: {}", context, e), is_transient(&e))
    }

    /// Classify an I/O failure on the source side, prefixing `context`.
    pub fn source_io_from(context: impl std::fmt::Display, e: std::io::Error) -> Self {
        Self::source_io(format!("{}: {}", context, e), is_transient(&e))
    }
}
