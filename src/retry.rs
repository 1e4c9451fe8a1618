//! Bounded exponential backoff for transient I/O at the cursor and sink boundary

use crate::config::{JOB_RETRY_BACKOFF_MAX_MS, JOB_RETRY_BACKOFF_MS, JOB_RETRY_MAX, Properties};
use crate::error::Result;
use backon::ExponentialBuilder;
use std::time::Duration;

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BASE_MS: u64 = 100;
const DEFAULT_MAX_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base: Duration::from_millis(DEFAULT_BASE_MS),
            max: Duration::from_millis(DEFAULT_MAX_MS),
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn from_properties(props: &Properties) -> Result<Self> {
        Ok(Self {
            max_retries: props.parse_or(JOB_RETRY_MAX, DEFAULT_MAX_RETRIES)?,
            base: Duration::from_millis(props.parse_or(JOB_RETRY_BACKOFF_MS, DEFAULT_BASE_MS)?),
            max: Duration::from_millis(props.parse_or(JOB_RETRY_BACKOFF_MAX_MS, DEFAULT_MAX_MS)?),
        })
    }

    /// Backoff starting at `base` and doubling up to `max`, for at most `max_retries` retries.
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.base)
            .with_max_delay(self.max)
            .with_max_times(self.max_retries as usize)
    }
}
