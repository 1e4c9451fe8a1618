//! Extraction runner: drives one work unit from cursor to sink
//!
//! ```text
//! Opening ──> Streaming ──> Committing ──> Done
//!    │            │              │
//!    └────────────┴──────────────┴──────> Failed
//! ```
//!
//! The checkpoint a runner reports is the marker after the last record it
//! *consumed*, so skipped records still move the partition forward. It only
//! becomes durable once the coordinator commits it.

use crate::error::{ExtractError, Result};
use crate::etl::{Loader, Source, TransformPipeline};
use crate::record::SourceRecord;
use crate::retry::RetryPolicy;
use crate::work_unit::{Marker, WorkUnit};
use backon::RetryableWithContext;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Lifecycle of one work unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerState {
    Opening,
    Streaming,
    Committing,
    Done,
    Failed,
}

impl RunnerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for RunnerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Opening => "opening",
            Self::Streaming => "streaming",
            Self::Committing => "committing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What to do with a record that fails conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Fail the work unit.
    #[default]
    Strict,
    /// Count the record, route it to the error channel, keep streaming.
    Skip,
}

impl std::str::FromStr for ErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "skip" => Ok(Self::Skip),
            other => Err(format!("unknown error policy '{}' (expected strict or skip)", other)),
        }
    }
}

/// Counters for one work unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UnitStats {
    pub records_read: u64,
    pub records_emitted: u64,
    pub records_skipped: u64,
    pub retries: u32,
}

/// A record rejected under [`ErrorPolicy::Skip`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRecord {
    pub unit: String,
    /// Marker just past the rejected record.
    pub resume_at: Marker,
    pub stage: String,
    pub message: String,
    /// Textual form of the record as the failing stage saw it.
    pub record: String,
}

/// Terminal result of a work unit.
#[derive(Debug)]
pub enum UnitResult {
    /// Finished; `checkpoint` is ready to be committed.
    Done { checkpoint: Marker },
    /// Aborted while in `during`.
    Failed {
        during: RunnerState,
        cause: ExtractError,
    },
}

/// Everything the coordinator learns about a work unit.
#[derive(Debug)]
pub struct UnitOutcome {
    pub unit: WorkUnit,
    pub result: UnitResult,
    pub stats: UnitStats,
    pub rejected: Vec<RejectedRecord>,
}

impl UnitOutcome {
    /// A unit that never left `during`, e.g. cancelled before it was started.
    pub fn failed(unit: WorkUnit, during: RunnerState, cause: ExtractError) -> Self {
        Self {
            unit,
            result: UnitResult::Failed { during, cause },
            stats: UnitStats::default(),
            rejected: Vec::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.result, UnitResult::Done { .. })
    }

    pub fn checkpoint(&self) -> Option<Marker> {
        match self.result {
            UnitResult::Done { checkpoint } => Some(checkpoint),
            UnitResult::Failed { .. } => None,
        }
    }

    pub fn cause(&self) -> Option<&ExtractError> {
        match &self.result {
            UnitResult::Done { .. } => None,
            UnitResult::Failed { cause, .. } => Some(cause),
        }
    }

    pub fn state(&self) -> RunnerState {
        match self.result {
            UnitResult::Done { .. } => RunnerState::Done,
            UnitResult::Failed { .. } => RunnerState::Failed,
        }
    }
}

/// Mutable bookkeeping that survives an aborted drive (timeout, error).
struct Progress {
    unit_id: String,
    state: RunnerState,
    stats: UnitStats,
    rejected: Vec<RejectedRecord>,
}

impl Progress {
    fn new(unit: &WorkUnit) -> Self {
        Self {
            unit_id: unit.id(),
            state: RunnerState::Opening,
            stats: UnitStats::default(),
            rejected: Vec::new(),
        }
    }

    fn transition(&mut self, next: RunnerState) {
        log::debug!("[{}] {} -> {}", self.unit_id, self.state, next);
        self.state = next;
    }
}

/// Runs single work units. Cheap to share between worker tasks.
pub struct ExtractionRunner {
    source: Arc<dyn Source>,
    loader: Arc<dyn Loader>,
    pipeline: Arc<TransformPipeline>,
    error_policy: ErrorPolicy,
    retry: RetryPolicy,
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl ExtractionRunner {
    pub fn new(
        source: Arc<dyn Source>,
        loader: Arc<dyn Loader>,
        pipeline: Arc<TransformPipeline>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            loader,
            pipeline,
            error_policy: ErrorPolicy::default(),
            retry: RetryPolicy::default(),
            timeout: None,
            cancel,
        }
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Drive `unit` to a terminal state. Never panics on source, converter or sink errors.
    pub async fn run(&self, unit: WorkUnit) -> UnitOutcome {
        let mut progress = Progress::new(&unit);

        let driven = match self.timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.drive(&unit, &mut progress)).await {
                    Ok(result) => result,
                    Err(_) => Err(ExtractError::Timeout(limit)),
                }
            }
            None => self.drive(&unit, &mut progress).await,
        };

        let result = match driven {
            Ok(checkpoint) => {
                progress.transition(RunnerState::Done);
                log::info!(
                    "[{}] done: read {}, emitted {}, skipped {}, checkpoint {}",
                    progress.unit_id,
                    progress.stats.records_read,
                    progress.stats.records_emitted,
                    progress.stats.records_skipped,
                    checkpoint
                );
                UnitResult::Done { checkpoint }
            }
            Err(cause) => {
                let during = progress.state;
                progress.transition(RunnerState::Failed);
                log::error!("[{}] failed while {}: {}", progress.unit_id, during, cause);
                UnitResult::Failed { during, cause }
            }
        };

        UnitOutcome {
            unit,
            result,
            stats: progress.stats,
            rejected: progress.rejected,
        }
    }

    async fn drive(&self, unit: &WorkUnit, progress: &mut Progress) -> Result<Marker> {
        if self.cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }

        let mut cursor = self
            .retrying("open cursor", progress, unit, |unit| async move {
                let opened = self.source.open_cursor(unit).await;
                (unit, opened)
            })
            .await?;
        let bound = self.pipeline.bind(&self.source.input_schema())?;
        let mut sink = self
            .retrying("open sink", progress, unit, |unit| async move {
                let opened = self.loader.open(unit).await;
                (unit, opened)
            })
            .await?;
        progress.transition(RunnerState::Streaming);

        let mut consumed = unit.start();
        loop {
            // Safe point: the previous record is fully transformed and written.
            if self.cancel.is_cancelled() {
                return Err(ExtractError::Cancelled);
            }

            let pull = self.retrying("read", progress, cursor.as_mut(), |cursor| async move {
                let next = cursor.next().await;
                (cursor, next)
            });
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ExtractError::Cancelled),
                next = pull => next?,
            };
            let Some(SourceRecord { resume_at, record }) = next else {
                break;
            };

            if resume_at <= consumed || resume_at > unit.end() {
                return Err(ExtractError::source_io(
                    format!(
                        "cursor yielded marker {} outside ({}, {}]",
                        resume_at,
                        consumed,
                        unit.end()
                    ),
                    false,
                ));
            }
            consumed = resume_at;
            progress.stats.records_read += 1;

            match bound.process(record) {
                Ok(outputs) => {
                    for output in &outputs {
                        self.retrying("write", progress, sink.as_mut(), |sink| async move {
                            let written = sink.write(output).await;
                            (sink, written)
                        })
                        .await?;
                    }
                    progress.stats.records_emitted += outputs.len() as u64;
                }
                Err(err @ ExtractError::RecordConversion { .. }) => match (self.error_policy, err) {
                    (ErrorPolicy::Skip, ExtractError::RecordConversion { stage, message, record }) => {
                        log::warn!(
                            "[{}] skipping record before {}: '{}' rejected it: {}",
                            progress.unit_id,
                            resume_at,
                            stage,
                            message
                        );
                        progress.stats.records_skipped += 1;
                        progress.rejected.push(RejectedRecord {
                            unit: progress.unit_id.clone(),
                            resume_at,
                            stage,
                            message,
                            record,
                        });
                    }
                    (_, err) => return Err(err),
                },
                Err(other) => return Err(other),
            }
        }

        progress.transition(RunnerState::Committing);
        self.retrying("flush", progress, sink.as_mut(), |sink| async move {
            let flushed = sink.flush().await;
            (sink, flushed)
        })
        .await?;

        Ok(consumed)
    }

    /// Run `op` against `ctx`, retrying retryable errors with the unit's backoff.
    async fn retrying<C, T, F, Fut>(
        &self,
        action: &str,
        progress: &mut Progress,
        ctx: C,
        op: F,
    ) -> Result<T>
    where
        F: FnMut(C) -> Fut,
        Fut: Future<Output = (C, Result<T>)>,
    {
        let unit_id = &progress.unit_id;
        let retries = &mut progress.stats.retries;
        let (_, result) = op
            .retry(self.retry.backoff())
            .context(ctx)
            .when(ExtractError::is_retryable)
            .notify(|err: &ExtractError, delay: Duration| {
                *retries += 1;
                log::warn!(
                    "[{}] {} failed ({}), retry {} in {:?}",
                    unit_id,
                    action,
                    err,
                    retries,
                    delay
                );
            })
            .await;
        result
    }
}
