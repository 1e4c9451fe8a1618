//! Run coordinator: plans a job, fans work units out to a worker pool,
//! decides which checkpoints become durable, and shuts collaborators down.

use crate::checkpoint::{CheckpointStore, Checkpoints, SourceState};
use crate::error::{ExtractError, Result};
use crate::etl::{Loader, Source, TransformPipeline};
use crate::retry::RetryPolicy;
use crate::runner::{ErrorPolicy, ExtractionRunner, RejectedRecord, RunnerState, UnitOutcome};
use crate::storage::DeadLetterWriter;
use crate::work_unit::WorkUnit;
use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// When a job's checkpoints become durable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitPolicy {
    /// Commit every unit's checkpoint only if every unit finished.
    /// A failing unit also cancels its siblings.
    #[default]
    AllOrNothing,
    /// Commit each finished unit's checkpoint regardless of sibling failures.
    PerUnit,
}

impl std::str::FromStr for CommitPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "all_or_nothing" => Ok(Self::AllOrNothing),
            "per_unit" => Ok(Self::PerUnit),
            other => Err(format!(
                "unknown commit policy '{}' (expected all_or_nothing or per_unit)",
                other
            )),
        }
    }
}

/// Knobs for one job run.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub job: String,
    pub workers: usize,
    pub commit_policy: CommitPolicy,
    pub error_policy: ErrorPolicy,
    pub unit_timeout: Option<Duration>,
    pub retry: RetryPolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            job: "job".to_string(),
            workers: 4,
            commit_policy: CommitPolicy::default(),
            error_policy: ErrorPolicy::default(),
            unit_timeout: None,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Succeeded,
    /// Some units failed under [`CommitPolicy::PerUnit`]; the rest were committed.
    PartiallySucceeded,
    Failed,
}

impl JobStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Succeeded | Self::PartiallySucceeded => 0,
            Self::Failed => 1,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Succeeded => "succeeded",
            Self::PartiallySucceeded => "partially succeeded",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Everything a job produced.
#[derive(Debug)]
pub struct JobOutcome {
    pub job: String,
    pub commit_policy: CommitPolicy,
    /// Per-unit results, ordered by partition key.
    pub units: Vec<UnitOutcome>,
    /// Checkpoints that were durably advanced by this job.
    pub committed: Checkpoints,
    /// Source state saved for the next run.
    pub source_state: SourceState,
    /// Job-level failure: planning, commit, error channel or worker loss.
    pub job_error: Option<ExtractError>,
    pub shutdown_errors: Vec<String>,
}

impl JobOutcome {
    pub fn new(job: &str, commit_policy: CommitPolicy) -> Self {
        Self {
            job: job.to_string(),
            commit_policy,
            units: Vec::new(),
            committed: Checkpoints::new(),
            source_state: SourceState::new(),
            job_error: None,
            shutdown_errors: Vec::new(),
        }
    }

    pub fn status(&self) -> JobStatus {
        let failed = self.units.iter().filter(|u| !u.is_done()).count();
        if self.job_error.is_some() {
            JobStatus::Failed
        } else if failed == 0 {
            JobStatus::Succeeded
        } else if self.commit_policy == CommitPolicy::PerUnit {
            JobStatus::PartiallySucceeded
        } else {
            JobStatus::Failed
        }
    }

    pub fn rejected(&self) -> impl Iterator<Item = &RejectedRecord> {
        self.units.iter().flat_map(|u| u.rejected.iter())
    }

    pub fn summary(&self) -> JobSummary {
        let succeeded = self.units.iter().filter(|u| u.is_done()).count();
        JobSummary {
            job: self.job.clone(),
            status: self.status(),
            units_attempted: self.units.len(),
            units_succeeded: succeeded,
            units_failed: self.units.len() - succeeded,
            records_read: self.units.iter().map(|u| u.stats.records_read).sum(),
            records_emitted: self.units.iter().map(|u| u.stats.records_emitted).sum(),
            records_skipped: self.units.iter().map(|u| u.stats.records_skipped).sum(),
            checkpoints_committed: self.committed.len(),
            error: self.job_error.as_ref().map(|e| e.to_string()),
        }
    }
}

/// User-facing totals for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub job: String,
    pub status: JobStatus,
    pub units_attempted: usize,
    pub units_succeeded: usize,
    pub units_failed: usize,
    pub records_read: u64,
    pub records_emitted: u64,
    pub records_skipped: u64,
    pub checkpoints_committed: usize,
    pub error: Option<String>,
}

impl std::fmt::Display for JobSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "job '{}' {}: {} unit(s) attempted, {} succeeded, {} failed; {} record(s) read, {} emitted, {} skipped; {} checkpoint(s) committed",
            self.job,
            self.status,
            self.units_attempted,
            self.units_succeeded,
            self.units_failed,
            self.records_read,
            self.records_emitted,
            self.records_skipped,
            self.checkpoints_committed
        )?;
        if let Some(error) = &self.error {
            write!(f, " ({})", error)?;
        }
        Ok(())
    }
}

/// Orchestrates one job: plan → run units → commit → shut down.
pub struct RunCoordinator {
    source: Arc<dyn Source>,
    loader: Arc<dyn Loader>,
    pipeline: Arc<TransformPipeline>,
    store: Arc<dyn CheckpointStore>,
    config: CoordinatorConfig,
    dead_letters: Option<DeadLetterWriter>,
    cancel: CancellationToken,
}

impl RunCoordinator {
    pub fn new(
        source: Arc<dyn Source>,
        loader: Arc<dyn Loader>,
        pipeline: Arc<TransformPipeline>,
        store: Arc<dyn CheckpointStore>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            source,
            loader,
            pipeline,
            store,
            config,
            dead_letters: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_dead_letters(mut self, writer: DeadLetterWriter) -> Self {
        self.dead_letters = Some(writer);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels the whole job when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    /// Work units the next run would execute, without running anything.
    pub async fn plan(&self) -> Result<Vec<WorkUnit>> {
        let (prior, state) = self.saved().await?;
        self.source.plan(&prior, &state).await
    }

    /// Run the job to completion. Collaborators are shut down exactly once,
    /// whatever happens.
    pub async fn run(&self) -> JobOutcome {
        let mut outcome = JobOutcome::new(&self.config.job, self.config.commit_policy);
        log::info!(
            "Starting job '{}' ({} worker(s), {:?} commit, {:?} errors)",
            self.config.job,
            self.config.workers,
            self.config.commit_policy,
            self.config.error_policy
        );

        if let Err(err) = self.execute(&mut outcome).await {
            log::error!("Job '{}' failed: {}", self.config.job, err);
            outcome.job_error = Some(err);
        }

        self.shutdown(&mut outcome).await;
        log::info!("{}", outcome.summary());
        outcome
    }

    async fn execute(&self, outcome: &mut JobOutcome) -> Result<()> {
        let plan = self.plan().await?;
        ensure_disjoint(&plan)?;

        if plan.is_empty() {
            log::info!("Nothing to extract");
            return Ok(());
        }

        outcome.units = self.dispatch(plan).await?;

        let rejected: Vec<RejectedRecord> = outcome.rejected().cloned().collect();
        if let Some(writer) = &self.dead_letters
            && !rejected.is_empty()
        {
            let count = rejected.len();
            let (job, channel) = (self.config.job.clone(), writer.clone());
            tokio::task::spawn_blocking(move || channel.append(&job, &rejected))
                .await
                .map_err(|e| ExtractError::Internal(format!("dead-letter task failed: {}", e)))??;
            log::info!(
                "Routed {} rejected record(s) to {}",
                count,
                writer.path().display()
            );
        }

        let updates = self.checkpoints_to_commit(&outcome.units);
        if !updates.is_empty() {
            let store = self.store.clone();
            let applied = tokio::task::spawn_blocking(move || store.commit_all(&updates))
                .await
                .map_err(|e| ExtractError::Commit(format!("commit task failed: {}", e)))??;
            log::info!("Committed {} checkpoint(s)", applied.len());
            outcome.committed = applied;
        }

        // Finished units keep their commits; the job itself still counts as failed.
        if self.cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }
        Ok(())
    }

    /// Checkpoints and source state saved by earlier runs.
    async fn saved(&self) -> Result<(Checkpoints, SourceState)> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || -> Result<(Checkpoints, SourceState)> {
            Ok((store.snapshot()?, store.source_state()?))
        })
        .await
        .map_err(|e| ExtractError::Internal(format!("checkpoint read task failed: {}", e)))?
    }

    /// Run every unit on a pool of workers that each claim the next unclaimed unit.
    async fn dispatch(&self, plan: Vec<WorkUnit>) -> Result<Vec<UnitOutcome>> {
        let abort = self.cancel.child_token();
        let runner = Arc::new(
            ExtractionRunner::new(
                self.source.clone(),
                self.loader.clone(),
                self.pipeline.clone(),
                abort.clone(),
            )
            .with_error_policy(self.config.error_policy)
            .with_retry(self.config.retry)
            .with_timeout(self.config.unit_timeout),
        );

        let workers = self.config.workers.clamp(1, plan.len());
        let fail_fast = self.config.commit_policy == CommitPolicy::AllOrNothing;
        let queue = Arc::new(Mutex::new(VecDeque::from(plan)));

        let mut pool = JoinSet::new();
        for worker in 0..workers {
            let queue = queue.clone();
            let runner = runner.clone();
            let abort = abort.clone();
            pool.spawn(async move {
                let mut outcomes = Vec::new();
                while let Some(unit) = claim(&queue) {
                    let outcome = if abort.is_cancelled() {
                        UnitOutcome::failed(unit, RunnerState::Opening, ExtractError::Cancelled)
                    } else {
                        log::debug!("worker {} claimed {}", worker, unit);
                        run_isolated(runner.clone(), unit).await
                    };
                    if fail_fast && !outcome.is_done() && !abort.is_cancelled() {
                        log::warn!("Unit {} failed; cancelling remaining units", outcome.unit);
                        abort.cancel();
                    }
                    outcomes.push(outcome);
                }
                outcomes
            });
        }

        let mut outcomes = Vec::new();
        let mut lost = None;
        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok(batch) => outcomes.extend(batch),
                Err(e) => {
                    log::error!("Worker task died: {}", e);
                    lost = Some(ExtractError::Internal(format!("worker task died: {}", e)));
                }
            }
        }

        outcomes.sort_by(|a, b| a.unit.partition().cmp(b.unit.partition()));
        match lost {
            Some(err) => Err(err),
            None => Ok(outcomes),
        }
    }

    fn checkpoints_to_commit(&self, units: &[UnitOutcome]) -> Checkpoints {
        let all_done = units.iter().all(UnitOutcome::is_done);
        if self.config.commit_policy == CommitPolicy::AllOrNothing && !all_done {
            log::warn!("Not committing checkpoints: at least one unit failed under all-or-nothing");
            return Checkpoints::new();
        }

        units
            .iter()
            .filter_map(|u| {
                u.checkpoint()
                    .filter(|marker| *marker > u.unit.start())
                    .map(|marker| (u.unit.partition().to_string(), marker))
            })
            .collect()
    }

    /// Shut both collaborators down, then save whatever state the source handed back.
    async fn shutdown(&self, outcome: &mut JobOutcome) {
        let mut errors = Vec::new();
        let state = match self.source.shutdown(outcome).await {
            Ok(state) => state,
            Err(e) => {
                log::error!("Source shutdown failed: {}", e);
                errors.push(format!("source: {}", e));
                SourceState::new()
            }
        };
        if let Err(e) = self.loader.shutdown(outcome).await {
            log::error!("Loader shutdown failed: {}", e);
            errors.push(format!("loader: {}", e));
        }

        if !state.is_empty() {
            let store = self.store.clone();
            let updates = state.clone();
            let saved = tokio::task::spawn_blocking(move || store.commit_source_state(&updates))
                .await
                .map_err(|e| ExtractError::Commit(format!("source state task failed: {}", e)))
                .and_then(|saved| saved);
            match saved {
                Ok(()) => {
                    log::debug!("Saved {} source state entr(ies)", state.len());
                    outcome.source_state = state;
                }
                Err(e) => {
                    log::error!("Saving source state failed: {}", e);
                    errors.push(format!("source state: {}", e));
                }
            }
        }

        outcome.shutdown_errors = errors;
    }
}

fn claim(queue: &Mutex<VecDeque<WorkUnit>>) -> Option<WorkUnit> {
    queue.lock().ok().and_then(|mut q| q.pop_front())
}

/// Run a unit on its own task so a panicking converter or sink only fails that unit.
async fn run_isolated(runner: Arc<ExtractionRunner>, unit: WorkUnit) -> UnitOutcome {
    let claimed = unit.clone();
    match tokio::spawn(async move { runner.run(unit).await }).await {
        Ok(outcome) => outcome,
        Err(e) => {
            log::error!("Unit {} aborted: {}", claimed, e);
            UnitOutcome::failed(
                claimed,
                RunnerState::Streaming,
                ExtractError::Internal(format!("runner task aborted: {}", e)),
            )
        }
    }
}

/// No two units in one plan may target the same partition.
fn ensure_disjoint(plan: &[WorkUnit]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for unit in plan {
        if !seen.insert(unit.partition()) {
            return Err(ExtractError::config(format!(
                "plan contains more than one unit for partition '{}'",
                unit.partition()
            )));
        }
    }
    Ok(())
}
