//! CLI helper functions

use eyre::{Context, Result};
use incremental_extractor::{Job, JobStatus, Properties};
use owo_colors::OwoColorize;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Load the job file (if any) and apply `--set key=value` overrides on top.
pub fn load_properties(config: Option<&Path>, overrides: &[String]) -> Result<Properties> {
    let mut props = match config {
        Some(path) => Properties::load(path)
            .with_context(|| format!("Failed to load job file {}", path.display()))?,
        None => Properties::new(),
    };
    for assignment in overrides {
        props.apply_override(assignment)?;
    }
    Ok(props)
}

/// Print the work units the next run would execute.
pub async fn plan(job: &Job) -> Result<usize> {
    let coordinator = job.build().context("Failed to assemble job")?;
    let units = coordinator.plan().await.context("Failed to plan job")?;

    if units.is_empty() {
        log::info!("Nothing to extract for job '{}'", job.name().cyan());
    }
    for unit in &units {
        println!("{}\t{} record(s)", unit.id(), unit.len());
    }
    Ok(units.len())
}

/// Run the job until it finishes or `cancel` fires, and print its summary.
pub async fn run(job: &Job, cancel: CancellationToken) -> Result<JobStatus> {
    let coordinator = job
        .build()
        .context("Failed to assemble job")?
        .with_cancellation(cancel);
    let outcome = coordinator.run().await;

    for unit in outcome.units.iter().filter(|u| !u.is_done()) {
        if let Some(cause) = unit.cause() {
            log::error!(
                "Unit {} failed while {}: {}",
                unit.unit.id().yellow(),
                unit.state(),
                cause
            );
        }
    }
    for error in &outcome.shutdown_errors {
        log::warn!("Shutdown: {}", error);
    }

    let summary = outcome.summary();
    println!("{}", serde_json::to_string_pretty(&summary)?);

    let status = outcome.status();
    match status {
        JobStatus::Succeeded => log::info!("Job {}", status.green()),
        JobStatus::PartiallySucceeded => log::warn!("Job {}", status.yellow()),
        JobStatus::Failed => log::error!("Job {}", status.red()),
    }
    Ok(status)
}

/// Print the committed checkpoints, then any saved source state.
pub fn checkpoints(job: &Job) -> Result<usize> {
    let store = job.checkpoint_store()?;
    let snapshot = store.snapshot().context("Failed to read checkpoints")?;
    for (partition, marker) in &snapshot {
        println!("{}\t{}", partition, marker);
    }
    let state = store.source_state().context("Failed to read source state")?;
    for (key, value) in &state {
        log::info!("Source state {} = {}", key.cyan(), value);
    }
    Ok(snapshot.len())
}
