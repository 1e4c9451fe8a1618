//! Integration tests for incremental NDJSON extraction
//!
//! These tests assemble jobs from properties, the way the CLI does, and run
//! them against real directories and a file-backed checkpoint store.

use eyre::Result;
use incremental_extractor::{
    CheckpointStore, Checkpoints, FileCheckpointStore, Job, JobStatus, Marker, Properties,
};
use serde_json::{Value, json};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn write_partition(dir: &Path, key: &str, records: impl IntoIterator<Item = Value>) -> Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(format!("{}.ndjson", key)))?;
    for record in records {
        writeln!(file, "{}", record)?;
    }
    Ok(())
}

fn numbered(range: std::ops::Range<u64>) -> impl Iterator<Item = Value> {
    range.map(|i| json!({"id": format!("r{}", i), "n": i}))
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    Ok(std::fs::read_to_string(path)?
        .lines()
        .map(str::to_string)
        .collect())
}

struct Workspace {
    _temp: TempDir,
    input: std::path::PathBuf,
    output: std::path::PathBuf,
    checkpoints: std::path::PathBuf,
    dead_letters: std::path::PathBuf,
}

impl Workspace {
    fn new() -> Result<Self> {
        let temp = TempDir::new()?;
        let input = temp.path().join("input");
        std::fs::create_dir_all(&input)?;
        Ok(Self {
            input,
            output: temp.path().join("output"),
            checkpoints: temp.path().join("state/checkpoints.json"),
            dead_letters: temp.path().join("state/rejected.ndjson"),
            _temp: temp,
        })
    }

    fn props(&self, extra: &[(&str, &str)]) -> Properties {
        let mut props = Properties::from_pairs([
            ("job.name", "nightly".to_string()),
            ("job.source", "ndjson".to_string()),
            ("job.loader", "ndjson".to_string()),
            ("source.ndjson.dir", self.input.display().to_string()),
            ("loader.ndjson.dir", self.output.display().to_string()),
            ("job.checkpoint.path", self.checkpoints.display().to_string()),
            ("job.retry.backoff.ms", "1".to_string()),
        ]);
        for (key, value) in extra {
            props.set(*key, *value);
        }
        props
    }

    fn committed(&self) -> Result<Checkpoints> {
        Ok(FileCheckpointStore::new(&self.checkpoints)?.snapshot()?)
    }
}

#[tokio::test]
async fn test_first_run_then_nothing_new() -> Result<()> {
    let ws = Workspace::new()?;
    write_partition(&ws.input, "A", numbered(0..100))?;
    write_partition(&ws.input, "B", numbered(0..50))?;

    let job = Job::new(ws.props(&[]));
    let coordinator = job.build()?;

    let plan = coordinator.plan().await?;
    let ids: Vec<String> = plan.iter().map(|u| u.id()).collect();
    assert_eq!(ids, vec!["A:0..100", "B:0..50"]);

    let outcome = coordinator.run().await;
    assert_eq!(outcome.status(), JobStatus::Succeeded);
    assert_eq!(
        ws.committed()?,
        Checkpoints::from([
            ("A".to_string(), Marker::new(100)),
            ("B".to_string(), Marker::new(50)),
        ])
    );
    assert_eq!(read_lines(&ws.output.join("A.ndjson"))?.len(), 100);
    assert_eq!(read_lines(&ws.output.join("B.ndjson"))?.len(), 50);

    // A second run over unchanged data has nothing to do
    let rerun = Job::new(ws.props(&[])).build()?;
    assert!(rerun.plan().await?.is_empty());
    let outcome = rerun.run().await;
    assert_eq!(outcome.status(), JobStatus::Succeeded);
    assert!(outcome.units.is_empty());
    assert!(outcome.committed.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_appended_data_is_extracted_incrementally() -> Result<()> {
    let ws = Workspace::new()?;
    write_partition(&ws.input, "A", numbered(0..10))?;
    assert_eq!(Job::new(ws.props(&[])).build()?.run().await.status(), JobStatus::Succeeded);

    write_partition(&ws.input, "A", numbered(10..15))?;
    write_partition(&ws.input, "C", numbered(0..3))?;

    let coordinator = Job::new(ws.props(&[])).build()?;
    let ids: Vec<String> = coordinator.plan().await?.iter().map(|u| u.id()).collect();
    assert_eq!(ids, vec!["A:10..15", "C:0..3"]);

    let outcome = coordinator.run().await;
    assert_eq!(outcome.status(), JobStatus::Succeeded);
    assert_eq!(ws.committed()?.get("A"), Some(&Marker::new(15)));
    assert_eq!(ws.committed()?.get("C"), Some(&Marker::new(3)));

    let lines = read_lines(&ws.output.join("A.ndjson"))?;
    assert_eq!(lines.len(), 15);
    let last: Value = serde_json::from_str(&lines[14])?;
    assert_eq!(last["n"], 14);

    Ok(())
}

#[tokio::test]
async fn test_json_documents_are_keyed() -> Result<()> {
    let ws = Workspace::new()?;
    write_partition(&ws.input, "docs", [json!({"id": "abc", "value": 1})])?;

    let job = Job::new(ws.props(&[
        ("job.converters", "json_document"),
        ("converter.json_document.key.field", "id"),
    ]));
    let outcome = job.build()?.run().await;
    assert_eq!(outcome.status(), JobStatus::Succeeded);

    let lines = read_lines(&ws.output.join("docs.ndjson"))?;
    let doc: Value = serde_json::from_str(&lines[0])?;
    assert_eq!(doc["key"], "abc");
    let body: Value = serde_json::from_str(doc["value"].as_str().unwrap_or_default())?;
    assert_eq!(body, json!({"id": "abc", "value": 1}));

    Ok(())
}

#[tokio::test]
async fn test_strict_failure_commits_nothing() -> Result<()> {
    let ws = Workspace::new()?;
    write_partition(&ws.input, "A", [json!({"id": "a"}), json!({"value": 1})])?;
    write_partition(&ws.input, "B", numbered(0..5))?;

    let job = Job::new(ws.props(&[
        ("job.converters", "json_document"),
        ("converter.json_document.key.field", "id"),
        ("job.workers", "1"),
    ]));
    let outcome = job.build()?.run().await;

    assert_eq!(outcome.status(), JobStatus::Failed);
    assert_eq!(outcome.status().exit_code(), 1);
    assert!(outcome.committed.is_empty());
    assert!(ws.committed()?.is_empty());

    let failed = &outcome.units[0];
    assert_eq!(failed.unit.partition(), "A");
    let cause = failed.cause().map(|e| e.to_string()).unwrap_or_default();
    assert!(cause.contains("'id'"), "got: {cause}");
    assert!(cause.contains(r#"{"value":1}"#), "got: {cause}");

    Ok(())
}

#[tokio::test]
async fn test_skip_policy_routes_rejects_to_dead_letters() -> Result<()> {
    let ws = Workspace::new()?;
    write_partition(
        &ws.input,
        "A",
        [json!({"id": "a"}), json!({"value": 1}), json!({"id": "c"})],
    )?;

    let dead_letters = ws.dead_letters.display().to_string();
    let job = Job::new(ws.props(&[
        ("job.converters", "json_document"),
        ("converter.json_document.key.field", "id"),
        ("job.error.policy", "skip"),
        ("job.dead_letter.path", dead_letters.as_str()),
    ]));
    let outcome = job.build()?.run().await;

    assert_eq!(outcome.status(), JobStatus::Succeeded);
    let summary = outcome.summary();
    assert_eq!(summary.records_read, 3);
    assert_eq!(summary.records_emitted, 2);
    assert_eq!(summary.records_skipped, 1);
    assert_eq!(ws.committed()?.get("A"), Some(&Marker::new(3)));

    let rejected = read_lines(&ws.dead_letters)?;
    assert_eq!(rejected.len(), 1);
    let letter: Value = serde_json::from_str(&rejected[0])?;
    assert_eq!(letter["job"], "nightly");
    assert_eq!(letter["unit"], "A:0..3");
    assert_eq!(letter["resume_at"], 2);
    assert_eq!(letter["stage"], "json_document");
    assert_eq!(letter["record"], r#"{"value":1}"#);

    Ok(())
}

#[tokio::test]
async fn test_dead_letter_failure_blocks_commit() -> Result<()> {
    let ws = Workspace::new()?;
    write_partition(&ws.input, "A", [json!({"id": "a"}), json!({"value": 1})])?;

    // A regular file where the dead-letter directory should be
    let blocker = ws.input.join("not-a-dir");
    std::fs::write(&blocker, "")?;
    let dead_letters = blocker.join("rejected.ndjson").display().to_string();

    let job = Job::new(ws.props(&[
        ("job.converters", "json_document"),
        ("converter.json_document.key.field", "id"),
        ("job.error.policy", "skip"),
        ("job.dead_letter.path", dead_letters.as_str()),
    ]));
    let outcome = job.build()?.run().await;

    assert!(outcome.units[0].is_done());
    assert_eq!(outcome.status(), JobStatus::Failed);
    assert_eq!(outcome.job_error.as_ref().map(|e| e.kind()), Some("sink_io"));
    assert!(ws.committed()?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_partitions_seen_are_saved_with_checkpoints() -> Result<()> {
    let ws = Workspace::new()?;
    write_partition(&ws.input, "A", numbered(0..2))?;
    write_partition(&ws.input, "B", numbered(0..2))?;

    let outcome = Job::new(ws.props(&[])).build()?.run().await;
    assert_eq!(outcome.status(), JobStatus::Succeeded);
    assert_eq!(outcome.source_state["source.ndjson.partitions"], r#"["A","B"]"#);

    let saved: Value = serde_json::from_str(&std::fs::read_to_string(&ws.checkpoints)?)?;
    assert_eq!(saved["checkpoints"], json!({"A": 2, "B": 2}));
    assert_eq!(saved["source_state"]["source.ndjson.partitions"], r#"["A","B"]"#);

    // B disappears; the next run still plans and saves only what it sees
    std::fs::remove_file(ws.input.join("B.ndjson"))?;
    write_partition(&ws.input, "A", numbered(2..3))?;
    let outcome = Job::new(ws.props(&[])).build()?.run().await;
    assert_eq!(outcome.status(), JobStatus::Succeeded);
    assert_eq!(outcome.units.len(), 1);
    assert_eq!(outcome.source_state["source.ndjson.partitions"], r#"["A"]"#);
    assert_eq!(ws.committed()?.get("B"), Some(&Marker::new(2)));

    Ok(())
}

#[tokio::test]
async fn test_per_unit_commits_survivors() -> Result<()> {
    let ws = Workspace::new()?;
    write_partition(&ws.input, "A", [json!({"items": "not an array"})])?;
    write_partition(&ws.input, "B", [json!({"order": 1, "items": [1, 2, 3]})])?;

    let job = Job::new(ws.props(&[
        ("job.converters", "explode"),
        ("converter.explode.field", "items"),
        ("job.commit.policy", "per_unit"),
    ]));
    let outcome = job.build()?.run().await;

    assert_eq!(outcome.status(), JobStatus::PartiallySucceeded);
    assert_eq!(outcome.status().exit_code(), 0);
    assert_eq!(
        ws.committed()?,
        Checkpoints::from([("B".to_string(), Marker::new(1))])
    );
    assert_eq!(read_lines(&ws.output.join("B.ndjson"))?.len(), 3);

    // The failed partition is planned again from where it was
    let plan = Job::new(ws.props(&[])).build()?.plan().await?;
    assert_eq!(plan.len(), 1);
    assert_eq!(plan[0].id(), "A:0..1");

    Ok(())
}

#[tokio::test]
async fn test_many_partitions_commit_together() -> Result<()> {
    let ws = Workspace::new()?;
    for p in 0..24u64 {
        write_partition(&ws.input, &format!("p{:02}", p), numbered(0..p + 1))?;
    }

    let job = Job::new(ws.props(&[("job.workers", "8")]));
    let outcome = job.build()?.run().await;

    assert_eq!(outcome.status(), JobStatus::Succeeded);
    let committed = ws.committed()?;
    assert_eq!(committed.len(), 24);
    for p in 0..24u64 {
        assert_eq!(committed[&format!("p{:02}", p)], Marker::new(p + 1));
    }

    // Units come back in partition order regardless of which worker ran them
    let partitions: Vec<&str> = outcome.units.iter().map(|u| u.unit.partition()).collect();
    let mut sorted = partitions.clone();
    sorted.sort();
    assert_eq!(partitions, sorted);

    Ok(())
}

#[tokio::test]
async fn test_checkpoint_ahead_of_source_is_skipped() -> Result<()> {
    let ws = Workspace::new()?;
    write_partition(&ws.input, "A", numbered(0..5))?;
    write_partition(&ws.input, "B", numbered(0..5))?;

    let store = Arc::new(FileCheckpointStore::new(&ws.checkpoints)?);
    store.commit_all(&Checkpoints::from([("A".to_string(), Marker::new(9))]))?;

    let plan = Job::new(ws.props(&[])).build_with_store(store)?.plan().await?;
    let ids: Vec<String> = plan.iter().map(|u| u.id()).collect();
    assert_eq!(ids, vec!["B:0..5"]);

    Ok(())
}

#[tokio::test]
async fn test_text_lines_pass_through() -> Result<()> {
    let ws = Workspace::new()?;
    std::fs::write(ws.input.join("logs.ndjson"), "plain text\n{\"level\":\"info\"}\n")?;

    let outcome = Job::new(ws.props(&[])).build()?.run().await;
    assert_eq!(outcome.status(), JobStatus::Succeeded);
    assert_eq!(
        read_lines(&ws.output.join("logs.ndjson"))?,
        vec!["plain text", r#"{"level":"info"}"#]
    );

    Ok(())
}
