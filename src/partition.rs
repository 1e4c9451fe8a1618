//! Work-unit planning from source metadata and prior checkpoints
//!
//! For every partition the source reports, the partitioner resumes from the
//! committed checkpoint (or the source's default start) and plans one unit up
//! to the partition's current maximum. Partitions with nothing new are left
//! out. Planning is deterministic: units come back ordered by partition key.

use crate::checkpoint::Checkpoints;
use crate::config::Properties;
use crate::error::{ExtractError, Result};
use crate::work_unit::{Marker, WorkUnit};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

pub const PARTITION_KEY_PATTERN: &str = "partitioner.key.pattern";

const DEFAULT_KEY_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9._\-/=]*$";

/// One partition as reported by a data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionDescriptor {
    pub key: String,
    /// Where a first extraction starts; `None` means marker 0.
    pub start: Option<Marker>,
    /// Current source maximum (exclusive). Required to delimit a unit.
    pub end: Option<Marker>,
    pub metadata: BTreeMap<String, String>,
}

impl PartitionDescriptor {
    pub fn new(key: impl Into<String>, end: Marker) -> Self {
        Self {
            key: key.into(),
            start: None,
            end: Some(end),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_start(mut self, start: Marker) -> Self {
        self.start = Some(start);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Snapshot of a source's partitions at planning time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMetadata {
    pub partitions: Vec<PartitionDescriptor>,
}

impl SourceMetadata {
    pub fn new(partitions: Vec<PartitionDescriptor>) -> Self {
        Self { partitions }
    }
}

/// Computes the work units for a run.
#[derive(Debug, Clone)]
pub struct Partitioner {
    key_pattern: Regex,
}

impl Default for Partitioner {
    fn default() -> Self {
        Self {
            key_pattern: Regex::new(DEFAULT_KEY_PATTERN).expect("default key pattern is valid"),
        }
    }
}

impl Partitioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Partitioner honouring `partitioner.key.pattern` when set.
    pub fn from_properties(props: &Properties) -> Result<Self> {
        match props.get(PARTITION_KEY_PATTERN) {
            None => Ok(Self::default()),
            Some(pattern) => {
                let key_pattern = Regex::new(pattern).map_err(|e| {
                    ExtractError::config(format!(
                        "invalid '{}' regex '{}': {}",
                        PARTITION_KEY_PATTERN, pattern, e
                    ))
                })?;
                Ok(Self { key_pattern })
            }
        }
    }

    /// Plan this run's work units.
    ///
    /// # Errors
    /// Returns [`ExtractError::Configuration`] when a partition key is malformed
    /// or duplicated, or when a partition's bounds are missing or inverted.
    pub fn plan(&self, metadata: &SourceMetadata, prior: &Checkpoints) -> Result<Vec<WorkUnit>> {
        let mut seen = BTreeSet::new();
        let mut ordered = BTreeMap::new();

        for partition in &metadata.partitions {
            self.validate(partition)?;
            if !seen.insert(partition.key.as_str()) {
                return Err(ExtractError::config(format!(
                    "partition '{}' is reported more than once",
                    partition.key
                )));
            }
            ordered.insert(partition.key.as_str(), partition);
        }

        let mut units = Vec::new();
        for (key, partition) in ordered {
            let default_start = partition.start.unwrap_or_default();
            let end = partition
                .end
                .ok_or_else(|| missing_bound(key))?;

            let start = match prior.get(key) {
                None => default_start,
                Some(&committed) if committed < default_start => {
                    log::warn!(
                        "Checkpoint {} for '{}' is behind the source's earliest marker {}; resuming from {}",
                        committed,
                        key,
                        default_start,
                        default_start
                    );
                    default_start
                }
                Some(&committed) => committed,
            };

            if start > end {
                log::warn!(
                    "Checkpoint {} for '{}' is ahead of the source maximum {}; skipping",
                    start,
                    key,
                    end
                );
                continue;
            }
            if start == end {
                log::debug!("No new data for '{}' since {}", key, start);
                continue;
            }

            units.push(WorkUnit::new(key, start, end, partition.metadata.clone()));
        }

        log::info!(
            "Planned {} work unit(s) across {} partition(s)",
            units.len(),
            metadata.partitions.len()
        );
        Ok(units)
    }

    fn validate(&self, partition: &PartitionDescriptor) -> Result<()> {
        if !self.key_pattern.is_match(&partition.key) {
            return Err(ExtractError::config(format!(
                "unparseable partition key '{}' (expected to match {})",
                partition.key,
                self.key_pattern.as_str()
            )));
        }
        match (partition.start, partition.end) {
            (_, None) => Err(missing_bound(&partition.key)),
            (Some(start), Some(end)) if start > end => Err(ExtractError::config(format!(
                "partition '{}' has inverted bounds {}..{}",
                partition.key, start, end
            ))),
            _ => Ok(()),
        }
    }
}

fn missing_bound(key: &str) -> ExtractError {
    ExtractError::config(format!("partition '{}' does not report an upper bound", key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(parts: &[(&str, u64)]) -> SourceMetadata {
        SourceMetadata::new(
            parts
                .iter()
                .map(|(k, end)| PartitionDescriptor::new(*k, Marker::new(*end)))
                .collect(),
        )
    }

    fn ranges(units: &[WorkUnit]) -> Vec<String> {
        units.iter().map(WorkUnit::id).collect()
    }

    #[test]
    fn test_initial_plan_covers_everything() {
        let units = Partitioner::new()
            .plan(&source(&[("B", 50), ("A", 100)]), &Checkpoints::new())
            .unwrap();
        assert_eq!(ranges(&units), vec!["A:0..100", "B:0..50"]);
    }

    #[test]
    fn test_resumes_from_checkpoints_and_omits_idle_partitions() {
        let prior = Checkpoints::from([
            ("A".to_string(), Marker::new(100)),
            ("B".to_string(), Marker::new(20)),
        ]);
        let units = Partitioner::new()
            .plan(&source(&[("A", 100), ("B", 50), ("C", 5)]), &prior)
            .unwrap();
        assert_eq!(ranges(&units), vec!["B:20..50", "C:0..5"]);
    }

    #[test]
    fn test_committed_output_replans_only_new_data() {
        let partitioner = Partitioner::new();
        let first = partitioner
            .plan(&source(&[("A", 10), ("B", 4)]), &Checkpoints::new())
            .unwrap();
        let committed: Checkpoints = first
            .iter()
            .map(|u| (u.partition().to_string(), u.end()))
            .collect();

        let again = partitioner
            .plan(&source(&[("A", 10), ("B", 4)]), &committed)
            .unwrap();
        assert!(again.is_empty());

        let grown = partitioner
            .plan(&source(&[("A", 17), ("B", 4)]), &committed)
            .unwrap();
        assert_eq!(ranges(&grown), vec!["A:10..17"]);
    }

    #[test]
    fn test_plan_is_deterministic() {
        let meta = source(&[("z", 3), ("m", 9), ("a", 1)]);
        let p = Partitioner::new();
        assert_eq!(
            p.plan(&meta, &Checkpoints::new()).unwrap(),
            p.plan(&meta, &Checkpoints::new()).unwrap()
        );
    }

    #[test]
    fn test_source_default_start() {
        let meta = SourceMetadata::new(vec![
            PartitionDescriptor::new("A", Marker::new(100)).with_start(Marker::new(60)),
        ]);
        let units = Partitioner::new().plan(&meta, &Checkpoints::new()).unwrap();
        assert_eq!(ranges(&units), vec!["A:60..100"]);

        let stale = Checkpoints::from([("A".to_string(), Marker::new(10))]);
        let units = Partitioner::new().plan(&meta, &stale).unwrap();
        assert_eq!(ranges(&units), vec!["A:60..100"]);
    }

    #[test]
    fn test_checkpoint_ahead_of_source_is_skipped() {
        let prior = Checkpoints::from([("A".to_string(), Marker::new(500))]);
        let units = Partitioner::new().plan(&source(&[("A", 100)]), &prior).unwrap();
        assert!(units.is_empty());
    }

    #[test]
    fn test_malformed_metadata_is_configuration_error() {
        let p = Partitioner::new();

        let bad_key = source(&[("has space", 3)]);
        assert!(matches!(
            p.plan(&bad_key, &Checkpoints::new()),
            Err(ExtractError::Configuration(_))
        ));

        let missing_end = SourceMetadata::new(vec![PartitionDescriptor {
            key: "A".into(),
            start: None,
            end: None,
            metadata: BTreeMap::new(),
        }]);
        let err = p.plan(&missing_end, &Checkpoints::new()).unwrap_err();
        assert!(err.to_string().contains("upper bound"));

        let inverted = SourceMetadata::new(vec![
            PartitionDescriptor::new("A", Marker::new(5)).with_start(Marker::new(9)),
        ]);
        assert!(p.plan(&inverted, &Checkpoints::new()).is_err());

        let duplicated = source(&[("A", 1), ("A", 2)]);
        let err = p.plan(&duplicated, &Checkpoints::new()).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_custom_key_pattern() {
        let props = Properties::from_pairs([(PARTITION_KEY_PATTERN, r"^\d{4}-\d{2}-\d{2}$")]);
        let p = Partitioner::from_properties(&props).unwrap();
        assert!(p.plan(&source(&[("2024-01-31", 3)]), &Checkpoints::new()).is_ok());
        assert!(p.plan(&source(&[("january", 3)]), &Checkpoints::new()).is_err());

        let bad = Properties::from_pairs([(PARTITION_KEY_PATTERN, "(")]);
        assert!(Partitioner::from_properties(&bad).is_err());
    }

    #[test]
    fn test_metadata_is_carried_into_units() {
        let meta = SourceMetadata::new(vec![
            PartitionDescriptor::new("A", Marker::new(3)).with_metadata("path", "/data/A.ndjson"),
        ]);
        let units = Partitioner::new().plan(&meta, &Checkpoints::new()).unwrap();
        assert_eq!(units[0].metadata()["path"], "/data/A.ndjson");
    }
}
