//! Flat key-value job configuration
//!
//! The core never parses configuration formats itself: it only reads resolved
//! values by key from [`Properties`]. Job files are dotenv-style `key=value`
//! lines, loaded with `dotenvy` without touching the process environment.
//! Values containing spaces must be quoted: `job.converters="a, b"`.

use crate::error::{ExtractError, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

pub const JOB_NAME: &str = "job.name";
pub const JOB_SOURCE: &str = "job.source";
pub const JOB_EXTRACTOR: &str = "job.extractor";
pub const JOB_LOADER: &str = "job.loader";
pub const JOB_CONVERTERS: &str = "job.converters";
pub const JOB_WORKERS: &str = "job.workers";
pub const JOB_COMMIT_POLICY: &str = "job.commit.policy";
pub const JOB_ERROR_POLICY: &str = "job.error.policy";
pub const JOB_UNIT_TIMEOUT_SECS: &str = "job.unit.timeout.secs";
pub const JOB_RETRY_MAX: &str = "job.retry.max";
pub const JOB_RETRY_BACKOFF_MS: &str = "job.retry.backoff.ms";
pub const JOB_RETRY_BACKOFF_MAX_MS: &str = "job.retry.backoff.max.ms";
pub const JOB_CHECKPOINT_PATH: &str = "job.checkpoint.path";
pub const JOB_DEAD_LETTER_PATH: &str = "job.dead_letter.path";

/// Resolved configuration values, keyed by dotted names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    values: BTreeMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a dotenv-format job file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let iter = dotenvy::from_filename_iter(path).map_err(|e| {
            ExtractError::config(format!("failed to read job file {}: {}", path.display(), e))
        })?;

        let mut values = BTreeMap::new();
        for item in iter {
            let (key, value) = item.map_err(|e| {
                let hint = match e {
                    dotenvy::Error::LineParse(..) => " (quote values that contain spaces)",
                    _ => "",
                };
                ExtractError::config(format!(
                    "failed to parse job file {}: {}{}",
                    path.display(),
                    e,
                    hint
                ))
            })?;
            values.insert(key, value);
        }

        log::debug!("Loaded {} propert(ies) from {}", values.len(), path.display());
        Ok(Self { values })
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Apply a `key=value` override, as passed with `--set`.
    pub fn apply_override(&mut self, assignment: &str) -> Result<()> {
        let (key, value) = assignment.split_once('=').ok_or_else(|| {
            ExtractError::config(format!("override '{}' is not of the form key=value", assignment))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ExtractError::config(format!(
                "override '{}' has an empty key",
                assignment
            )));
        }
        self.set(key, value.trim());
        Ok(())
    }

    /// Value for `key`, with blank values treated as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v.as_str())
            .filter(|v| !v.trim().is_empty())
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| ExtractError::config(format!("missing required property '{}'", key)))
    }

    /// Parse a typed value; `Ok(None)` when unset, an error when malformed.
    pub fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
                ExtractError::config(format!("invalid value '{}' for '{}': {}", raw, key, e))
            }),
        }
    }

    pub fn parse_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        Ok(self.parse(key)?.unwrap_or(default))
    }

    /// Comma-separated list, trimmed, empty entries dropped.
    pub fn list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_job_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# nightly export").unwrap();
        writeln!(file, "job.source=ndjson").unwrap();
        writeln!(file, "job.workers=8").unwrap();
        writeln!(file, r#"job.converters="drop_fields, json_document""#).unwrap();

        let props = Properties::load(file.path()).unwrap();
        assert_eq!(props.get(JOB_SOURCE), Some("ndjson"));
        assert_eq!(props.parse::<usize>(JOB_WORKERS).unwrap(), Some(8));
        assert_eq!(
            props.list(JOB_CONVERTERS),
            vec!["drop_fields".to_string(), "json_document".to_string()]
        );
    }

    #[test]
    fn test_unquoted_spaces_suggest_quoting() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "job.converters=drop_fields, json_document").unwrap();

        let err = Properties::load(file.path()).unwrap_err();
        assert!(matches!(err, ExtractError::Configuration(_)));
        assert!(err.to_string().contains("quote values"), "got: {err}");
    }

    #[test]
    fn test_require_names_missing_key() {
        let props = Properties::new();
        let err = props.require(JOB_LOADER).unwrap_err();
        assert!(matches!(err, ExtractError::Configuration(_)));
        assert!(err.to_string().contains("job.loader"));
    }

    #[test]
    fn test_malformed_value_is_configuration_error() {
        let props = Properties::from_pairs([(JOB_WORKERS, "many")]);
        let err = props.parse::<usize>(JOB_WORKERS).unwrap_err();
        assert!(err.to_string().contains("many"));
    }

    #[test]
    fn test_blank_values_are_unset() {
        let props = Properties::from_pairs([(JOB_CHECKPOINT_PATH, "  ")]);
        assert_eq!(props.get(JOB_CHECKPOINT_PATH), None);
        assert_eq!(props.get_or(JOB_NAME, "job"), "job");
    }

    #[test]
    fn test_apply_override() {
        let mut props = Properties::from_pairs([(JOB_WORKERS, "2")]);
        props.apply_override("job.workers = 6").unwrap();
        assert_eq!(props.parse::<usize>(JOB_WORKERS).unwrap(), Some(6));
        assert!(props.apply_override("no-equals-sign").is_err());
        assert!(props.apply_override("=value").is_err());
    }
}
