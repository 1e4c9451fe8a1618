//! Job assembly from configuration
//!
//! Resolves the plugins a job names, builds its transform pipeline and
//! checkpoint store, and hands everything to a [`RunCoordinator`].

use crate::bundle::SourceBundle;
use crate::checkpoint::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
use crate::config::{
    JOB_CHECKPOINT_PATH, JOB_COMMIT_POLICY, JOB_CONVERTERS, JOB_DEAD_LETTER_PATH,
    JOB_ERROR_POLICY, JOB_EXTRACTOR, JOB_LOADER, JOB_NAME, JOB_SOURCE, JOB_UNIT_TIMEOUT_SECS,
    JOB_WORKERS, Properties,
};
use crate::coordinator::{CommitPolicy, CoordinatorConfig, RunCoordinator};
use crate::error::{ExtractError, Result};
use crate::etl::TransformPipeline;
use crate::partition::Partitioner;
use crate::registry::PluginRegistry;
use crate::retry::RetryPolicy;
use crate::runner::ErrorPolicy;
use crate::storage::DeadLetterWriter;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_JOB_NAME: &str = "job";
const DEFAULT_WORKERS: usize = 4;

/// A configured job, ready to be built into a coordinator.
pub struct Job {
    props: Properties,
    registry: PluginRegistry,
}

impl Job {
    /// A job resolved against the built-in plugins.
    pub fn new(props: Properties) -> Self {
        Self::with_registry(props, PluginRegistry::with_builtins())
    }

    pub fn with_registry(props: Properties, registry: PluginRegistry) -> Self {
        Self { props, registry }
    }

    pub fn name(&self) -> &str {
        self.props.get_or(JOB_NAME, DEFAULT_JOB_NAME)
    }

    pub fn coordinator_config(&self) -> Result<CoordinatorConfig> {
        let workers: usize = self.props.parse_or(JOB_WORKERS, DEFAULT_WORKERS)?;
        if workers == 0 {
            return Err(ExtractError::config(format!(
                "'{}' must be at least 1",
                JOB_WORKERS
            )));
        }

        let unit_timeout = match self.props.parse::<u64>(JOB_UNIT_TIMEOUT_SECS)? {
            None | Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
        };

        Ok(CoordinatorConfig {
            job: self.name().to_string(),
            workers,
            commit_policy: self
                .props
                .parse_or(JOB_COMMIT_POLICY, CommitPolicy::default())?,
            error_policy: self
                .props
                .parse_or(JOB_ERROR_POLICY, ErrorPolicy::default())?,
            unit_timeout,
            retry: RetryPolicy::from_properties(&self.props)?,
        })
    }

    /// Converters named in `job.converters`, in order.
    pub fn pipeline(&self) -> Result<TransformPipeline> {
        let stages = self
            .props
            .list(JOB_CONVERTERS)
            .iter()
            .map(|name| {
                self.registry
                    .converter(name, &self.props)
                    .map_err(named_by(JOB_CONVERTERS, name))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(TransformPipeline::new(stages))
    }

    /// File-backed store when `job.checkpoint.path` is set, in-memory otherwise.
    pub fn checkpoint_store(&self) -> Result<Arc<dyn CheckpointStore>> {
        match self.props.get(JOB_CHECKPOINT_PATH) {
            Some(path) => Ok(Arc::new(FileCheckpointStore::new(path)?)),
            None => {
                log::warn!(
                    "No '{}' configured; checkpoints will not outlive this process",
                    JOB_CHECKPOINT_PATH
                );
                Ok(Arc::new(MemoryCheckpointStore::new()))
            }
        }
    }

    pub fn build(&self) -> Result<RunCoordinator> {
        self.build_with_store(self.checkpoint_store()?)
    }

    /// Build against an explicit checkpoint store.
    pub fn build_with_store(&self, store: Arc<dyn CheckpointStore>) -> Result<RunCoordinator> {
        let config = self.coordinator_config()?;

        let source_name = self.props.require(JOB_SOURCE)?;
        let extractor_name = self.props.get_or(JOB_EXTRACTOR, source_name);
        let loader_name = self.props.require(JOB_LOADER)?;

        let data_source = self
            .registry
            .data_source(source_name, &self.props)
            .map_err(named_by(JOB_SOURCE, source_name))?;
        let extractor = self
            .registry
            .extractor(extractor_name, &self.props)
            .map_err(named_by(JOB_EXTRACTOR, extractor_name))?;
        let source = SourceBundle::new(data_source, extractor)
            .with_partitioner(Partitioner::from_properties(&self.props)?);
        let loader = self
            .registry
            .loader(loader_name, &self.props)
            .map_err(named_by(JOB_LOADER, loader_name))?;
        let pipeline = self.pipeline()?;

        log::debug!(
            "Job '{}': source '{}', extractor '{}', loader '{}', converters [{}]",
            config.job,
            source_name,
            extractor_name,
            loader_name,
            pipeline.stage_names().join(", ")
        );

        let mut coordinator = RunCoordinator::new(
            Arc::new(source),
            loader,
            Arc::new(pipeline),
            store,
            config,
        );
        if let Some(path) = self.props.get(JOB_DEAD_LETTER_PATH) {
            coordinator = coordinator.with_dead_letters(DeadLetterWriter::new(path));
        }
        Ok(coordinator)
    }
}

/// Prefix a plugin's configuration error with the property that named it.
fn named_by<'a>(key: &'a str, name: &'a str) -> impl FnOnce(ExtractError) -> ExtractError + 'a {
    move |err| match err {
        ExtractError::Configuration(message) => {
            ExtractError::config(format!("{} = '{}': {}", key, name, message))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn props(temp: &TempDir, extra: &[(&str, &str)]) -> Properties {
        let mut props = Properties::from_pairs([
            (JOB_SOURCE, "ndjson".to_string()),
            (JOB_LOADER, "ndjson".to_string()),
            ("source.ndjson.dir", temp.path().display().to_string()),
            ("loader.ndjson.dir", temp.path().join("out").display().to_string()),
        ]);
        for (k, v) in extra {
            props.set(*k, *v);
        }
        props
    }

    #[test]
    fn test_defaults() {
        let temp = TempDir::new().unwrap();
        let job = Job::new(props(&temp, &[]));
        let config = job.coordinator_config().unwrap();

        assert_eq!(config.job, "job");
        assert_eq!(config.workers, 4);
        assert_eq!(config.commit_policy, CommitPolicy::AllOrNothing);
        assert_eq!(config.error_policy, ErrorPolicy::Strict);
        assert_eq!(config.unit_timeout, None);
        assert_eq!(config.retry, RetryPolicy::default());
        assert!(job.pipeline().unwrap().is_empty());
    }

    #[test]
    fn test_overrides() {
        let temp = TempDir::new().unwrap();
        let job = Job::new(props(
            &temp,
            &[
                (JOB_NAME, "nightly"),
                (JOB_WORKERS, "8"),
                (JOB_COMMIT_POLICY, "per-unit"),
                (JOB_ERROR_POLICY, "skip"),
                (JOB_UNIT_TIMEOUT_SECS, "30"),
                (JOB_CONVERTERS, "explode, json_document"),
                ("converter.explode.field", "items"),
            ],
        ));
        let config = job.coordinator_config().unwrap();

        assert_eq!(config.job, "nightly");
        assert_eq!(config.workers, 8);
        assert_eq!(config.commit_policy, CommitPolicy::PerUnit);
        assert_eq!(config.error_policy, ErrorPolicy::Skip);
        assert_eq!(config.unit_timeout, Some(Duration::from_secs(30)));
        assert_eq!(
            job.pipeline().unwrap().stage_names(),
            vec!["explode", "json_document"]
        );
    }

    #[test]
    fn test_invalid_values_are_configuration_errors() {
        let temp = TempDir::new().unwrap();
        for (key, value) in [
            (JOB_WORKERS, "0"),
            (JOB_WORKERS, "many"),
            (JOB_COMMIT_POLICY, "sometimes"),
            (JOB_ERROR_POLICY, "lenient"),
        ] {
            let job = Job::new(props(&temp, &[(key, value)]));
            let err = job.coordinator_config().unwrap_err();
            assert_eq!(err.kind(), "configuration", "{key}={value}");
        }

        let job = Job::new(props(&temp, &[(JOB_CONVERTERS, "uppercase")]));
        assert!(job.pipeline().is_err());
    }

    #[test]
    fn test_build_requires_plugins() {
        let temp = TempDir::new().unwrap();
        let mut p = props(&temp, &[]);
        p.set(JOB_LOADER, "");
        assert!(Job::new(p).build().is_err());

        let job = Job::new(props(&temp, &[(JOB_SOURCE, "jdbc")]));
        let err = match job.build() {
            Ok(_) => panic!("jdbc should not resolve"),
            Err(err) => err.to_string(),
        };
        assert!(err.contains("job.source = 'jdbc'"), "got: {err}");

        assert!(Job::new(props(&temp, &[])).build().is_ok());
    }

    #[tokio::test]
    async fn test_file_store_is_used_when_configured() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state/checkpoints.json");
        let path_str = path.display().to_string();
        let job = Job::new(props(&temp, &[(JOB_CHECKPOINT_PATH, path_str.as_str())]));

        let coordinator = job.build().unwrap();
        assert!(coordinator.plan().await.unwrap().is_empty());
        assert!(path.parent().unwrap().exists());
    }
}
