//! Plugin registry
//!
//! Jobs name their data source, extractor, loader and converters in
//! configuration. The registry maps those names to builders, each of which
//! receives the job's [`Properties`] to read its own options.

use crate::config::Properties;
use crate::error::{ExtractError, Result};
use crate::etl::{Converter, DataSource, Extractor, IdentityConverter, Loader};
use crate::storage::{DirectoryLoader, DirectorySource};
use crate::transform::{ArrayExploder, FieldDropper, JsonDocumentConverter};
use std::collections::BTreeMap;
use std::sync::Arc;

type Builder<T> = Box<dyn Fn(&Properties) -> Result<T> + Send + Sync>;

/// Name of the built-in directory-of-NDJSON plugins.
pub const NDJSON: &str = "ndjson";

/// Named builders for every pluggable capability.
#[derive(Default)]
pub struct PluginRegistry {
    data_sources: BTreeMap<String, Builder<Arc<dyn DataSource>>>,
    extractors: BTreeMap<String, Builder<Arc<dyn Extractor>>>,
    loaders: BTreeMap<String, Builder<Arc<dyn Loader>>>,
    converters: BTreeMap<String, Builder<Box<dyn Converter>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in NDJSON plugins and converters.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_data_source(NDJSON, |props| {
            Ok(Arc::new(DirectorySource::from_properties(props)?))
        });
        registry.register_extractor(NDJSON, |props| {
            Ok(Arc::new(DirectorySource::from_properties(props)?))
        });
        registry.register_loader(NDJSON, |props| {
            Ok(Arc::new(DirectoryLoader::from_properties(props)?))
        });
        registry.register_converter("identity", |_| Ok(Box::new(IdentityConverter)));
        registry.register_converter("json_document", |props| {
            Ok(Box::new(JsonDocumentConverter::from_properties(props)))
        });
        registry.register_converter("drop_fields", |props| {
            Ok(Box::new(FieldDropper::from_properties(props)?))
        });
        registry.register_converter("explode", |props| {
            Ok(Box::new(ArrayExploder::from_properties(props)?))
        });
        registry
    }

    pub fn register_data_source<F>(&mut self, name: &str, builder: F)
    where
        F: Fn(&Properties) -> Result<Arc<dyn DataSource>> + Send + Sync + 'static,
    {
        self.data_sources.insert(name.to_string(), Box::new(builder));
    }

    pub fn register_extractor<F>(&mut self, name: &str, builder: F)
    where
        F: Fn(&Properties) -> Result<Arc<dyn Extractor>> + Send + Sync + 'static,
    {
        self.extractors.insert(name.to_string(), Box::new(builder));
    }

    pub fn register_loader<F>(&mut self, name: &str, builder: F)
    where
        F: Fn(&Properties) -> Result<Arc<dyn Loader>> + Send + Sync + 'static,
    {
        self.loaders.insert(name.to_string(), Box::new(builder));
    }

    pub fn register_converter<F>(&mut self, name: &str, builder: F)
    where
        F: Fn(&Properties) -> Result<Box<dyn Converter>> + Send + Sync + 'static,
    {
        self.converters.insert(name.to_string(), Box::new(builder));
    }

    pub fn data_source(&self, name: &str, props: &Properties) -> Result<Arc<dyn DataSource>> {
        build(&self.data_sources, "data source", name, props)
    }

    pub fn extractor(&self, name: &str, props: &Properties) -> Result<Arc<dyn Extractor>> {
        build(&self.extractors, "extractor", name, props)
    }

    pub fn loader(&self, name: &str, props: &Properties) -> Result<Arc<dyn Loader>> {
        build(&self.loaders, "loader", name, props)
    }

    pub fn converter(&self, name: &str, props: &Properties) -> Result<Box<dyn Converter>> {
        build(&self.converters, "converter", name, props)
    }

    /// Registered converter names, sorted.
    pub fn converter_names(&self) -> impl Iterator<Item = &str> {
        self.converters.keys().map(String::as_str)
    }
}

fn build<T>(
    builders: &BTreeMap<String, Builder<T>>,
    kind: &str,
    name: &str,
    props: &Properties,
) -> Result<T> {
    let builder = builders.get(name).ok_or_else(|| {
        let known: Vec<&str> = builders.keys().map(String::as_str).collect();
        ExtractError::config(format!(
            "unknown {} '{}' (known: {})",
            kind,
            name,
            known.join(", ")
        ))
    })?;
    log::debug!("Building {} '{}'", kind, name);
    builder(props)
}
