use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::Context;
use log::{debug, error, info, warn};
use tokio::task::JoinHandle;

use identify::content::Content;
use identify::mimetype_map::{mimetype_map, MimetypeMap, MIMETYPE_METADATA_EMBED, MIMETYPE_METADATA_EXTRACT};
use services::Config;

use crate::config::{
    SupportedSourceAndTarget, TransformConfig, TransformOption, TransformOptionGroup, Transformer, UNLIMITED,
};
use crate::debug::TransformerDebug;
use crate::engines::TransformEngine;
use crate::error::TransformError;
use crate::limits::TransformerConfigLimits;
use crate::local::{
    LocalFailoverTransform, LocalPipelineTransform, LocalTransform, LocalTransformImpl, TransformCore,
    TransformRequest,
};
use crate::options::TransformOptions;
use crate::registry::{SupportedTransform, TransformServiceRegistry};

/// Property turning on a second attempt with the detected mimetype when a transform fails.
pub const PROP_RETRY_ON_DIFFERENT_MIMETYPE: &str = "local.transform.retryOnDifferentMimetype";

/// Where pipeline and failover definitions are read from.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// A JSON file.
    File(PathBuf),
    /// Every `*.json` file in a directory, in name order.
    Dir(PathBuf),
    /// A JSON document.
    Inline(String),
}

impl ConfigSource {
    fn describe(&self) -> String {
        match self {
            ConfigSource::File(path) | ConfigSource::Dir(path) => path.display().to_string(),
            ConfigSource::Inline(_) => "inline configuration".to_string(),
        }
    }

    async fn read(&self) -> Result<Vec<(String, String)>, anyhow::Error> {
        match self {
            ConfigSource::Inline(json) => Ok(vec![(self.describe(), json.clone())]),
            ConfigSource::File(path) => Ok(vec![(path.display().to_string(), read_file(path).await?)]),
            ConfigSource::Dir(dir) => {
                let mut paths = vec![];
                let mut entries = tokio::fs::read_dir(dir)
                    .await
                    .with_context(|| format!("failed to read directory '{}'", dir.display()))?;
                while let Some(entry) = entries.next_entry().await? {
                    let path = entry.path();
                    if path.extension().is_some_and(|extension| extension == "json") {
                        paths.push(path);
                    }
                }
                paths.sort();

                let mut configs = vec![];
                for path in paths {
                    configs.push((path.display().to_string(), read_file(&path).await?));
                }
                Ok(configs)
            }
        }
    }
}

async fn read_file(path: &Path) -> Result<String, anyhow::Error> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read '{}'", path.display()))
}

/// A transformer definition and where it came from.
///
#[derive(Clone)]
struct Definition {
    transformer: Transformer,
    engine: Option<Arc<dyn TransformEngine>>,
    read_from: String,
}

/// The transforms built from one reading of the configuration.
///
#[derive(Default)]
struct LocalData {
    registry: TransformServiceRegistry,
    transforms: HashMap<String, Arc<dyn LocalTransform>>,
    errors: Vec<String>,
}

/// Finds and runs transforms performed in this process.
///
/// Single step transformers are advertised by engines. Pipelines and failover transforms that combine them are
/// read from JSON configuration. A definition may override an earlier one of the same name, inheriting its engine.
/// Invalid definitions are logged and ignored; the rest remain usable.
///
/// The configuration is read by [`LocalTransformServiceRegistry::read_config`], which replaces the transforms in
/// use in one step so that requests in flight are unaffected.
///
pub struct LocalTransformServiceRegistry {
    engines: Vec<Arc<dyn TransformEngine>>,
    sources: Vec<ConfigSource>,
    config: Config,
    limits: Arc<TransformerConfigLimits>,
    mimetype_map: Option<Arc<MimetypeMap>>,
    data: RwLock<Arc<LocalData>>,
}

impl LocalTransformServiceRegistry {
    /// Start building a registry.
    ///
    pub fn builder() -> LocalTransformServiceRegistryBuilder {
        LocalTransformServiceRegistryBuilder::default()
    }

    /// Read the engines and configuration sources again and start using the result.
    ///
    /// # Returns
    ///
    /// An error listing the problems found. The valid transforms are used even then.
    ///
    pub async fn read_config(&self) -> Result<(), TransformError> {
        let data = self.build_data().await;
        let errors = data.errors.clone();
        info!("Read {} local transforms", data.transforms.len());

        *self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::new(data);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(TransformError::InvalidConfig(errors))
        }
    }

    /// Re-read the configuration every `normal` interval, or every `on_error` interval while it has errors.
    ///
    pub fn spawn_periodic_reload(self: Arc<Self>, normal: Duration, on_error: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut delay = normal;
            loop {
                tokio::time::sleep(delay).await;
                delay = match self.read_config().await {
                    Ok(()) => normal,
                    Err(err) => {
                        warn!("Local transform configuration has errors, re-reading in {:?}: {}", on_error, err);
                        on_error
                    }
                };
            }
        })
    }

    /// The problems found when the configuration was last read.
    ///
    pub fn errors(&self) -> Vec<String> {
        self.data().errors.clone()
    }

    /// The names of all transforms.
    ///
    pub fn transform_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.data().transforms.keys().cloned().collect();
        names.sort();
        names
    }

    /// Find the transform to use.
    ///
    /// # Arguments
    ///
    /// * `source_mimetype` - The source mimetype.
    /// * `source_size` - The source size in bytes, or -1 if unknown.
    /// * `target_mimetype` - The target mimetype.
    /// * `options` - The request options.
    /// * `rendition` - The rendition the transform is for, if any.
    ///
    pub fn get_local_transform(
        &self,
        source_mimetype: &str,
        source_size: i64,
        target_mimetype: &str,
        options: &TransformOptions,
        rendition: Option<&str>,
    ) -> Option<Arc<dyn LocalTransform>> {
        Self::find(&self.data(), source_mimetype, source_size, target_mimetype, options, rendition)
    }

    /// Whether a transform is supported.
    ///
    pub fn is_supported(
        &self,
        source_mimetype: &str,
        source_size: i64,
        target_mimetype: &str,
        options: &TransformOptions,
        rendition: Option<&str>,
    ) -> bool {
        self.data()
            .registry
            .is_supported(source_mimetype, source_size, target_mimetype, options, rendition)
    }

    /// The largest source supported, [`UNLIMITED`], or 0 if not supported.
    ///
    pub fn max_size(
        &self,
        source_mimetype: &str,
        target_mimetype: &str,
        options: &TransformOptions,
        rendition: Option<&str>,
    ) -> i64 {
        self.data()
            .registry
            .max_size(source_mimetype, target_mimetype, options, rendition)
    }

    /// The transforms from a source mimetype, by target mimetype.
    ///
    pub fn transforms_from(&self, source_mimetype: &str) -> BTreeMap<String, Vec<SupportedTransform>> {
        self.data().registry.transforms_from(source_mimetype)
    }

    /// The source mimetypes of all transforms.
    ///
    pub fn source_mimetypes(&self) -> Vec<String> {
        self.data().registry.source_mimetypes()
    }

    /// Transform content into a file.
    ///
    /// # Arguments
    ///
    /// * `content` - The content to transform.
    /// * `target_path` - Where to write the result.
    /// * `target_mimetype` - The mimetype to produce.
    /// * `options` - The request options.
    /// * `rendition` - The rendition the transform is for, if any.
    ///
    pub async fn transform(
        &self,
        content: &Content,
        target_path: &Path,
        target_mimetype: &str,
        options: &TransformOptions,
        rendition: Option<&str>,
    ) -> Result<(), TransformError> {
        let debug = TransformerDebug::new();
        self.transform_with_debug(content, target_path, target_mimetype, options, rendition, &debug)
            .await
    }

    /// Transform content into a file, tracing with `debug`.
    ///
    /// If the transform fails and [`PROP_RETRY_ON_DIFFERENT_MIMETYPE`] is on (the default), the content is
    /// identified. If it is not what it claims to be, the transform is tried once more with the detected mimetype.
    /// The original error is returned if that fails too.
    ///
    pub async fn transform_with_debug(
        &self,
        content: &Content,
        target_path: &Path,
        target_mimetype: &str,
        options: &TransformOptions,
        rendition: Option<&str>,
        debug: &TransformerDebug,
    ) -> Result<(), TransformError> {
        let data = self.data();
        let err = match Self::transform_once(&data, content, target_path, target_mimetype, options, rendition, debug)
            .await
        {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };

        if !self.config.get_bool(PROP_RETRY_ON_DIFFERENT_MIMETYPE, true) || !content.exists() {
            return Err(err);
        }
        let detected = match &self.mimetype_map {
            Some(mimetype_map) => mimetype_map.mimetype_if_not_matches(content).await,
            None => mimetype_map().mimetype_if_not_matches(content).await,
        };
        let Some(detected) = detected else {
            return Err(err);
        };

        info!(
            "Transform of {} failed, retrying as {}: {}",
            content.mimetype, detected, err
        );
        debug.debug(&format!("Retrying transform as {} is really {}", content.mimetype, detected));
        let retry = content.with_mimetype(detected);
        Self::transform_once(&data, &retry, target_path, target_mimetype, options, rendition, debug)
            .await
            .map_err(|retry_err| {
                debug!("Retry as {} failed: {}", retry.mimetype, retry_err);
                err
            })
    }

    async fn transform_once(
        data: &LocalData,
        content: &Content,
        target_path: &Path,
        target_mimetype: &str,
        options: &TransformOptions,
        rendition: Option<&str>,
        debug: &TransformerDebug,
    ) -> Result<(), TransformError> {
        let size = i64::try_from(content.size).unwrap_or(i64::MAX);
        let transform = Self::find(data, &content.mimetype, size, target_mimetype, options, rendition).ok_or_else(
            || TransformError::NoTransformer {
                source_mimetype: content.mimetype.clone(),
                target_mimetype: target_mimetype.to_string(),
            },
        )?;

        let request = TransformRequest {
            source: content,
            target_path,
            target_mimetype,
            options,
            rendition,
        };
        transform.transform(&request, debug).await
    }

    fn find(
        data: &LocalData,
        source_mimetype: &str,
        source_size: i64,
        target_mimetype: &str,
        options: &TransformOptions,
        rendition: Option<&str>,
    ) -> Option<Arc<dyn LocalTransform>> {
        data.registry
            .find_transformer_name(source_mimetype, source_size, target_mimetype, options, rendition)
            .and_then(|name| data.transforms.get(&name).cloned())
    }

    fn data(&self) -> Arc<LocalData> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    async fn build_data(&self) -> LocalData {
        let mut errors = vec![];
        let mut options_by_name = BTreeMap::new();
        let mut definitions = self.engine_definitions(&mut options_by_name, &mut errors);

        for source in &self.sources {
            let configs = match source.read().await {
                Ok(configs) => configs,
                Err(err) => {
                    errors.push(format!("{:#}", err));
                    continue;
                }
            };
            for (read_from, json) in configs {
                match TransformConfig::from_json(&json) {
                    Ok(config) => {
                        options_by_name.extend(config.transform_options);
                        for transformer in config.transformers {
                            add_definition(&mut definitions, transformer, None, &read_from, &mut errors);
                        }
                    }
                    Err(err) => errors.push(format!("failed to parse {}: {}", read_from, err)),
                }
            }
        }

        let data = self.build_transforms(definitions, &options_by_name, errors);
        for error in &data.errors {
            error!("{}", error);
        }
        data
    }

    fn engine_definitions(
        &self,
        options_by_name: &mut BTreeMap<String, Vec<TransformOption>>,
        errors: &mut Vec<String>,
    ) -> Vec<Definition> {
        let mut definitions = vec![];
        for engine in &self.engines {
            let config = match engine.config() {
                Ok(config) => config,
                Err(err) => {
                    errors.push(err.to_string());
                    continue;
                }
            };
            options_by_name.extend(config.transform_options);

            let read_from = format!("engine {}", engine.name());
            let mut names = HashSet::new();
            for transformer in config.transformers {
                if !names.insert(transformer.name().to_string()) {
                    errors.push(format!(
                        "Transformer \"{}\" must be a unique name within {}",
                        transformer.name(),
                        read_from
                    ));
                    continue;
                }
                add_definition(&mut definitions, transformer, Some(engine.clone()), &read_from, errors);
            }
        }
        definitions
    }

    fn build_transforms(
        &self,
        definitions: Vec<Definition>,
        options_by_name: &BTreeMap<String, Vec<TransformOption>>,
        mut errors: Vec<String>,
    ) -> LocalData {
        let data = LocalData::default();
        let mut transforms: HashMap<String, Arc<dyn LocalTransform>> = HashMap::new();
        let mut built: HashMap<String, Transformer> = HashMap::new();
        let names: HashSet<String> = definitions
            .iter()
            .map(|definition| definition.transformer.name().to_string())
            .collect();

        let mut pending = definitions;
        loop {
            let mut waiting = vec![];
            let count = pending.len();

            for definition in pending {
                let steps = step_names(&definition.transformer);
                let unknown: Vec<&String> = steps.iter().filter(|step| !names.contains(*step)).collect();
                if !unknown.is_empty() {
                    errors.push(format!(
                        "Transformer \"{}\" from {} refers to unknown transformers {:?}",
                        definition.transformer.name(),
                        definition.read_from,
                        unknown
                    ));
                    continue;
                }
                if !steps.iter().all(|step| built.contains_key(step)) {
                    waiting.push(definition);
                    continue;
                }

                match self.build_transform(&definition, &transforms, &built, options_by_name) {
                    Ok((transformer, transform)) => {
                        if let Err(err) = data.registry.register(&transformer, options_by_name) {
                            errors.push(format!("{} from {}", err, definition.read_from));
                        }
                        debug!("Local {} transform {} from {}", transform.kind(), transformer.name(), definition.read_from);
                        transforms.insert(transformer.name().to_string(), transform);
                        built.insert(transformer.name().to_string(), transformer);
                    }
                    Err(err) => errors.push(format!("{} from {}", err, definition.read_from)),
                }
            }

            if waiting.is_empty() {
                break;
            }
            if waiting.len() == count {
                for definition in waiting {
                    errors.push(format!(
                        "Transformer \"{}\" from {} refers to transformers that could not be built",
                        definition.transformer.name(),
                        definition.read_from
                    ));
                }
                break;
            }
            pending = waiting;
        }

        LocalData {
            transforms,
            errors,
            ..data
        }
    }

    fn build_transform(
        &self,
        definition: &Definition,
        transforms: &HashMap<String, Arc<dyn LocalTransform>>,
        built: &HashMap<String, Transformer>,
        options_by_name: &BTreeMap<String, Vec<TransformOption>>,
    ) -> Result<(Transformer, Arc<dyn LocalTransform>), anyhow::Error> {
        let mut transformer = definition.transformer.clone();
        let step_transformers: Vec<&Transformer> = step_names(&transformer)
            .iter()
            .filter_map(|step| built.get(step))
            .collect();

        if transformer.transform_options.is_empty() {
            let mut inherited: Vec<String> = vec![];
            for step in &step_transformers {
                for name in &step.transform_options {
                    if !inherited.contains(name) {
                        inherited.push(name.clone());
                    }
                }
            }
            transformer.transform_options = inherited;
        }
        if transformer.supported_source_and_target_list.is_empty() {
            transformer.supported_source_and_target_list = if transformer.is_pipeline() {
                pipeline_supported_list(&transformer, built)
            } else {
                failover_supported_list(&step_transformers)
            };
        }

        let option_names: HashSet<String> = transformer
            .transform_options
            .iter()
            .filter_map(|name| options_by_name.get(name))
            .flat_map(|options| TransformOptionGroup::new(false, options.clone()).option_names())
            .collect();
        let core = TransformCore {
            name: transformer.name().to_string(),
            option_names,
            limits: self.limits.clone(),
        };

        let step = |name: &str| {
            transforms
                .get(name)
                .cloned()
                .with_context(|| format!("transformer \"{}\" is not available", name))
        };
        let transform: Arc<dyn LocalTransform> = if transformer.is_pipeline() {
            let mut steps = vec![];
            let last = transformer.transformer_pipeline.len() - 1;
            for (i, pipeline_step) in transformer.transformer_pipeline.iter().enumerate() {
                if i < last && pipeline_step.target_media_type.is_none() {
                    anyhow::bail!(
                        "Transformer \"{}\" has a pipeline step \"{}\" without a target mimetype",
                        transformer.name(),
                        pipeline_step.transformer_name
                    );
                }
                steps.push((step(&pipeline_step.transformer_name)?, pipeline_step.target_media_type.clone()));
            }
            Arc::new(LocalPipelineTransform::new(core, steps))
        } else if transformer.is_failover() {
            let steps = transformer
                .transformer_failover
                .iter()
                .map(|name| step(name))
                .collect::<Result<Vec<_>, _>>()?;
            Arc::new(LocalFailoverTransform::new(core, steps))
        } else {
            let engine = definition
                .engine
                .clone()
                .with_context(|| format!("Transformer \"{}\" has no engine", transformer.name()))?;
            Arc::new(LocalTransformImpl::new(core, engine))
        };

        Ok((transformer, transform))
    }
}

/// Add a definition, validating it and replacing any earlier definition of the same name.
///
fn add_definition(
    definitions: &mut Vec<Definition>,
    transformer: Transformer,
    engine: Option<Arc<dyn TransformEngine>>,
    read_from: &str,
    errors: &mut Vec<String>,
) {
    let name = transformer.name().to_string();
    if name.is_empty() {
        errors.push(format!("Transformer names may not be null. Read from {}", read_from));
        return;
    }
    if transformer.is_pipeline() && transformer.is_failover() {
        errors.push(format!(
            "Transformer \"{}\" cannot have both pipeline and failover sections. Read from {}",
            name, read_from
        ));
        return;
    }

    let single_step = !transformer.is_pipeline() && !transformer.is_failover();
    let existing = definitions
        .iter()
        .position(|definition| definition.transformer.name() == name);
    let engine = engine.or_else(|| existing.and_then(|index| definitions[index].engine.clone()));
    if single_step && engine.is_none() {
        errors.push(format!(
            "Single step transformers (such as \"{}\") must be defined in an engine or override one. Read from {}",
            name, read_from
        ));
        return;
    }

    if let Some(index) = existing {
        let replaced = definitions.remove(index);
        debug!(
            "Transformer \"{}\" from {} overrides the one from {}",
            name, read_from, replaced.read_from
        );
    }

    definitions.push(Definition {
        transformer,
        engine,
        read_from: read_from.to_string(),
    });
}

fn step_names(transformer: &Transformer) -> Vec<String> {
    if transformer.is_pipeline() {
        transformer
            .transformer_pipeline
            .iter()
            .map(|step| step.transformer_name.clone())
            .collect()
    } else {
        transformer.transformer_failover.clone()
    }
}

/// The pairs a pipeline supports: sources of the first step chained through each intermediate mimetype to the
/// targets of the last step. Metadata pseudo mimetypes are not pipeline targets.
///
fn pipeline_supported_list(
    transformer: &Transformer,
    built: &HashMap<String, Transformer>,
) -> Vec<SupportedSourceAndTarget> {
    let steps = &transformer.transformer_pipeline;
    let Some(first) = steps.first().and_then(|step| built.get(&step.transformer_name)) else {
        return vec![];
    };
    let first_target = steps[0].target_media_type.as_deref();

    // (source, max size of the first step, current mimetype)
    let mut chains: Vec<(String, i64, String)> = first
        .supported_source_and_target_list
        .iter()
        .filter(|supported| steps.len() == 1 || Some(supported.target_media_type.as_str()) == first_target)
        .map(|supported| {
            (
                supported.source_media_type.clone(),
                supported.max_source_size_bytes,
                supported.target_media_type.clone(),
            )
        })
        .collect();

    for (i, step) in steps.iter().enumerate().skip(1) {
        let Some(step_transformer) = built.get(&step.transformer_name) else {
            return vec![];
        };
        let last = i == steps.len() - 1;
        let mut next = vec![];
        for (source, max_size, current) in &chains {
            for supported in &step_transformer.supported_source_and_target_list {
                if &supported.source_media_type != current {
                    continue;
                }
                if !last && Some(supported.target_media_type.as_str()) != step.target_media_type.as_deref() {
                    continue;
                }
                next.push((source.clone(), *max_size, supported.target_media_type.clone()));
            }
        }
        chains = next;
    }

    let mut supported_list: Vec<SupportedSourceAndTarget> = vec![];
    for (source, max_size, target) in chains {
        if target == MIMETYPE_METADATA_EXTRACT || target == MIMETYPE_METADATA_EMBED {
            continue;
        }
        if !supported_list
            .iter()
            .any(|supported| supported.source_media_type == source && supported.target_media_type == target)
        {
            supported_list.push(SupportedSourceAndTarget {
                max_source_size_bytes: max_size,
                ..SupportedSourceAndTarget::new(source, target)
            });
        }
    }
    supported_list
}

/// The pairs a failover transform supports: those every step supports, with the largest limit of any step.
///
fn failover_supported_list(steps: &[&Transformer]) -> Vec<SupportedSourceAndTarget> {
    let Some((first, rest)) = steps.split_first() else {
        return vec![];
    };

    let mut supported_list = vec![];
    for supported in &first.supported_source_and_target_list {
        let mut max_size = supported.max_source_size_bytes;
        let in_every_step = rest.iter().all(|step| {
            step.supported_source_and_target_list
                .iter()
                .find(|other| {
                    other.source_media_type == supported.source_media_type
                        && other.target_media_type == supported.target_media_type
                })
                .map(|other| {
                    max_size = if max_size == UNLIMITED || other.max_source_size_bytes == UNLIMITED {
                        UNLIMITED
                    } else {
                        max_size.max(other.max_source_size_bytes)
                    };
                })
                .is_some()
        });
        if in_every_step
            && !supported_list.iter().any(|existing: &SupportedSourceAndTarget| {
                existing.source_media_type == supported.source_media_type
                    && existing.target_media_type == supported.target_media_type
            })
        {
            supported_list.push(SupportedSourceAndTarget {
                max_source_size_bytes: max_size,
                ..SupportedSourceAndTarget::new(&supported.source_media_type, &supported.target_media_type)
            });
        }
    }
    supported_list
}

/// Builds a [`LocalTransformServiceRegistry`].
///
#[derive(Default)]
pub struct LocalTransformServiceRegistryBuilder {
    engines: Vec<Arc<dyn TransformEngine>>,
    sources: Vec<ConfigSource>,
    config: Config,
    mimetype_map: Option<Arc<MimetypeMap>>,
}

impl LocalTransformServiceRegistryBuilder {
    /// Add an engine.
    ///
    pub fn engine(mut self, engine: Arc<dyn TransformEngine>) -> Self {
        self.engines.push(engine);
        self
    }

    /// Add engines.
    ///
    pub fn engines(mut self, engines: impl IntoIterator<Item = Arc<dyn TransformEngine>>) -> Self {
        self.engines.extend(engines);
        self
    }

    /// Add a source of pipeline and failover definitions. Sources are read in the order they are added, after
    /// the engines.
    ///
    pub fn config_source(mut self, source: ConfigSource) -> Self {
        self.sources.push(source);
        self
    }

    /// Properties for limits and retries.
    ///
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Identify content with `mimetype_map` when retrying, rather than the global one.
    ///
    pub fn mimetype_map(mut self, mimetype_map: Arc<MimetypeMap>) -> Self {
        self.mimetype_map = Some(mimetype_map);
        self
    }

    /// Build the registry. It has no transforms until [`LocalTransformServiceRegistry::read_config`] is called.
    ///
    pub fn build(self) -> LocalTransformServiceRegistry {
        LocalTransformServiceRegistry {
            engines: self.engines,
            sources: self.sources,
            limits: Arc::new(TransformerConfigLimits::new(self.config.clone())),
            config: self.config,
            mimetype_map: self.mimetype_map,
            data: RwLock::new(Arc::new(LocalData::default())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use identify::mimetype_map::MimetypeDetector;
    use test_utils::write_temp;

    use crate::local::test_engine::StubEngine;
    use crate::local::TransformKind;

    use super::*;

    const DOC: &str = "application/msword";
    const PDF: &str = "application/pdf";
    const PNG: &str = "image/png";
    const HTML: &str = "text/html";

    const OFFICE_ENGINE: &str = r#"{
        "transformers": [
            {
                "transformerName": "libreoffice",
                "supportedSourceAndTargetList": [
                    {"sourceMediaType": "application/msword", "targetMediaType": "application/pdf"},
                    {"sourceMediaType": "text/html", "targetMediaType": "application/pdf", "maxSourceSizeBytes": 1000}
                ]
            }
        ]
    }"#;

    const IMAGE_ENGINE: &str = r#"{
        "transformOptions": {
            "imageOptions": [{"value": {"name": "resolution"}}]
        },
        "transformers": [
            {
                "transformerName": "pdfrenderer",
                "supportedSourceAndTargetList": [
                    {"sourceMediaType": "application/pdf", "targetMediaType": "image/png"},
                    {"sourceMediaType": "application/pdf", "targetMediaType": "alfresco-metadata-extract"}
                ],
                "transformOptions": ["imageOptions"]
            },
            {
                "transformerName": "wkhtmltopdf",
                "supportedSourceAndTargetList": [
                    {"sourceMediaType": "text/html", "targetMediaType": "application/pdf"}
                ]
            }
        ]
    }"#;

    const PIPELINES: &str = r#"{
        "transformers": [
            {
                "transformerName": "officeToPng",
                "transformerPipeline": [
                    {"transformerName": "libreoffice", "targetMediaType": "application/pdf"},
                    {"transformerName": "pdfrenderer"}
                ]
            },
            {
                "transformerName": "htmlToPdf",
                "transformerFailover": ["wkhtmltopdf", "libreoffice"]
            }
        ]
    }"#;

    /// Detects every file as the same mimetype.
    struct FixedDetector(&'static str);

    #[async_trait]
    impl MimetypeDetector for FixedDetector {
        async fn detect(&self, _path: &Path) -> Result<Option<String>, anyhow::Error> {
            Ok(Some(self.0.to_string()))
        }
    }

    struct Fixture {
        office: Arc<StubEngine>,
        image: Arc<StubEngine>,
    }

    impl Fixture {
        fn new(office: StubEngine, image: StubEngine) -> Self {
            Self {
                office: Arc::new(office),
                image: Arc::new(image),
            }
        }

        fn builder(&self) -> LocalTransformServiceRegistryBuilder {
            LocalTransformServiceRegistry::builder()
                .engine(self.office.clone())
                .engine(self.image.clone())
        }
    }

    fn fixture() -> Fixture {
        Fixture::new(
            StubEngine::new("office", OFFICE_ENGINE),
            StubEngine::new("image", IMAGE_ENGINE),
        )
    }

    fn no_options() -> TransformOptions {
        TransformOptions::new()
    }

    #[tokio::test]
    async fn test_read_config() -> anyhow::Result<()> {
        let fixture = fixture();
        let registry = fixture
            .builder()
            .config_source(ConfigSource::Inline(PIPELINES.to_string()))
            .build();

        registry.read_config().await?;

        assert_eq!(
            registry.transform_names(),
            vec!["htmlToPdf", "libreoffice", "officeToPng", "pdfrenderer", "wkhtmltopdf"]
        );
        let pipeline = registry
            .get_local_transform(DOC, 100, PNG, &no_options(), None)
            .ok_or_else(|| anyhow::anyhow!("no pipeline"))?;
        assert_eq!(pipeline.name(), "officeToPng");
        assert_eq!(pipeline.kind(), TransformKind::Pipeline);
        let failover = registry.get_local_transform(HTML, 100, PDF, &no_options(), None);
        assert!(failover.is_some_and(|transform| transform.kind() == TransformKind::Failover));
        Ok(())
    }

    #[tokio::test]
    async fn test_derived_supported_lists() -> anyhow::Result<()> {
        let fixture = fixture();
        let registry = fixture
            .builder()
            .config_source(ConfigSource::Inline(PIPELINES.to_string()))
            .build();

        registry.read_config().await?;

        let from_doc = registry.transforms_from(DOC);
        assert_eq!(from_doc.keys().collect::<Vec<_>>(), vec![PDF, PNG]);
        assert!(registry.transforms_from(PDF).contains_key(MIMETYPE_METADATA_EXTRACT));
        assert!(registry
            .transforms_from(DOC)
            .get(MIMETYPE_METADATA_EXTRACT)
            .is_none());

        // The failover supports html to pdf up to the largest limit of its steps.
        assert_eq!(registry.max_size(HTML, PDF, &no_options(), None), UNLIMITED);
        let failover = registry.get_local_transform(HTML, 5000, PDF, &no_options(), None);
        assert_eq!(failover.map(|transform| transform.name().to_string()), Some("htmlToPdf".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn test_pipeline_inherits_step_options() -> anyhow::Result<()> {
        let fixture = fixture();
        let registry = fixture
            .builder()
            .config_source(ConfigSource::Inline(PIPELINES.to_string()))
            .build();
        registry.read_config().await?;
        let options = TransformOptions::from([("resolution".to_string(), "72".to_string())]);

        assert!(registry.is_supported(DOC, 100, PNG, &options, None));
        assert!(!registry.is_supported(DOC, 100, PDF, &options, None));
        Ok(())
    }

    #[tokio::test]
    async fn test_transform_pipeline() -> anyhow::Result<()> {
        let fixture = fixture();
        let registry = fixture
            .builder()
            .config_source(ConfigSource::Inline(PIPELINES.to_string()))
            .build();
        registry.read_config().await?;
        let source = write_temp("doc", ".doc")?;
        let target = tempfile::NamedTempFile::new()?;
        let content = Content::from_path(source.path(), DOC).await;

        registry
            .transform(&content, target.path(), PNG, &no_options(), Some("doclib"))
            .await?;

        assert_eq!(std::fs::read_to_string(target.path())?, "pdfrenderer(libreoffice(doc))");
        Ok(())
    }

    #[tokio::test]
    async fn test_no_transformer() -> anyhow::Result<()> {
        let fixture = fixture();
        let registry = fixture.builder().build();
        registry.read_config().await?;
        let content = Content::new("missing.png", PNG, 10);

        let result = registry
            .transform(&content, Path::new("out.pdf"), PDF, &no_options(), None)
            .await;

        assert!(matches!(result, Err(TransformError::NoTransformer { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_validation_errors() -> anyhow::Result<()> {
        let fixture = fixture();
        let invalid = r#"{
            "transformers": [
                {"transformerPipeline": [{"transformerName": "libreoffice"}]},
                {"transformerName": "both", "transformerPipeline": [{"transformerName": "libreoffice"}], "transformerFailover": ["libreoffice"]},
                {"transformerName": "orphan", "supportedSourceAndTargetList": [{"sourceMediaType": "text/plain", "targetMediaType": "application/pdf"}]},
                {"transformerName": "broken", "transformerFailover": ["libreoffice", "nothing"]},
                {"transformerName": "good", "transformerFailover": ["libreoffice"]}
            ]
        }"#;
        let registry = fixture
            .builder()
            .config_source(ConfigSource::Inline(invalid.to_string()))
            .build();

        let result = registry.read_config().await;

        assert!(matches!(result, Err(TransformError::InvalidConfig(errors)) if errors.len() == 4));
        let errors = registry.errors();
        assert!(errors[0].contains("names may not be null"));
        assert!(errors[1].contains("\"both\" cannot have both pipeline and failover"));
        assert!(errors[2].contains("\"orphan\" must be defined in an engine"));
        assert!(errors[3].contains("\"broken\"") && errors[3].contains("nothing"));
        assert!(registry.transform_names().contains(&"good".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_within_engine() -> anyhow::Result<()> {
        let duplicate = r#"{
            "transformers": [
                {"transformerName": "same", "supportedSourceAndTargetList": [{"sourceMediaType": "text/plain", "targetMediaType": "application/pdf"}]},
                {"transformerName": "same", "supportedSourceAndTargetList": [{"sourceMediaType": "text/html", "targetMediaType": "application/pdf"}]}
            ]
        }"#;
        let registry = LocalTransformServiceRegistry::builder()
            .engine(Arc::new(StubEngine::new("engine", duplicate)))
            .build();

        let result = registry.read_config().await;

        assert!(result.is_err());
        assert!(registry.errors()[0].contains("unique name within engine engine"));
        assert!(registry.is_supported("text/plain", 10, PDF, &no_options(), None));
        assert!(!registry.is_supported(HTML, 10, PDF, &no_options(), None));
        Ok(())
    }

    #[tokio::test]
    async fn test_override_inherits_engine() -> anyhow::Result<()> {
        let fixture = fixture();
        let override_config = r#"{
            "transformers": [
                {
                    "transformerName": "libreoffice",
                    "supportedSourceAndTargetList": [
                        {"sourceMediaType": "application/rtf", "targetMediaType": "application/pdf"}
                    ]
                }
            ]
        }"#;
        let registry = fixture
            .builder()
            .config_source(ConfigSource::Inline(override_config.to_string()))
            .build();

        registry.read_config().await?;

        assert!(registry.is_supported("application/rtf", 10, PDF, &no_options(), None));
        assert!(!registry.is_supported(DOC, 10, PDF, &no_options(), None));

        let source = write_temp("rtf", ".rtf")?;
        let target = tempfile::NamedTempFile::new()?;
        let content = Content::from_path(source.path(), "application/rtf").await;
        registry.transform(&content, target.path(), PDF, &no_options(), None).await?;
        assert_eq!(fixture.office.calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_rejected_override_keeps_earlier_definition() -> anyhow::Result<()> {
        let fixture = fixture();
        let config = r#"{
            "transformers": [
                {
                    "transformerName": "officeToPng",
                    "transformerPipeline": [
                        {"transformerName": "libreoffice", "targetMediaType": "application/pdf"},
                        {"transformerName": "pdfrenderer"}
                    ]
                },
                {
                    "transformerName": "officeToPng",
                    "supportedSourceAndTargetList": [
                        {"sourceMediaType": "application/msword", "targetMediaType": "image/png"}
                    ]
                }
            ]
        }"#;
        let registry = fixture
            .builder()
            .config_source(ConfigSource::Inline(config.to_string()))
            .build();

        let result = registry.read_config().await;

        assert!(matches!(result, Err(TransformError::InvalidConfig(errors)) if errors.len() == 1));
        assert!(registry.errors()[0].contains("\"officeToPng\") must be defined in an engine"));
        let pipeline = registry
            .get_local_transform(DOC, 100, PNG, &no_options(), None)
            .ok_or_else(|| anyhow::anyhow!("no pipeline"))?;
        assert_eq!(pipeline.name(), "officeToPng");
        assert_eq!(pipeline.kind(), TransformKind::Pipeline);
        Ok(())
    }

    #[tokio::test]
    async fn test_config_dir() -> anyhow::Result<()> {
        let fixture = fixture();
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("10-pipelines.json"), PIPELINES)?;
        std::fs::write(dir.path().join("README.txt"), "not configuration")?;
        let registry = fixture
            .builder()
            .config_source(ConfigSource::Dir(dir.path().to_path_buf()))
            .config_source(ConfigSource::File(dir.path().join("missing.json")))
            .build();

        let result = registry.read_config().await;

        assert!(result.is_err());
        assert_eq!(registry.errors().len(), 1);
        assert!(registry.transform_names().contains(&"officeToPng".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn test_retry_with_detected_mimetype() -> anyhow::Result<()> {
        let fixture = Fixture::new(
            StubEngine::new("office", OFFICE_ENGINE).failing("wkhtmltopdf"),
            StubEngine::new("image", IMAGE_ENGINE).failing("wkhtmltopdf"),
        );
        let registry = fixture
            .builder()
            .mimetype_map(Arc::new(MimetypeMap::with_detector(Arc::new(FixedDetector(DOC)))))
            .build();
        registry.read_config().await?;
        let source = write_temp("doc", ".html")?;
        let target = tempfile::NamedTempFile::new()?;
        let content = Content::from_path(source.path(), HTML).await;

        registry.transform(&content, target.path(), PDF, &no_options(), None).await?;

        assert_eq!(std::fs::read_to_string(target.path())?, "libreoffice(doc)");
        Ok(())
    }

    #[tokio::test]
    async fn test_retry_disabled() -> anyhow::Result<()> {
        let fixture = Fixture::new(
            StubEngine::new("office", OFFICE_ENGINE),
            StubEngine::new("image", IMAGE_ENGINE).failing("wkhtmltopdf"),
        );
        let registry = fixture
            .builder()
            .config(Config::from_properties([(PROP_RETRY_ON_DIFFERENT_MIMETYPE, "false")]))
            .mimetype_map(Arc::new(MimetypeMap::with_detector(Arc::new(FixedDetector(DOC)))))
            .build();
        registry.read_config().await?;
        let source = write_temp("doc", ".html")?;
        let content = Content::from_path(source.path(), HTML).await;

        let result = registry
            .transform(&content, source.path(), PDF, &no_options(), None)
            .await;

        assert!(matches!(result, Err(TransformError::Failed { transformer, .. }) if transformer == "wkhtmltopdf"));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_reload() -> anyhow::Result<()> {
        let fixture = fixture();
        let registry = Arc::new(fixture.builder().build());

        let handle = registry
            .clone()
            .spawn_periodic_reload(Duration::from_secs(60), Duration::from_secs(5));
        assert!(registry.transform_names().is_empty());

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(registry.transform_names().len(), 3);
        handle.abort();
        Ok(())
    }
}
