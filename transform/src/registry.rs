use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, trace};

use crate::config::{TransformOption, TransformOptionGroup, Transformer, UNLIMITED};
use crate::error::TransformError;
use crate::options::{group_supports, TransformOptions};

/// A transform of one source mimetype to one target mimetype by a named transformer.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedTransform {
    /// The transformer.
    pub name: String,
    /// The options the transformer accepts, held in a required group.
    pub options: TransformOptionGroup,
    /// The largest source in bytes, or [`UNLIMITED`].
    pub max_source_size_bytes: i64,
    /// The priority, lower values winning.
    pub priority: i32,
    order: usize,
}

type Candidates = HashMap<String, HashMap<String, Vec<SupportedTransform>>>;
type CacheKey = (String, String, TransformOptions);

#[derive(Default)]
struct Transforms {
    by_source: Candidates,
    registered: usize,
}

/// Finds the transformer to use for a source mimetype, size, target mimetype and set of options.
///
/// Lookups made on behalf of a rendition are cached by rendition name, since a rendition always asks for the same
/// target and options. Registering a transformer clears the cache.
///
#[derive(Default)]
pub struct TransformServiceRegistry {
    transforms: RwLock<Transforms>,
    cache: RwLock<HashMap<String, HashMap<CacheKey, Vec<SupportedTransform>>>>,
}

impl TransformServiceRegistry {
    /// Create an empty registry.
    ///
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the source and target pairs of a transformer.
    ///
    /// Each named option set the transformer refers to becomes an optional group inside a required holding
    /// group.
    ///
    /// # Arguments
    ///
    /// * `transformer` - The transformer definition, with its supported list already derived if it has steps.
    /// * `options_by_name` - The named option sets of the configuration.
    ///
    /// # Returns
    ///
    /// An error naming any option sets that do not exist. The transformer is registered without them.
    ///
    pub fn register(
        &self,
        transformer: &Transformer,
        options_by_name: &BTreeMap<String, Vec<TransformOption>>,
    ) -> Result<(), TransformError> {
        let mut groups = vec![];
        let mut missing = vec![];
        for name in &transformer.transform_options {
            match options_by_name.get(name) {
                Some(options) => groups.push(TransformOption::Group(TransformOptionGroup::new(false, options.clone()))),
                None => missing.push(format!(
                    "transformer '{}' refers to the unknown transform options '{}'",
                    transformer.name(),
                    name
                )),
            }
        }
        let options = TransformOptionGroup::new(true, groups);

        {
            let mut transforms = self.write_transforms();
            for supported in &transformer.supported_source_and_target_list {
                transforms.registered += 1;
                let order = transforms.registered;
                trace!(
                    "Register {} {} -> {}",
                    transformer.name(),
                    supported.source_media_type,
                    supported.target_media_type
                );
                transforms
                    .by_source
                    .entry(supported.source_media_type.clone())
                    .or_default()
                    .entry(supported.target_media_type.clone())
                    .or_default()
                    .push(SupportedTransform {
                        name: transformer.name().to_string(),
                        options: options.clone(),
                        max_source_size_bytes: supported.max_source_size_bytes,
                        priority: supported.priority,
                        order,
                    });
            }
        }
        self.write_cache().clear();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(TransformError::InvalidConfig(missing))
        }
    }

    /// Find the transformer to use.
    ///
    /// Candidates are ordered by priority, with the later registered winning a tie. The first whose limit allows
    /// the source size is chosen.
    ///
    /// # Arguments
    ///
    /// * `source_mimetype` - The source mimetype.
    /// * `source_size` - The source size in bytes, or -1 if unknown, which any candidate accepts.
    /// * `target_mimetype` - The target mimetype.
    /// * `options` - The request options.
    /// * `rendition` - The rendition the transform is for, if any.
    ///
    pub fn find_transformer_name(
        &self,
        source_mimetype: &str,
        source_size: i64,
        target_mimetype: &str,
        options: &TransformOptions,
        rendition: Option<&str>,
    ) -> Option<String> {
        let name = self
            .candidates(source_mimetype, target_mimetype, options, rendition)
            .into_iter()
            .find(|candidate| {
                candidate.max_source_size_bytes == UNLIMITED || candidate.max_source_size_bytes >= source_size
            })
            .map(|candidate| candidate.name);
        debug!(
            "Transformer for {} ({} bytes) -> {}: {}",
            source_mimetype,
            source_size,
            target_mimetype,
            name.as_deref().unwrap_or("none")
        );
        name
    }

    /// Whether any transformer supports the transform.
    ///
    pub fn is_supported(
        &self,
        source_mimetype: &str,
        source_size: i64,
        target_mimetype: &str,
        options: &TransformOptions,
        rendition: Option<&str>,
    ) -> bool {
        self.find_transformer_name(source_mimetype, source_size, target_mimetype, options, rendition)
            .is_some()
    }

    /// The largest source in bytes any transformer accepts, [`UNLIMITED`] if one has no limit, or 0 if the
    /// transform is not supported.
    ///
    pub fn max_size(
        &self,
        source_mimetype: &str,
        target_mimetype: &str,
        options: &TransformOptions,
        rendition: Option<&str>,
    ) -> i64 {
        let candidates = self.candidates(source_mimetype, target_mimetype, options, rendition);
        if candidates.is_empty() {
            0
        } else if candidates.iter().any(|candidate| candidate.max_source_size_bytes == UNLIMITED) {
            UNLIMITED
        } else {
            candidates
                .iter()
                .map(|candidate| candidate.max_source_size_bytes)
                .max()
                .unwrap_or(0)
        }
    }

    /// All registered transforms from a source mimetype, by target mimetype, in the order they would be chosen.
    ///
    pub fn transforms_from(&self, source_mimetype: &str) -> BTreeMap<String, Vec<SupportedTransform>> {
        let transforms = self.read_transforms();
        transforms
            .by_source
            .get(source_mimetype)
            .map(|targets| {
                targets
                    .iter()
                    .map(|(target, candidates)| (target.clone(), ordered(candidates.clone())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The source mimetypes of all registered transforms.
    ///
    pub fn source_mimetypes(&self) -> Vec<String> {
        let mut sources: Vec<String> = self.read_transforms().by_source.keys().cloned().collect();
        sources.sort();
        sources
    }

    fn candidates(
        &self,
        source_mimetype: &str,
        target_mimetype: &str,
        options: &TransformOptions,
        rendition: Option<&str>,
    ) -> Vec<SupportedTransform> {
        let key = (source_mimetype.to_string(), target_mimetype.to_string(), options.clone());
        if let Some(rendition) = rendition {
            if let Some(cached) = self.read_cache().get(rendition).and_then(|cached| cached.get(&key)) {
                return cached.clone();
            }
        }

        let candidates = {
            let transforms = self.read_transforms();
            let found = transforms
                .by_source
                .get(source_mimetype)
                .and_then(|targets| targets.get(target_mimetype))
                .map(|candidates| {
                    candidates
                        .iter()
                        .filter(|candidate| group_supports(&candidate.options, options))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            ordered(found)
        };

        if let Some(rendition) = rendition {
            self.write_cache()
                .entry(rendition.to_string())
                .or_default()
                .insert(key, candidates.clone());
        }
        candidates
    }

    fn read_transforms(&self) -> RwLockReadGuard<'_, Transforms> {
        self.transforms.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_transforms(&self) -> RwLockWriteGuard<'_, Transforms> {
        self.transforms.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_cache(&self) -> RwLockReadGuard<'_, HashMap<String, HashMap<CacheKey, Vec<SupportedTransform>>>> {
        self.cache.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, HashMap<String, HashMap<CacheKey, Vec<SupportedTransform>>>> {
        self.cache.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn ordered(mut candidates: Vec<SupportedTransform>) -> Vec<SupportedTransform> {
    candidates.sort_by_key(|candidate| (candidate.priority, Reverse(candidate.order)));
    candidates
}
