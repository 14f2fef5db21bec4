use std::collections::{BTreeSet, HashMap};

use log::trace;
use thiserror::Error;

use services::Config;

use crate::qname::{QName, QNameError};

/// Property keys declaring a namespace prefix for the other entries of a mapping.
pub const NAMESPACE_PROPERTY_PREFIX: &str = "namespace.prefix.";

/// Maps raw document property names to the properties they are extracted into.
pub type ExtractMapping = HashMap<String, BTreeSet<QName>>;

/// Maps properties to the raw document property names they are embedded as.
pub type EmbedMapping = HashMap<QName, BTreeSet<String>>;

/// A mapping entry that could not be read.
///
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid mapping '{key}={value}': {source}")]
pub struct MappingError {
    /// The key of the entry.
    pub key: String,
    /// The value of the entry.
    pub value: String,
    /// Why the qualified name in the entry could not be read.
    #[source]
    pub source: QNameError,
}

/// Mapping entries such as `author=cm:author, cm:creator` together with their `namespace.prefix.*` declarations.
///
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingProperties {
    entries: Vec<(String, String)>,
}

impl MappingProperties {
    /// Collect mapping entries.
    ///
    pub fn new<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    /// The entries of a configuration under `prefix`, with the prefix removed.
    ///
    pub fn from_config(config: &Config, prefix: &str) -> Self {
        Self::new(config.with_prefix(prefix))
    }

    /// Whether there are no entries.
    ///
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read the entries as an extract mapping, raw names to qualified names.
    ///
    /// Values are comma separated lists of names in `prefix:local` or `{uri}local` form. The well known prefixes are
    /// always available; `namespace.prefix.<prefix>` entries add or replace them.
    ///
    pub fn to_extract_mapping(&self) -> Result<ExtractMapping, MappingError> {
        let prefixes = self.prefixes();
        let mut mapping = ExtractMapping::new();

        for (key, value) in self.mapping_entries() {
            let names = split_list(value)
                .map(|name| QName::resolve(name, &prefixes).map_err(|source| self.error(key, value, source)))
                .collect::<Result<BTreeSet<_>, _>>()?;
            trace!("Added mapping from {} to {:?}", key, names);
            mapping.insert(key.clone(), names);
        }

        Ok(mapping)
    }

    /// Read the entries as an embed mapping, qualified names to raw names.
    ///
    pub fn to_embed_mapping(&self) -> Result<EmbedMapping, MappingError> {
        let prefixes = self.prefixes();
        let mut mapping = EmbedMapping::new();

        for (key, value) in self.mapping_entries() {
            let name = QName::resolve(key, &prefixes).map_err(|source| self.error(key, value, source))?;
            let raw_keys: BTreeSet<String> = split_list(value).map(str::to_string).collect();
            trace!("Added embed mapping from {} to {:?}", name, raw_keys);
            mapping.insert(name, raw_keys);
        }

        Ok(mapping)
    }

    fn prefixes(&self) -> HashMap<String, String> {
        let mut prefixes = QName::default_prefixes();
        for (key, value) in &self.entries {
            if let Some(prefix) = key.strip_prefix(NAMESPACE_PROPERTY_PREFIX) {
                prefixes.insert(prefix.to_string(), value.trim().to_string());
            }
        }
        prefixes
    }

    fn mapping_entries(&self) -> impl Iterator<Item = &(String, String)> {
        self.entries
            .iter()
            .filter(|(key, _)| !key.starts_with(NAMESPACE_PROPERTY_PREFIX))
    }

    fn error(&self, key: &str, value: &str, source: QNameError) -> MappingError {
        MappingError {
            key: key.to_string(),
            value: value.to_string(),
            source,
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MappingProperties {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self::new(iter)
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty())
}

/// The embed mapping implied by an extract mapping.
///
/// Each raw name is embedded from the first property it is extracted into.
///
pub fn reverse_mapping(extract_mapping: &ExtractMapping) -> EmbedMapping {
    let mut embed_mapping = EmbedMapping::new();
    for (raw_key, names) in extract_mapping {
        if let Some(name) = names.iter().next() {
            embed_mapping
                .entry(name.clone())
                .or_default()
                .insert(raw_key.clone());
        }
    }
    embed_mapping
}

/// Merge a configured mapping with the default one.
///
/// The default is used when nothing is configured. With `inherit`, default keys missing from the configured mapping
/// are added. `overrides` replace whole entries.
///
pub(crate) fn merge_mapping<K, V>(
    configured: Option<HashMap<K, V>>,
    default: &HashMap<K, V>,
    inherit: bool,
    overrides: HashMap<K, V>,
) -> HashMap<K, V>
where
    K: Clone + Eq + std::hash::Hash,
    V: Clone,
{
    let mut mapping = match configured {
        None => default.clone(),
        Some(mut configured) => {
            if inherit {
                for (key, value) in default {
                    configured.entry(key.clone()).or_insert_with(|| value.clone());
                }
            }
            configured
        }
    };
    mapping.extend(overrides);
    mapping
}
