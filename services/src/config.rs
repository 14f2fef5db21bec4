use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use lazy_static::lazy_static;

lazy_static! {
    static ref CONFIG: Config = Config::default();
}

/// A singleton for accessing global configuration values.
///
/// The global configuration has no explicit properties, so every lookup falls through to the environment.
///
pub fn config() -> &'static Config {
    &CONFIG
}

/// Layered key/value configuration.
///
/// Explicit properties, loaded from a property file or set in code, take precedence over environment variables.
///
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    properties: BTreeMap<String, String>,
}

impl Config {
    /// Create a configuration from explicit properties.
    ///
    pub fn from_properties<K, V>(properties: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            properties: properties
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    /// Parse a flat YAML map of properties.
    ///
    /// Scalar values (strings, numbers, booleans) are accepted and stored as strings.
    ///
    /// # Arguments
    ///
    /// * `yaml` - The YAML document.
    ///
    /// # Returns
    ///
    /// The configuration, or an error if the document is not a flat map of scalars.
    ///
    pub fn from_yaml_str(yaml: &str) -> Result<Self, anyhow::Error> {
        let values: BTreeMap<String, serde_yaml::Value> =
            serde_yaml::from_str(yaml).context("failed to parse properties")?;

        let mut properties = BTreeMap::new();
        for (key, value) in values {
            let value = match value {
                serde_yaml::Value::String(value) => value,
                serde_yaml::Value::Number(value) => value.to_string(),
                serde_yaml::Value::Bool(value) => value.to_string(),
                serde_yaml::Value::Null => String::new(),
                _ => anyhow::bail!("property '{}' is not a scalar value", key),
            };
            properties.insert(key, value);
        }
        Ok(Self { properties })
    }

    /// Read a flat YAML property file.
    ///
    pub async fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let yaml = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("failed to read properties from '{}'", path.as_ref().display()))?;
        Self::from_yaml_str(&yaml)
    }

    /// Set an explicit property.
    ///
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Set an explicit property in place.
    ///
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Get a configuration value.
    ///
    /// # Arguments
    ///
    /// * `key` - The name of the property or environment variable.
    ///
    /// # Returns
    ///
    /// The explicit property if set, otherwise the environment variable, or [`None`] if neither is set.
    ///
    pub fn get(&self, key: &str) -> Option<String> {
        self.properties
            .get(key)
            .cloned()
            .or_else(|| std::env::var(key).ok())
    }

    /// Get a configuration value, or a default value.
    ///
    /// # Arguments
    ///
    /// * `key` - The name of the property or environment variable.
    /// * `default` - The default value to return if the value is not set.
    ///
    /// # Returns
    ///
    /// The configuration value, or the default value if it is not set.
    ///
    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// Get a boolean value. Only a (trimmed, case-insensitive) `true` is true.
    ///
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key)
            .map(|value| value.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(default)
    }

    /// Get a signed integer value, ignoring values that do not parse.
    ///
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|value| value.trim().parse().ok())
    }

    /// Get an unsigned integer value, ignoring values that do not parse.
    ///
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|value| value.trim().parse().ok())
    }

    /// Explicit properties whose keys start with `prefix`, with the prefix removed.
    ///
    /// Environment variables are not included.
    ///
    pub fn with_prefix(&self, prefix: &str) -> Vec<(String, String)> {
        self.properties
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key[prefix.len()..].to_string(), value.clone()))
            .collect()
    }

    /// Whether no explicit properties are set.
    ///
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}
