use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Namespace of the content model (`cm`).
pub const CONTENT_MODEL_URI: &str = "http://www.alfresco.org/model/content/1.0";
/// Namespace of the system model (`sys`).
pub const SYSTEM_MODEL_URI: &str = "http://www.alfresco.org/model/system/1.0";
/// Namespace of EXIF image properties (`exif`).
pub const EXIF_MODEL_URI: &str = "http://www.alfresco.org/model/exif/1.0";
/// Namespace of audio properties (`audio`).
pub const AUDIO_MODEL_URI: &str = "http://www.alfresco.org/model/audio/1.0";
/// Namespace of email message properties (`imap`).
pub const IMAP_MODEL_URI: &str = "http://www.alfresco.org/model/imap/1.0";

/// Prefixes of the well known namespaces.
pub const DEFAULT_PREFIXES: &[(&str, &str)] = &[
    ("cm", CONTENT_MODEL_URI),
    ("sys", SYSTEM_MODEL_URI),
    ("exif", EXIF_MODEL_URI),
    ("audio", AUDIO_MODEL_URI),
    ("imap", IMAP_MODEL_URI),
];

/// Errors reading a qualified name.
///
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QNameError {
    /// The name is neither `{uri}local` nor `prefix:local`.
    #[error("invalid qualified name: '{0}'")]
    Invalid(String),

    /// The prefix of a `prefix:local` name is not mapped to a namespace.
    #[error("no namespace mapped to prefix '{prefix}' in '{name}'")]
    UnknownPrefix {
        /// The unmapped prefix.
        prefix: String,
        /// The name being resolved.
        name: String,
    },
}

/// A property name qualified by its namespace URI.
///
/// The string form is `{namespace}local_name`.
///
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QName {
    namespace: String,
    local_name: String,
}

impl QName {
    /// Create a qualified name.
    ///
    pub fn new(namespace: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local_name: local_name.into(),
        }
    }

    /// A name in the content model namespace.
    ///
    pub fn cm(local_name: impl Into<String>) -> Self {
        Self::new(CONTENT_MODEL_URI, local_name)
    }

    /// The namespace URI.
    ///
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The name within the namespace.
    ///
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// Resolve a name given as `{uri}local` or `prefix:local`.
    ///
    /// # Arguments
    ///
    /// * `name` - The name to resolve; surrounding whitespace is ignored.
    /// * `prefixes` - Namespace URIs by prefix.
    ///
    /// # Returns
    ///
    /// The qualified name, or an error when the name is malformed or its prefix is unknown.
    ///
    pub fn resolve(name: &str, prefixes: &HashMap<String, String>) -> Result<Self, QNameError> {
        let name = name.trim();
        if name.starts_with('{') {
            return name.parse();
        }
        match name.split_once(':') {
            Some((prefix, local_name)) if !prefix.is_empty() && !local_name.is_empty() => {
                let namespace = prefixes.get(prefix).ok_or_else(|| QNameError::UnknownPrefix {
                    prefix: prefix.to_string(),
                    name: name.to_string(),
                })?;
                Ok(Self::new(namespace.clone(), local_name))
            }
            _ => Err(QNameError::Invalid(name.to_string())),
        }
    }

    /// The well known prefixes as a lookup map.
    ///
    pub fn default_prefixes() -> HashMap<String, String> {
        DEFAULT_PREFIXES
            .iter()
            .map(|(prefix, uri)| (prefix.to_string(), uri.to_string()))
            .collect()
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}{}", self.namespace, self.local_name)
    }
}

impl FromStr for QName {
    type Err = QNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || QNameError::Invalid(s.to_string());
        let rest = s.strip_prefix('{').ok_or_else(invalid)?;
        let (namespace, local_name) = rest.split_once('}').ok_or_else(invalid)?;
        if local_name.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(namespace, local_name))
    }
}

impl Serialize for QName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for QName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}
