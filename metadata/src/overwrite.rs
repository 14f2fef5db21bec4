use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::qname::{AUDIO_MODEL_URI, EXIF_MODEL_URI};
use crate::value::{PropertyMap, Value};

/// Decides which extracted properties may replace the properties a document already has.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OverwritePolicy {
    /// Always write extracted values, replacing whatever is there.
    Eager,

    /// Write extracted values where the target is missing, null or empty text.
    ///
    /// Media properties (EXIF and audio) describe the content itself, so they are always written.
    #[default]
    Pragmatic,

    /// Only write properties the target does not have at all.
    Cautious,

    /// Like [`OverwritePolicy::Pragmatic`], without the exception for media properties.
    Prudent,
}

impl OverwritePolicy {
    /// Apply extracted properties to the target properties.
    ///
    /// Extracted null values are never written. [`OverwritePolicy::Eager`], [`OverwritePolicy::Pragmatic`] and
    /// [`OverwritePolicy::Prudent`] still report them as modified, so callers can tell the property was seen.
    ///
    /// # Arguments
    ///
    /// * `extracted` - The properties that were extracted.
    /// * `target` - The properties to update.
    ///
    /// # Returns
    ///
    /// The properties that were written or reported.
    ///
    pub fn apply_properties(&self, extracted: PropertyMap, target: &mut PropertyMap) -> PropertyMap {
        let mut modified = PropertyMap::new();

        for (name, value) in extracted {
            match self {
                OverwritePolicy::Eager => {
                    if !value.is_null() {
                        target.insert(name.clone(), value.clone());
                    }
                    modified.insert(name, value);
                }
                OverwritePolicy::Pragmatic | OverwritePolicy::Prudent => {
                    if value.is_null() {
                        modified.insert(name, value);
                        continue;
                    }
                    let is_media = matches!(name.namespace(), EXIF_MODEL_URI | AUDIO_MODEL_URI);
                    let overwrite = (*self == OverwritePolicy::Pragmatic && is_media)
                        || target.get(&name).map_or(true, is_blank);
                    if overwrite {
                        target.insert(name.clone(), value.clone());
                        modified.insert(name, value);
                    }
                }
                OverwritePolicy::Cautious => {
                    if !value.is_null() && !target.contains_key(&name) {
                        target.insert(name.clone(), value.clone());
                        modified.insert(name, value);
                    }
                }
            }
        }

        modified
    }
}

fn is_blank(value: &Value) -> bool {
    value.is_null() || value.is_empty_text()
}

impl fmt::Display for OverwritePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OverwritePolicy::Eager => "EAGER",
            OverwritePolicy::Pragmatic => "PRAGMATIC",
            OverwritePolicy::Cautious => "CAUTIOUS",
            OverwritePolicy::Prudent => "PRUDENT",
        };
        f.write_str(name)
    }
}

impl FromStr for OverwritePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "EAGER" => Ok(OverwritePolicy::Eager),
            "PRAGMATIC" => Ok(OverwritePolicy::Pragmatic),
            "CAUTIOUS" => Ok(OverwritePolicy::Cautious),
            "PRUDENT" => Ok(OverwritePolicy::Prudent),
            _ => Err(format!("Can not convert {} to OverwritePolicy", s)),
        }
    }
}
