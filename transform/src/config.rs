use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Default priority of a supported source and target pair. Lower values win.
pub const DEFAULT_PRIORITY: i32 = 50;

/// Value of a size limit meaning unlimited.
pub const UNLIMITED: i64 = -1;

/// The transforms an engine or configuration file declares.
///
/// ```json
/// {
///   "transformOptions": {
///     "pdfRendererOptions": [ {"value": {"name": "resolution"}} ]
///   },
///   "transformers": [
///     {
///       "transformerName": "pdfrenderer",
///       "supportedSourceAndTargetList": [
///         {"sourceMediaType": "application/pdf", "targetMediaType": "image/png"}
///       ],
///       "transformOptions": ["pdfRendererOptions"]
///     }
///   ]
/// }
/// ```
///
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformConfig {
    /// Named sets of options that transformers refer to.
    #[serde(default)]
    pub transform_options: BTreeMap<String, Vec<TransformOption>>,

    /// The transformers.
    #[serde(default)]
    pub transformers: Vec<Transformer>,
}

impl TransformConfig {
    /// Parse a configuration from JSON.
    ///
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// An option a transformer accepts, or a group of them.
///
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformOption {
    /// A single named option.
    Value(TransformOptionValue),
    /// Options that are only required together.
    Group(TransformOptionGroup),
}

/// A single named option.
///
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformOptionValue {
    /// The option name.
    pub name: String,
    /// Whether the option must be given when its group applies.
    #[serde(default)]
    pub required: bool,
}

/// A group of options.
///
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformOptionGroup {
    /// Whether the group applies even when none of its options are given.
    #[serde(default)]
    pub required: bool,
    /// The options and sub-groups.
    #[serde(default)]
    pub transform_options: Vec<TransformOption>,
}

impl TransformOptionGroup {
    /// Create a group.
    ///
    pub fn new(required: bool, transform_options: Vec<TransformOption>) -> Self {
        Self {
            required,
            transform_options,
        }
    }

    /// The names of all options in the group and its sub-groups.
    ///
    pub fn option_names(&self) -> Vec<String> {
        let mut names = vec![];
        for option in &self.transform_options {
            match option {
                TransformOption::Value(value) => names.push(value.name.clone()),
                TransformOption::Group(group) => names.extend(group.option_names()),
            }
        }
        names
    }
}

/// A source and target mimetype pair a transformer supports.
///
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedSourceAndTarget {
    /// The source mimetype.
    pub source_media_type: String,
    /// The target mimetype.
    pub target_media_type: String,
    /// The largest source the transformer accepts, [`UNLIMITED`] by default.
    #[serde(default = "unlimited")]
    pub max_source_size_bytes: i64,
    /// The priority, lower values winning. [`DEFAULT_PRIORITY`] by default.
    #[serde(default = "default_priority")]
    pub priority: i32,
}

impl SupportedSourceAndTarget {
    /// An unlimited pair with the default priority.
    ///
    pub fn new(source_media_type: impl Into<String>, target_media_type: impl Into<String>) -> Self {
        Self {
            source_media_type: source_media_type.into(),
            target_media_type: target_media_type.into(),
            max_source_size_bytes: UNLIMITED,
            priority: DEFAULT_PRIORITY,
        }
    }
}

fn unlimited() -> i64 {
    UNLIMITED
}

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

/// A step of a pipeline.
///
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformStep {
    /// The transformer that performs the step.
    pub transformer_name: String,
    /// The intermediate mimetype the step produces. The final step produces the requested target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_media_type: Option<String>,
}

/// A transformer definition.
///
/// A definition with neither a pipeline nor a failover list is a single step transform performed by an engine.
///
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transformer {
    /// The unique name.
    #[serde(default)]
    pub transformer_name: Option<String>,
    /// The supported pairs; derived from the steps of pipelines and failovers when empty.
    #[serde(default)]
    pub supported_source_and_target_list: Vec<SupportedSourceAndTarget>,
    /// Names of option sets from [`TransformConfig::transform_options`].
    #[serde(default)]
    pub transform_options: Vec<String>,
    /// Steps run one after the other.
    #[serde(default)]
    pub transformer_pipeline: Vec<TransformStep>,
    /// Transformers tried in turn until one succeeds.
    #[serde(default)]
    pub transformer_failover: Vec<String>,
}

impl Transformer {
    /// The name, or an empty string when it has none.
    ///
    pub fn name(&self) -> &str {
        self.transformer_name.as_deref().unwrap_or_default()
    }

    /// Whether this is a pipeline.
    ///
    pub fn is_pipeline(&self) -> bool {
        !self.transformer_pipeline.is_empty()
    }

    /// Whether this is a failover transform.
    ///
    pub fn is_failover(&self) -> bool {
        !self.transformer_failover.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_from_json() -> anyhow::Result<()> {
        let config = TransformConfig::from_json(
            r#"{
                "transformOptions": {
                    "imageOptions": [
                        {"value": {"name": "resolution"}},
                        {"group": {"required": true, "transformOptions": [
                            {"value": {"name": "pageLimit", "required": true}}
                        ]}}
                    ]
                },
                "transformers": [
                    {
                        "transformerName": "officeToPng",
                        "supportedSourceAndTargetList": [
                            {"sourceMediaType": "application/msword", "targetMediaType": "image/png", "priority": 40}
                        ],
                        "transformOptions": ["imageOptions"],
                        "transformerPipeline": [
                            {"transformerName": "libreoffice", "targetMediaType": "application/pdf"},
                            {"transformerName": "pdfrenderer"}
                        ]
                    }
                ]
            }"#,
        )?;

        let transformer = &config.transformers[0];
        assert_eq!(transformer.name(), "officeToPng");
        assert!(transformer.is_pipeline());
        assert!(!transformer.is_failover());
        assert_eq!(transformer.supported_source_and_target_list[0].max_source_size_bytes, UNLIMITED);
        assert_eq!(transformer.supported_source_and_target_list[0].priority, 40);
        assert_eq!(transformer.transformer_pipeline[1].target_media_type, None);
        assert_eq!(
            TransformOptionGroup::new(false, config.transform_options["imageOptions"].clone()).option_names(),
            vec!["resolution".to_string(), "pageLimit".to_string()]
        );
        Ok(())
    }

    #[test]
    fn test_missing_name() -> anyhow::Result<()> {
        let config = TransformConfig::from_json(r#"{"transformers": [{"transformerFailover": ["a", "b"]}]}"#)?;

        assert_eq!(config.transformers[0].name(), "");
        assert!(config.transformers[0].is_failover());
        Ok(())
    }
}
