use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use log::debug;

use identify::content::Content;
use identify::mimetype_map::{MIMETYPE_METADATA_EMBED, MIMETYPE_METADATA_EXTRACT};
use transform::{LocalTransformServiceRegistry, TransformOptions};

use crate::extracter::RawExtracter;
use crate::mapping::MappingProperties;
use crate::value::{put_raw_value, RawMetadata, Value};

/// Option carrying the JSON of the properties to embed.
pub const OPTION_METADATA: &str = "metadata";

/// Reads and writes metadata by transforming content to the metadata pseudo mimetypes.
///
/// Extraction transforms to [`MIMETYPE_METADATA_EXTRACT`] and reads the JSON object written. Embedding transforms
/// to [`MIMETYPE_METADATA_EMBED`], passing the properties as JSON in the [`OPTION_METADATA`] option.
///
pub struct TransformMetadataExtracter {
    registry: Arc<LocalTransformServiceRegistry>,
}

impl TransformMetadataExtracter {
    /// Create an extracter using the transforms of `registry`.
    ///
    pub fn new(registry: Arc<LocalTransformServiceRegistry>) -> Self {
        Self { registry }
    }

    fn embed_options(metadata: &str) -> TransformOptions {
        TransformOptions::from([(OPTION_METADATA.to_string(), metadata.to_string())])
    }
}

#[async_trait]
impl RawExtracter for TransformMetadataExtracter {
    fn name(&self) -> &str {
        "extracter.LocalTransform"
    }

    fn supports_mimetype(&self, mimetype: &str) -> bool {
        self.registry
            .is_supported(mimetype, -1, MIMETYPE_METADATA_EXTRACT, &TransformOptions::new(), None)
    }

    fn supports_embed_mimetype(&self, mimetype: &str) -> bool {
        self.registry
            .is_supported(mimetype, -1, MIMETYPE_METADATA_EMBED, &Self::embed_options("{}"), None)
    }

    fn default_mapping(&self) -> MappingProperties {
        MappingProperties::new([
            ("dc:creator", "cm:author"),
            ("dc:title", "cm:title"),
            ("dc:description", "cm:description"),
            ("dcterms:created", "cm:created"),
            ("dcterms:modified", "cm:modified"),
        ])
    }

    fn default_embed_mapping(&self) -> Option<MappingProperties> {
        Some(MappingProperties::new([
            ("cm:author", "dc:creator"),
            ("cm:title", "dc:title"),
            ("cm:description", "dc:description"),
        ]))
    }

    async fn extract_raw(&self, content: &Content) -> Result<RawMetadata, anyhow::Error> {
        let target = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .context("failed to create metadata file")?
            .into_temp_path();

        self.registry
            .transform(content, &target, MIMETYPE_METADATA_EXTRACT, &TransformOptions::new(), None)
            .await?;

        let json = tokio::fs::read(&target).await?;
        let metadata: serde_json::Map<String, serde_json::Value> =
            serde_json::from_slice(&json).context("metadata is not a JSON object")?;
        debug!("Transform found {} properties in '{}'", metadata.len(), content.path.display());

        let mut raw = RawMetadata::new();
        for (key, value) in metadata {
            put_raw_value(key, Value::from_json(value), &mut raw);
        }
        Ok(raw)
    }

    async fn embed_raw(&self, metadata: RawMetadata, source: &Content, target: &Content) -> Result<(), anyhow::Error> {
        let metadata = serde_json::to_string(&metadata)?;
        self.registry
            .transform(source, &target.path, MIMETYPE_METADATA_EMBED, &Self::embed_options(&metadata), None)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use test_utils::write_temp;
    use transform::{EngineRequest, TransformConfig, TransformEngine, TransformError};

    use crate::extracter::{MappingMetadataExtracter, MetadataEmbedder, MetadataExtracter};
    use crate::qname::QName;
    use crate::value::PropertyMap;

    use super::*;

    const CONFIG: &str = r#"{
        "transformOptions": {
            "embedOptions": [{"value": {"name": "metadata", "required": true}}]
        },
        "transformers": [
            {
                "transformerName": "jsonExtract",
                "supportedSourceAndTargetList": [
                    {"sourceMediaType": "application/pdf", "targetMediaType": "alfresco-metadata-extract"}
                ]
            },
            {
                "transformerName": "jsonEmbed",
                "supportedSourceAndTargetList": [
                    {"sourceMediaType": "application/pdf", "targetMediaType": "alfresco-metadata-embed"}
                ],
                "transformOptions": ["embedOptions"]
            }
        ]
    }"#;

    /// Writes fixed metadata when extracting, and the metadata option when embedding.
    struct JsonEngine;

    #[async_trait]
    impl TransformEngine for JsonEngine {
        fn name(&self) -> &str {
            "json"
        }

        fn config(&self) -> Result<TransformConfig, TransformError> {
            TransformConfig::from_json(CONFIG).map_err(|err| TransformError::InvalidConfig(vec![err.to_string()]))
        }

        async fn transform(&self, transformer_name: &str, request: &EngineRequest) -> Result<(), anyhow::Error> {
            let output = match transformer_name {
                "jsonExtract" => r#"{"dc:title": "Report", "dc:creator": "Alice", "xmpTPg:NPages": 3}"#.to_string(),
                _ => request.options.get(OPTION_METADATA).cloned().unwrap_or_default(),
            };
            tokio::fs::write(&request.target_path, output).await?;
            Ok(())
        }
    }

    async fn extracter() -> anyhow::Result<TransformMetadataExtracter> {
        let registry = LocalTransformServiceRegistry::builder()
            .engine(Arc::new(JsonEngine))
            .build();
        registry.read_config().await?;
        Ok(TransformMetadataExtracter::new(Arc::new(registry)))
    }

    #[tokio::test]
    async fn test_supported_mimetypes() -> anyhow::Result<()> {
        let extracter = extracter().await?;

        assert!(extracter.supports_mimetype("application/pdf"));
        assert!(!extracter.supports_mimetype("text/plain"));
        assert!(extracter.supports_embed_mimetype("application/pdf"));
        Ok(())
    }

    #[tokio::test]
    async fn test_extract_raw() -> anyhow::Result<()> {
        let extracter = extracter().await?;
        let file = write_temp("%PDF", ".pdf")?;
        let content = Content::from_path(file.path(), "application/pdf").await;

        let raw = extracter.extract_raw(&content).await?;

        assert_eq!(raw["dc:title"], Value::from("Report"));
        assert_eq!(raw["xmpTPg:NPages"], Value::Long(3));
        Ok(())
    }

    #[tokio::test]
    async fn test_extract_and_embed_mapped() -> anyhow::Result<()> {
        let extracter = MappingMetadataExtracter::builder(extracter().await?).build()?;
        let file = write_temp("%PDF", ".pdf")?;
        let content = Content::from_path(file.path(), "application/pdf").await;
        let mut destination = PropertyMap::new();

        extracter.extract(&content, &mut destination).await?;

        assert_eq!(destination[&QName::cm("title")], Value::from("Report"));
        assert_eq!(destination[&QName::cm("author")], Value::from("Alice"));

        let target_file = tempfile::NamedTempFile::new()?;
        let target = Content::new(target_file.path(), "application/pdf", 0);
        extracter
            .embed(
                &PropertyMap::from([
                    (QName::cm("title"), Value::from("Renamed")),
                    (QName::cm("author"), Value::from("Bob")),
                ]),
                &content,
                &target,
            )
            .await?;
        let embedded: serde_json::Value = serde_json::from_slice(&std::fs::read(&target.path)?)?;
        assert_eq!(embedded["dc:title"], "Renamed");
        assert_eq!(embedded["dc:creator"], "Bob");
        Ok(())
    }
}
