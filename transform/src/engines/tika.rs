use anyhow::{anyhow, Context};
use async_trait::async_trait;

use identify::mimetype_map::{MIMETYPE_METADATA_EXTRACT, MIMETYPE_TEXT_PLAIN};
use services::Tika;

use crate::config::TransformConfig;
use crate::engines::{parse_config, EngineRequest, TransformEngine};
use crate::error::TransformError;

const CONFIG: &str = include_str!("../../config/tika.json");

/// Extracts text and metadata through a Tika server.
///
/// Metadata is written as a JSON object of Tika property names to values.
///
#[derive(Default)]
pub struct TikaEngine {
    tika: Tika,
}

impl TikaEngine {
    /// Create an engine using the Tika server at `tika_url`.
    ///
    pub fn new(tika_url: impl Into<String>) -> Self {
        Self {
            tika: Tika::new(tika_url),
        }
    }
}

#[async_trait]
impl TransformEngine for TikaEngine {
    fn name(&self) -> &str {
        "tika"
    }

    fn config(&self) -> Result<TransformConfig, TransformError> {
        parse_config(self.name(), CONFIG)
    }

    async fn transform(&self, transformer_name: &str, request: &EngineRequest) -> Result<(), anyhow::Error> {
        match request.target_mimetype.as_str() {
            MIMETYPE_TEXT_PLAIN => self
                .tika
                .text_into_file(&request.source.path, &request.target_path)
                .await
                .context("failed to extract text"),

            MIMETYPE_METADATA_EXTRACT => {
                let metadata = self
                    .tika
                    .metadata_map(&request.source.path)
                    .await
                    .context("failed to extract metadata")?;
                let json = serde_json::to_vec_pretty(&metadata)?;
                tokio::fs::write(&request.target_path, json)
                    .await
                    .context("failed to write metadata")
            }

            target => Err(anyhow!("{} cannot produce {}", transformer_name, target)),
        }
    }
}
