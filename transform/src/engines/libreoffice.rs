use anyhow::Context;
use async_trait::async_trait;
use log::debug;

use identify::mimetype_map::mimetype_map;
use services::libre_office;

use crate::config::TransformConfig;
use crate::engines::{parse_config, EngineRequest, TransformEngine};
use crate::error::TransformError;

const CONFIG: &str = include_str!("../../config/libreoffice.json");

/// Converts office documents, and HTML as a fallback, with a headless LibreOffice.
///
#[derive(Debug, Default, Clone, Copy)]
pub struct LibreOfficeEngine;

#[async_trait]
impl TransformEngine for LibreOfficeEngine {
    fn name(&self) -> &str {
        "libreoffice"
    }

    fn config(&self) -> Result<TransformConfig, TransformError> {
        parse_config(self.name(), CONFIG)
    }

    async fn transform(&self, transformer_name: &str, request: &EngineRequest) -> Result<(), anyhow::Error> {
        let output_dir = tempfile::tempdir().context("failed to create output directory")?;
        let extension = mimetype_map().extension(&request.target_mimetype);
        debug!("{} converting '{}' to {}", transformer_name, request.source.path.display(), extension);

        let converted = libre_office()
            .convert(&request.source.path, extension, output_dir.path())
            .await?;
        tokio::fs::copy(&converted, &request.target_path)
            .await
            .context("failed to copy converted document")?;
        Ok(())
    }
}
