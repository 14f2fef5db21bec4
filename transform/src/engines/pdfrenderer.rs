use anyhow::{anyhow, Context};
use async_trait::async_trait;
use log::debug;

use services::{pdf_to_image, ImageFormat, PdfToImageOptions};

use crate::config::TransformConfig;
use crate::engines::{parse_config, EngineRequest, TransformEngine};
use crate::error::TransformError;

const CONFIG: &str = include_str!("../../config/pdfrenderer.json");

const OPTION_RESOLUTION: &str = "resolution";

/// Renders the first pages of a PDF to an image with Ghostscript.
///
/// Renders one page unless a page limit is in force. The `resolution` option sets the DPI.
///
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfRendererEngine;

impl PdfRendererEngine {
    fn options(request: &EngineRequest) -> Result<PdfToImageOptions, anyhow::Error> {
        let format = ImageFormat::from_mimetype(&request.target_mimetype)
            .ok_or_else(|| anyhow!("cannot render pdf to {}", request.target_mimetype))?;

        let mut options = PdfToImageOptions {
            format,
            ..PdfToImageOptions::default()
        };
        if let Some(resolution) = request.options.get(OPTION_RESOLUTION) {
            options.resolution = resolution
                .trim()
                .parse()
                .with_context(|| format!("invalid resolution '{}'", resolution))?;
        }
        if let Some(page_limit) = request.limits.page_limit() {
            options.last_page = page_limit.max(1);
        }
        Ok(options)
    }
}

#[async_trait]
impl TransformEngine for PdfRendererEngine {
    fn name(&self) -> &str {
        "pdfrenderer"
    }

    fn config(&self) -> Result<TransformConfig, TransformError> {
        parse_config(self.name(), CONFIG)
    }

    async fn transform(&self, transformer_name: &str, request: &EngineRequest) -> Result<(), anyhow::Error> {
        let options = Self::options(request)?;
        debug!("{} rendering with {:?}", transformer_name, options);

        let input = tokio::fs::File::open(&request.source.path)
            .await
            .context("failed to open pdf")?;
        let output = tokio::fs::File::create(&request.target_path)
            .await
            .context("failed to create image file")?;

        let result = pdf_to_image().run(input, output, &options).await?;
        if !result.stderr.is_empty() {
            debug!("{} reported: {}", transformer_name, result.stderr);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use identify::content::Content;

    use crate::limits::TransformationLimits;
    use crate::options::TransformOptions;

    use super::*;

    fn request(target_mimetype: &str, options: &[(&str, &str)], page_limit: i64) -> EngineRequest {
        EngineRequest {
            source: Content::new("in.pdf", "application/pdf", 10),
            target_path: "out".into(),
            target_mimetype: target_mimetype.to_string(),
            options: options
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect::<TransformOptions>(),
            limits: TransformationLimits {
                page_limit,
                ..TransformationLimits::default()
            },
        }
    }

    #[test]
    fn test_options() -> anyhow::Result<()> {
        let options = PdfRendererEngine::options(&request("image/jpeg", &[("resolution", "72")], 3))?;

        assert_eq!(
            options,
            PdfToImageOptions {
                format: ImageFormat::Jpeg,
                resolution: 72,
                last_page: 3,
            }
        );
        Ok(())
    }

    #[test]
    fn test_options_defaults() -> anyhow::Result<()> {
        let options = PdfRendererEngine::options(&request("image/png", &[], -1))?;

        assert_eq!(options, PdfToImageOptions::default());
        Ok(())
    }

    #[test]
    fn test_options_invalid() {
        assert!(PdfRendererEngine::options(&request("image/gif", &[], -1)).is_err());
        assert!(PdfRendererEngine::options(&request("image/png", &[("resolution", "high")], -1)).is_err());
    }
}
