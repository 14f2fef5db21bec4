use anyhow::Context;
use async_trait::async_trait;
use log::debug;

use services::{html_to_pdf, HtmlToPdfOptions};

use crate::config::TransformConfig;
use crate::engines::{parse_config, EngineRequest, TransformEngine};
use crate::error::TransformError;

const CONFIG: &str = include_str!("../../config/wkhtmltopdf.json");

const OPTION_PAGE_SIZE: &str = "pageSize";
const OPTION_LANDSCAPE: &str = "landscape";

/// Renders HTML to PDF with `wkhtmltopdf`.
///
#[derive(Debug, Default, Clone, Copy)]
pub struct WkHtmlToPdfEngine;

impl WkHtmlToPdfEngine {
    fn options(request: &EngineRequest) -> HtmlToPdfOptions {
        HtmlToPdfOptions {
            page_size: request.options.get(OPTION_PAGE_SIZE).cloned(),
            landscape: request
                .options
                .get(OPTION_LANDSCAPE)
                .is_some_and(|landscape| landscape.trim().eq_ignore_ascii_case("true")),
        }
    }
}

#[async_trait]
impl TransformEngine for WkHtmlToPdfEngine {
    fn name(&self) -> &str {
        "wkhtmltopdf"
    }

    fn config(&self) -> Result<TransformConfig, TransformError> {
        parse_config(self.name(), CONFIG)
    }

    async fn transform(&self, transformer_name: &str, request: &EngineRequest) -> Result<(), anyhow::Error> {
        let input = tokio::fs::File::open(&request.source.path)
            .await
            .context("failed to open html")?;
        let output = tokio::fs::File::create(&request.target_path)
            .await
            .context("failed to create pdf file")?;

        match html_to_pdf().run(input, output, &Self::options(request)).await {
            Ok(_) => {}
            // Exit code 1 only means some resources could not be loaded
            Err(err) if err.exit_code() == Some(1) => {
                debug!("{} rendered with missing resources: {}", transformer_name, err.stderr());
            }
            Err(err) => return Err(err).context("failed to render html to pdf"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use identify::content::Content;

    use crate::limits::TransformationLimits;

    use super::*;

    #[test]
    fn test_options() {
        let request = EngineRequest {
            source: Content::new("in.html", "text/html", 10),
            target_path: "out.pdf".into(),
            target_mimetype: "application/pdf".to_string(),
            options: [("pageSize", "A4"), ("landscape", "TRUE")]
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            limits: TransformationLimits::default(),
        };

        assert_eq!(
            WkHtmlToPdfEngine::options(&request),
            HtmlToPdfOptions {
                page_size: Some("A4".to_string()),
                landscape: true,
            }
        );
    }
}
