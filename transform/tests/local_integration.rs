//! These tests run the real engines, so they need `soffice`, `gs`, `wkhtmltopdf` and a Tika server.

use std::sync::Arc;

use identify::content::Content;
use identify::mimetype_map::MIMETYPE_METADATA_EXTRACT;
use test_utils::write_temp;
use transform::{
    default_engines, ConfigSource, LocalTransformServiceRegistry, TransformOptions, DEFAULT_PIPELINE_CONFIG,
};

const HTML: &str = "<html><head><title>Grinder</title></head><body><p>Burr grinders are consistent.</p></body></html>";

async fn registry() -> anyhow::Result<Arc<LocalTransformServiceRegistry>> {
    let registry = LocalTransformServiceRegistry::builder()
        .engines(default_engines())
        .config_source(ConfigSource::Inline(DEFAULT_PIPELINE_CONFIG.to_string()))
        .build();
    registry.read_config().await?;
    Ok(Arc::new(registry))
}

#[tokio::test]
#[ignore]
async fn test_html_to_pdf() -> anyhow::Result<()> {
    let registry = registry().await?;
    let source = write_temp(HTML, ".html")?;
    let target = tempfile::Builder::new().suffix(".pdf").tempfile()?;
    let content = Content::from_path(source.path(), "text/html").await;

    registry
        .transform(&content, target.path(), "application/pdf", &TransformOptions::new(), None)
        .await?;

    assert!(std::fs::read(target.path())?.starts_with(b"%PDF"));
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_html_to_png_via_pdf() -> anyhow::Result<()> {
    let registry = registry().await?;
    let source = write_temp(HTML, ".html")?;
    let target = tempfile::Builder::new().suffix(".png").tempfile()?;
    let content = Content::from_path(source.path(), "text/html").await;
    let options = TransformOptions::from([("resolution".to_string(), "72".to_string())]);

    registry
        .transform(&content, target.path(), "image/png", &options, Some("doclib"))
        .await?;

    assert!(std::fs::read(target.path())?.starts_with(b"\x89PNG"));
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_html_metadata_extract() -> anyhow::Result<()> {
    let registry = registry().await?;
    let source = write_temp(HTML, ".html")?;
    let target = tempfile::Builder::new().suffix(".json").tempfile()?;
    let content = Content::from_path(source.path(), "text/html").await;

    registry
        .transform(&content, target.path(), MIMETYPE_METADATA_EXTRACT, &TransformOptions::new(), None)
        .await?;

    let metadata: serde_json::Value = serde_json::from_slice(&std::fs::read(target.path())?)?;
    assert_eq!(metadata["dc:title"], "Grinder");
    Ok(())
}
