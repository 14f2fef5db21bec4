use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use identify::content::Content;

use crate::config::TransformConfig;
use crate::error::TransformError;
use crate::limits::TransformationLimits;
use crate::options::TransformOptions;

pub use self::libreoffice::LibreOfficeEngine;
pub use self::pdfrenderer::PdfRendererEngine;
pub use self::tika::TikaEngine;
pub use self::wkhtmltopdf::WkHtmlToPdfEngine;

mod libreoffice;
mod pdfrenderer;
mod tika;
mod wkhtmltopdf;

/// Pipelines and failover transforms combining the built-in engines.
pub const DEFAULT_PIPELINE_CONFIG: &str = include_str!("../../config/pipelines.json");

/// A single step of a transform, as handed to an engine.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineRequest {
    /// The content to transform.
    pub source: Content,
    /// Where to write the result.
    pub target_path: PathBuf,
    /// The mimetype to produce.
    pub target_mimetype: String,
    /// The options the transformer declares.
    pub options: TransformOptions,
    /// The limits in force.
    pub limits: TransformationLimits,
}

/// Something that performs single step transforms.
///
/// An engine advertises its transformers in a [`TransformConfig`]. Those transformers may not be pipelines or
/// failover transforms.
///
#[async_trait]
pub trait TransformEngine: Send + Sync {
    /// The engine name.
    ///
    fn name(&self) -> &str;

    /// The transformers the engine performs.
    ///
    fn config(&self) -> Result<TransformConfig, TransformError>;

    /// Run one of the engine's transformers.
    ///
    /// # Arguments
    ///
    /// * `transformer_name` - The transformer to run.
    /// * `request` - The source, target and options.
    ///
    async fn transform(&self, transformer_name: &str, request: &EngineRequest) -> Result<(), anyhow::Error>;
}

/// The built-in engines.
///
pub fn default_engines() -> Vec<Arc<dyn TransformEngine>> {
    vec![
        Arc::new(LibreOfficeEngine),
        Arc::new(PdfRendererEngine),
        Arc::new(WkHtmlToPdfEngine),
        Arc::new(TikaEngine::default()),
    ]
}

fn parse_config(engine: &str, json: &str) -> Result<TransformConfig, TransformError> {
    TransformConfig::from_json(json)
        .map_err(|err| TransformError::InvalidConfig(vec![format!("engine '{}': {}", engine, err)]))
}
