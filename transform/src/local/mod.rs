use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use identify::content::Content;

use crate::debug::TransformerDebug;
use crate::error::TransformError;
use crate::limits::{TransformationLimits, TransformerConfigLimits};
use crate::options::{strip_options, TransformOptions};

pub use self::failover::LocalFailoverTransform;
pub use self::pipeline::LocalPipelineTransform;
pub use self::registry::*;
pub use self::single::LocalTransformImpl;

mod failover;
mod pipeline;
mod registry;
mod single;

/// A request to transform content into a file.
///
#[derive(Debug, Clone, Copy)]
pub struct TransformRequest<'a> {
    /// The content to transform.
    pub source: &'a Content,
    /// Where to write the result.
    pub target_path: &'a Path,
    /// The mimetype to produce.
    pub target_mimetype: &'a str,
    /// The request options.
    pub options: &'a TransformOptions,
    /// The rendition the transform is for, if any.
    pub rendition: Option<&'a str>,
}

/// What every local transform has.
///
#[derive(Debug, Clone)]
pub struct TransformCore {
    /// The transformer name.
    pub name: String,
    /// The options the transformer declares. Others are stripped from requests.
    pub option_names: HashSet<String>,
    /// Where configured limits come from.
    pub limits: Arc<TransformerConfigLimits>,
}

/// How a local transform does its work.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    /// One step run by an engine.
    Single,
    /// Steps run one after the other.
    Pipeline,
    /// Alternatives tried until one succeeds.
    Failover,
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformKind::Single => write!(f, "single step"),
            TransformKind::Pipeline => write!(f, "pipeline"),
            TransformKind::Failover => write!(f, "failover"),
        }
    }
}

/// A transform that runs in this process.
///
#[async_trait]
pub trait LocalTransform: Send + Sync {
    /// The name, options and limits.
    ///
    fn core(&self) -> &TransformCore;

    /// How the transform works.
    ///
    fn kind(&self) -> TransformKind;

    /// The transformer name.
    ///
    fn name(&self) -> &str {
        &self.core().name
    }

    /// Do the work of the transform.
    ///
    /// # Arguments
    ///
    /// * `request` - The request, with only the options the transform declares.
    /// * `limits` - The configured limits combined with those of the request.
    /// * `debug` - The request trace.
    ///
    async fn transform_impl(
        &self,
        request: &TransformRequest<'_>,
        limits: &TransformationLimits,
        debug: &TransformerDebug,
    ) -> Result<(), TransformError>;

    /// Run the transform inside its own debug frame.
    ///
    /// The configured limits are combined with the limits the request asks for, and a source that is too large
    /// is rejected before any work is done. A failure is recorded against the frame.
    ///
    async fn transform(&self, request: &TransformRequest<'_>, debug: &TransformerDebug) -> Result<(), TransformError> {
        let core = self.core();
        debug.push_transform(
            &core.name,
            &request.source.mimetype,
            request.target_mimetype,
            i64::try_from(request.source.size).unwrap_or(i64::MAX),
            request.rendition,
        );

        let result = async {
            let configured = core.limits.limits(
                &core.name,
                &request.source.mimetype,
                request.target_mimetype,
                request.rendition,
            );
            let limits = configured.combine(&TransformationLimits::from_options(request.options));
            limits.check_source_size(request.source.size)?;

            let options = strip_options(request.options, &core.option_names);
            let request = TransformRequest {
                options: &options,
                ..*request
            };
            self.transform_impl(&request, &limits, debug).await
        }
        .await;

        if let Err(err) = &result {
            debug.debug_error(&format!("{} failed", core.name), err);
        }
        debug.pop_transform();
        result
    }
}

#[cfg(test)]
pub(crate) mod test_engine {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use anyhow::anyhow;
    use async_trait::async_trait;

    use crate::config::TransformConfig;
    use crate::engines::{EngineRequest, TransformEngine};
    use crate::error::TransformError;

    /// An engine that writes a line naming the transformer and its source, or fails for chosen transformers.
    pub(crate) struct StubEngine {
        pub(crate) name: String,
        pub(crate) config: String,
        pub(crate) failing: Vec<String>,
        pub(crate) delay: Option<Duration>,
        pub(crate) calls: AtomicUsize,
        pub(crate) requests: Mutex<Vec<EngineRequest>>,
    }

    impl StubEngine {
        pub(crate) fn new(name: &str, config: &str) -> Self {
            Self {
                name: name.to_string(),
                config: config.to_string(),
                failing: vec![],
                delay: None,
                calls: AtomicUsize::new(0),
                requests: Mutex::new(vec![]),
            }
        }

        pub(crate) fn failing(mut self, transformer_name: &str) -> Self {
            self.failing.push(transformer_name.to_string());
            self
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TransformEngine for StubEngine {
        fn name(&self) -> &str {
            &self.name
        }

        fn config(&self) -> Result<TransformConfig, TransformError> {
            TransformConfig::from_json(&self.config).map_err(|err| TransformError::InvalidConfig(vec![err.to_string()]))
        }

        async fn transform(&self, transformer_name: &str, request: &EngineRequest) -> Result<(), anyhow::Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing.iter().any(|name| name == transformer_name) {
                return Err(anyhow!("{} could not read {}", transformer_name, request.source.mimetype));
            }

            let source = tokio::fs::read_to_string(&request.source.path).await.unwrap_or_default();
            let line = format!("{}({})", transformer_name, source.trim());
            tokio::fs::write(&request.target_path, line).await?;
            Ok(())
        }
    }
}
