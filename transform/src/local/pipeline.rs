use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;

use identify::content::Content;
use identify::mimetype_map::mimetype_map;

use crate::debug::TransformerDebug;
use crate::error::TransformError;
use crate::limits::TransformationLimits;
use crate::local::{LocalTransform, TransformCore, TransformKind, TransformRequest};

/// A step of a pipeline: the transform and the intermediate mimetype it produces.
///
pub type PipelineStep = (Arc<dyn LocalTransform>, Option<String>);

/// Transforms run one after the other, each reading the output of the one before.
///
/// Intermediate results are written to temporary files named with the extension of their mimetype, and removed
/// once the pipeline finishes.
///
pub struct LocalPipelineTransform {
    core: TransformCore,
    steps: Vec<PipelineStep>,
}

impl LocalPipelineTransform {
    /// Create a pipeline. Every step but the last must name the mimetype it produces.
    ///
    pub fn new(core: TransformCore, steps: Vec<PipelineStep>) -> Self {
        Self { core, steps }
    }
}

#[async_trait]
impl LocalTransform for LocalPipelineTransform {
    fn core(&self) -> &TransformCore {
        &self.core
    }

    fn kind(&self) -> TransformKind {
        TransformKind::Pipeline
    }

    async fn transform_impl(
        &self,
        request: &TransformRequest<'_>,
        _limits: &TransformationLimits,
        debug: &TransformerDebug,
    ) -> Result<(), TransformError> {
        let mut source = request.source.clone();
        let mut intermediates = vec![];

        for (i, (step, step_target)) in self.steps.iter().enumerate() {
            if i == self.steps.len() - 1 {
                let step_request = TransformRequest {
                    source: &source,
                    ..*request
                };
                step.transform(&step_request, debug).await?;
                break;
            }

            let step_target = step_target
                .as_deref()
                .ok_or_else(|| anyhow!("step {} of {} has no target mimetype", step.name(), self.core.name))?;
            let intermediate = tempfile::Builder::new()
                .suffix(&format!(".{}", mimetype_map().extension(step_target)))
                .tempfile()
                .context("failed to create intermediate file")?
                .into_temp_path();

            let step_request = TransformRequest {
                source: &source,
                target_path: &intermediate,
                target_mimetype: step_target,
                ..*request
            };
            step.transform(&step_request, debug).await?;

            source = Content::from_path(&intermediate, step_target).await;
            intermediates.push(intermediate);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use services::Config;
    use test_utils::write_temp;

    use crate::limits::TransformerConfigLimits;
    use crate::local::single::LocalTransformImpl;
    use crate::local::test_engine::StubEngine;
    use crate::options::{TransformOptions, OPTION_TIMEOUT};

    use super::*;

    fn core(name: &str) -> TransformCore {
        TransformCore {
            name: name.to_string(),
            option_names: HashSet::new(),
            limits: Arc::new(TransformerConfigLimits::new(Config::default())),
        }
    }

    fn pipeline(engine: StubEngine) -> (LocalPipelineTransform, Arc<StubEngine>) {
        let engine = Arc::new(engine);
        let first: Arc<dyn LocalTransform> = Arc::new(LocalTransformImpl::new(core("first"), engine.clone()));
        let second: Arc<dyn LocalTransform> = Arc::new(LocalTransformImpl::new(core("second"), engine.clone()));
        let pipeline = LocalPipelineTransform::new(
            core("pipeline"),
            vec![(first, Some("application/pdf".to_string())), (second, None)],
        );
        (pipeline, engine)
    }

    #[tokio::test]
    async fn test_steps_chain() -> anyhow::Result<()> {
        let source = write_temp("doc", ".doc")?;
        let target = tempfile::NamedTempFile::new()?;
        let (pipeline, engine) = pipeline(StubEngine::new("engine", "{}"));
        let content = Content::from_path(source.path(), "application/msword").await;
        let debug = TransformerDebug::new();
        debug.capture();

        pipeline
            .transform(
                &TransformRequest {
                    source: &content,
                    target_path: target.path(),
                    target_mimetype: "image/png",
                    options: &TransformOptions::new(),
                    rendition: Some("doclib"),
                },
                &debug,
            )
            .await?;

        assert_eq!(std::fs::read_to_string(target.path())?, "second(first(doc))");
        let requests = engine.requests.lock().unwrap();
        assert_eq!(requests[0].target_mimetype, "application/pdf");
        assert!(requests[0].target_path.to_string_lossy().ends_with(".pdf"));
        assert_eq!(requests[1].source.mimetype, "application/pdf");
        assert!(!requests[0].target_path.exists());

        let captured = debug.captured().unwrap_or_default();
        assert!(captured.contains("1.1           doc  pdf  3 bytes first"));
        assert!(captured.contains("1.2           pdf  png"));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_step_stops_pipeline() -> anyhow::Result<()> {
        let source = write_temp("doc", ".doc")?;
        let (pipeline, engine) = pipeline(StubEngine::new("engine", "{}").failing("first"));
        let content = Content::from_path(source.path(), "application/msword").await;

        let result = pipeline
            .transform(
                &TransformRequest {
                    source: &content,
                    target_path: source.path(),
                    target_mimetype: "image/png",
                    options: &TransformOptions::new(),
                    rendition: None,
                },
                &TransformerDebug::new(),
            )
            .await;

        assert!(matches!(result, Err(TransformError::Failed { transformer, .. }) if transformer == "first"));
        assert_eq!(engine.calls(), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout_reaches_steps() -> anyhow::Result<()> {
        let source = write_temp("doc", ".doc")?;
        let target = tempfile::NamedTempFile::new()?;
        let mut engine = StubEngine::new("engine", "{}");
        engine.delay = Some(Duration::from_secs(60));
        let (pipeline, engine) = pipeline(engine);
        let content = Content::from_path(source.path(), "application/msword").await;
        let options = TransformOptions::from([(OPTION_TIMEOUT.to_string(), "100".to_string())]);

        let result = pipeline
            .transform(
                &TransformRequest {
                    source: &content,
                    target_path: target.path(),
                    target_mimetype: "image/png",
                    options: &options,
                    rendition: None,
                },
                &TransformerDebug::new(),
            )
            .await;

        assert!(matches!(result, Err(TransformError::Timeout(100))));
        assert_eq!(engine.calls(), 1);
        assert_eq!(engine.requests.lock().unwrap()[0].limits.timeout_ms, 100);
        Ok(())
    }
}
