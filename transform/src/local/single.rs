use std::sync::Arc;

use async_trait::async_trait;

use crate::debug::TransformerDebug;
use crate::engines::{EngineRequest, TransformEngine};
use crate::error::TransformError;
use crate::limits::TransformationLimits;
use crate::local::{LocalTransform, TransformCore, TransformKind, TransformRequest};
use crate::options::OPTION_TIMEOUT;

/// A transform performed in one step by an engine, abandoned if it exceeds its timeout.
///
pub struct LocalTransformImpl {
    core: TransformCore,
    engine: Arc<dyn TransformEngine>,
}

impl LocalTransformImpl {
    /// Create a transform run by `engine`.
    ///
    pub fn new(core: TransformCore, engine: Arc<dyn TransformEngine>) -> Self {
        Self { core, engine }
    }

    /// The engine name.
    ///
    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }
}

#[async_trait]
impl LocalTransform for LocalTransformImpl {
    fn core(&self) -> &TransformCore {
        &self.core
    }

    fn kind(&self) -> TransformKind {
        TransformKind::Single
    }

    async fn transform_impl(
        &self,
        request: &TransformRequest<'_>,
        limits: &TransformationLimits,
        debug: &TransformerDebug,
    ) -> Result<(), TransformError> {
        let engine_request = EngineRequest {
            source: request.source.clone(),
            target_path: request.target_path.to_path_buf(),
            target_mimetype: request.target_mimetype.to_string(),
            // The timeout is enforced here, engines only see it in the limits
            options: request
                .options
                .iter()
                .filter(|(name, _)| *name != OPTION_TIMEOUT)
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
            limits: *limits,
        };
        debug.debug(&format!("{} on {}", self.core.name, self.engine.name()));

        let work = self.engine.transform(&self.core.name, &engine_request);
        let result = match limits.timeout() {
            Some(timeout) => tokio::time::timeout(timeout, work)
                .await
                .map_err(|_| TransformError::Timeout(timeout.as_millis() as u64))?,
            None => work.await,
        };

        result.map_err(|source| TransformError::Failed {
            transformer: self.core.name.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use identify::content::Content;
    use services::Config;
    use test_utils::write_temp;

    use crate::limits::TransformerConfigLimits;
    use crate::local::test_engine::StubEngine;
    use crate::options::TransformOptions;

    use super::*;

    fn transform(engine: StubEngine, config: Config) -> (LocalTransformImpl, Arc<StubEngine>) {
        let engine = Arc::new(engine);
        let core = TransformCore {
            name: "stub".to_string(),
            option_names: HashSet::from(["resolution".to_string()]),
            limits: Arc::new(TransformerConfigLimits::new(config)),
        };
        (LocalTransformImpl::new(core, engine.clone()), engine)
    }

    #[tokio::test]
    async fn test_transform() -> anyhow::Result<()> {
        let source = write_temp("hello", ".txt")?;
        let target = tempfile::NamedTempFile::new()?;
        let (transform, engine) = transform(StubEngine::new("engine", "{}"), Config::default());
        let content = Content::from_path(source.path(), "text/plain").await;
        let options = TransformOptions::from([
            ("resolution".to_string(), "72".to_string()),
            ("timeout".to_string(), "5000".to_string()),
        ]);

        transform
            .transform(
                &TransformRequest {
                    source: &content,
                    target_path: target.path(),
                    target_mimetype: "application/pdf",
                    options: &options,
                    rendition: None,
                },
                &TransformerDebug::new(),
            )
            .await?;

        assert_eq!(std::fs::read_to_string(target.path())?, "stub(hello)");
        let requests = engine.requests.lock().unwrap();
        assert_eq!(
            requests[0].options,
            TransformOptions::from([("resolution".to_string(), "72".to_string())])
        );
        assert_eq!(requests[0].limits.timeout_ms, 5000);
        Ok(())
    }

    #[tokio::test]
    async fn test_source_too_large() -> anyhow::Result<()> {
        let source = write_temp("x".repeat(2048), ".txt")?;
        let (transform, engine) = transform(
            StubEngine::new("engine", "{}"),
            Config::from_properties([("content.transformer.stub.maxSourceSizeKBytes", "1")]),
        );
        let content = Content::from_path(source.path(), "text/plain").await;

        let result = transform
            .transform(
                &TransformRequest {
                    source: &content,
                    target_path: source.path(),
                    target_mimetype: "application/pdf",
                    options: &TransformOptions::new(),
                    rendition: None,
                },
                &TransformerDebug::new(),
            )
            .await;

        assert!(matches!(result, Err(TransformError::SourceTooLarge { size: 2048, max_k_bytes: 1 })));
        assert_eq!(engine.calls(), 0);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() -> anyhow::Result<()> {
        let source = write_temp("hello", ".txt")?;
        let mut engine = StubEngine::new("engine", "{}");
        engine.delay = Some(Duration::from_secs(60));
        let (transform, _) = transform(
            engine,
            Config::from_properties([("content.transformer.default.timeoutMs", "100")]),
        );
        let content = Content::from_path(source.path(), "text/plain").await;
        let debug = TransformerDebug::new();
        debug.capture();

        let result = transform
            .transform(
                &TransformRequest {
                    source: &content,
                    target_path: source.path(),
                    target_mimetype: "application/pdf",
                    options: &TransformOptions::new(),
                    rendition: None,
                },
                &debug,
            )
            .await;

        assert!(matches!(result, Err(TransformError::Timeout(100))));
        assert!(debug
            .captured()
            .is_some_and(|captured| captured.contains("stub failed transform timed out after 100 ms")));
        Ok(())
    }

    #[tokio::test]
    async fn test_engine_failure() -> anyhow::Result<()> {
        let source = write_temp("hello", ".txt")?;
        let (transform, _) = transform(StubEngine::new("engine", "{}").failing("stub"), Config::default());
        let content = Content::from_path(source.path(), "text/plain").await;

        let result = transform
            .transform(
                &TransformRequest {
                    source: &content,
                    target_path: source.path(),
                    target_mimetype: "application/pdf",
                    options: &TransformOptions::new(),
                    rendition: None,
                },
                &TransformerDebug::new(),
            )
            .await;

        assert!(matches!(result, Err(TransformError::Failed { transformer, .. }) if transformer == "stub"));
        Ok(())
    }
}
