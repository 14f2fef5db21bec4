use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;

use identify::mimetype_map::mimetype_map;

use crate::debug::TransformerDebug;
use crate::error::TransformError;
use crate::limits::TransformationLimits;
use crate::local::{LocalTransform, TransformCore, TransformKind, TransformRequest};

/// Transforms tried in turn until one succeeds.
///
/// Each attempt writes to its own temporary file, so a failed attempt never leaves partial output in the target.
/// If every attempt fails the error of the first is returned.
///
pub struct LocalFailoverTransform {
    core: TransformCore,
    transforms: Vec<Arc<dyn LocalTransform>>,
}

impl LocalFailoverTransform {
    /// Create a failover transform trying `transforms` in order.
    ///
    pub fn new(core: TransformCore, transforms: Vec<Arc<dyn LocalTransform>>) -> Self {
        Self { core, transforms }
    }
}

#[async_trait]
impl LocalTransform for LocalFailoverTransform {
    fn core(&self) -> &TransformCore {
        &self.core
    }

    fn kind(&self) -> TransformKind {
        TransformKind::Failover
    }

    async fn transform_impl(
        &self,
        request: &TransformRequest<'_>,
        _limits: &TransformationLimits,
        debug: &TransformerDebug,
    ) -> Result<(), TransformError> {
        let suffix = format!(".{}", mimetype_map().extension(request.target_mimetype));
        let mut first_error = None;

        for transform in &self.transforms {
            let attempt = tempfile::Builder::new()
                .suffix(&suffix)
                .tempfile()
                .context("failed to create failover file")?
                .into_temp_path();
            let attempt_request = TransformRequest {
                target_path: &attempt,
                ..*request
            };

            match transform.transform(&attempt_request, debug).await {
                Ok(()) => {
                    tokio::fs::copy(&attempt, request.target_path)
                        .await
                        .context("failed to copy failover result")?;
                    return Ok(());
                }
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }

        debug.debug("No more transformations to failover to");
        Err(first_error.unwrap_or_else(|| TransformError::Failed {
            transformer: self.core.name.clone(),
            source: anyhow!("no transformers to failover to"),
        }))
    }
}
