use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytesize::MIB;
use serde::{Deserialize, Serialize};

use services::Config;

/// Property holding the default extraction timeout in milliseconds.
pub const PROP_DEFAULT_TIMEOUT: &str = "content.metadataExtracter.default.timeoutMs";

/// Mimetype key of the limits that apply to every mimetype without its own limits.
pub const ANY_MIMETYPE: &str = "*";

static CONCURRENT_EXTRACTIONS: AtomicUsize = AtomicUsize::new(0);

/// Limits on a single metadata extraction. [`None`] means unlimited.
///
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtracterLimits {
    /// Abandon extractions that take longer.
    pub timeout_ms: Option<u64>,

    /// Reject documents larger than this, in megabytes.
    pub max_document_size_mb: Option<f64>,

    /// Reject extractions while this many are already running in the process.
    pub max_concurrent_extractions: Option<usize>,
}

impl ExtracterLimits {
    /// The timeout as a duration.
    ///
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Check a document size against the limit.
    ///
    /// # Returns
    ///
    /// A description of the exceeded limit, if it is exceeded.
    ///
    pub fn check_document_size(&self, size: u64) -> Result<(), String> {
        match self.max_document_size_mb {
            Some(max_mb) if size as f64 > max_mb * MIB as f64 => {
                Err(format!("Max doc size exceeded {} MB", max_mb))
            }
            _ => Ok(()),
        }
    }

    /// Count an extraction against the process-wide concurrency limit.
    ///
    /// # Returns
    ///
    /// A permit that releases the slot when dropped, or a description of the exceeded limit.
    ///
    pub fn acquire_permit(&self) -> Result<ExtractionPermit, String> {
        let max = self.max_concurrent_extractions.unwrap_or(usize::MAX);
        CONCURRENT_EXTRACTIONS
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |running| {
                (running < max).then_some(running + 1)
            })
            .map(|_| ExtractionPermit { _private: () })
            .map_err(|_| format!("Reached concurrent extractions limit - {}", max))
    }
}

/// A running extraction, counted until dropped.
///
#[derive(Debug)]
pub struct ExtractionPermit {
    _private: (),
}

impl Drop for ExtractionPermit {
    fn drop(&mut self) {
        CONCURRENT_EXTRACTIONS.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The number of extractions currently running in the process.
///
pub fn concurrent_extractions() -> usize {
    CONCURRENT_EXTRACTIONS.load(Ordering::SeqCst)
}

/// Extracter limits by mimetype, with `*` applying to any mimetype without an entry.
///
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MimetypeLimits {
    limits: HashMap<String, ExtracterLimits>,
}

impl MimetypeLimits {
    /// Set the limits of a mimetype, or of every mimetype with `*`.
    ///
    pub fn with(mut self, mimetype: impl Into<String>, limits: ExtracterLimits) -> Self {
        self.limits.insert(mimetype.into(), limits);
        self
    }

    /// Limits for every mimetype from the default timeout property, when it is set.
    ///
    pub fn from_config(config: &Config) -> Option<Self> {
        config.get_u64(PROP_DEFAULT_TIMEOUT).map(|timeout_ms| {
            Self::default().with(
                ANY_MIMETYPE,
                ExtracterLimits {
                    timeout_ms: Some(timeout_ms),
                    ..Default::default()
                },
            )
        })
    }

    /// The limits of a mimetype: its own, else the `*` limits, else unlimited.
    ///
    pub fn for_mimetype(&self, mimetype: &str) -> ExtracterLimits {
        self.limits
            .get(mimetype)
            .or_else(|| self.limits.get(ANY_MIMETYPE))
            .copied()
            .unwrap_or_default()
    }
}
