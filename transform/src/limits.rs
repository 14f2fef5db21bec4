use std::time::Duration;

use log::trace;
use serde::{Deserialize, Serialize};

use identify::mimetype_map::mimetype_map;
use services::Config;

use crate::config::UNLIMITED;
use crate::error::TransformError;
use crate::options::{TransformOptions, OPTION_TIMEOUT};

/// Name of the limit on how long a transform may take.
pub const LIMIT_TIMEOUT_MS: &str = "timeoutMs";
/// Name of the limit on the size of the source.
pub const LIMIT_MAX_SOURCE_SIZE_K_BYTES: &str = "maxSourceSizeKBytes";
/// Name of the limit on the pages of the source.
pub const LIMIT_MAX_PAGES: &str = "maxPages";
/// Name of the limit on the pages that are transformed.
pub const LIMIT_PAGE_LIMIT: &str = "pageLimit";

const PROPERTY_PREFIX: &str = "content.transformer.";
const DEFAULT_TRANSFORMER: &str = "default";
const ANY: &str = "*";

/// Limits on a transform. [`UNLIMITED`] (-1) means no limit.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformationLimits {
    /// Abandon transforms that take longer.
    pub timeout_ms: i64,
    /// Reject larger sources.
    pub max_source_size_k_bytes: i64,
    /// Reject sources with more pages.
    pub max_pages: i64,
    /// Only transform this many pages.
    pub page_limit: i64,
}

impl Default for TransformationLimits {
    fn default() -> Self {
        Self {
            timeout_ms: UNLIMITED,
            max_source_size_k_bytes: UNLIMITED,
            max_pages: UNLIMITED,
            page_limit: UNLIMITED,
        }
    }
}

impl TransformationLimits {
    /// The limits a request asks for in its options.
    ///
    /// The timeout is given by the [`OPTION_TIMEOUT`] option; the other limits by options named after them.
    /// Values that do not parse are ignored.
    ///
    pub fn from_options(options: &TransformOptions) -> Self {
        let limit = |name: &str| {
            options
                .get(name)
                .and_then(|value| value.trim().parse().ok())
                .unwrap_or(UNLIMITED)
        };
        Self {
            timeout_ms: limit(OPTION_TIMEOUT),
            max_source_size_k_bytes: limit(LIMIT_MAX_SOURCE_SIZE_K_BYTES),
            max_pages: limit(LIMIT_MAX_PAGES),
            page_limit: limit(LIMIT_PAGE_LIMIT),
        }
    }

    /// Combine two sets of limits, keeping the tighter of each.
    ///
    pub fn combine(&self, other: &TransformationLimits) -> TransformationLimits {
        TransformationLimits {
            timeout_ms: tighter(self.timeout_ms, other.timeout_ms),
            max_source_size_k_bytes: tighter(self.max_source_size_k_bytes, other.max_source_size_k_bytes),
            max_pages: tighter(self.max_pages, other.max_pages),
            page_limit: tighter(self.page_limit, other.page_limit),
        }
    }

    /// The timeout, if limited.
    ///
    pub fn timeout(&self) -> Option<Duration> {
        u64::try_from(self.timeout_ms).ok().map(Duration::from_millis)
    }

    /// The page limit, if limited.
    ///
    pub fn page_limit(&self) -> Option<u32> {
        u32::try_from(self.page_limit).ok()
    }

    /// Reject sources larger than [`TransformationLimits::max_source_size_k_bytes`].
    ///
    pub fn check_source_size(&self, size: u64) -> Result<(), TransformError> {
        match u64::try_from(self.max_source_size_k_bytes) {
            Ok(max_k_bytes) if size > max_k_bytes.saturating_mul(1024) => Err(TransformError::SourceTooLarge {
                size,
                max_k_bytes,
            }),
            _ => Ok(()),
        }
    }
}

fn tighter(a: i64, b: i64) -> i64 {
    match (a < 0, b < 0) {
        (true, _) => b,
        (_, true) => a,
        _ => a.min(b),
    }
}

/// Transformer limits read from configuration properties.
///
/// Each limit is looked up separately and the first property found wins. For each `use` (the rendition, then
/// none) and each transformer (the named one, then `default`), the keys tried are
///
/// ```text
/// content.transformer.<transformer>.extensions.<source>.<target>.<limit>
/// content.transformer.<transformer>.extensions.<source>.*.<limit>
/// content.transformer.<transformer>.extensions.*.<target>.<limit>
/// content.transformer.<transformer>.extensions.*.*.<limit>
/// content.transformer.<transformer>.<limit>
/// ```
///
/// where source and target are file extensions. Use specific keys end with `.use.<use>`.
///
#[derive(Debug, Clone, Default)]
pub struct TransformerConfigLimits {
    config: Config,
}

impl TransformerConfigLimits {
    /// Read limits from `config`.
    ///
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// The configured limits of a transform.
    ///
    /// # Arguments
    ///
    /// * `transformer_name` - The transformer.
    /// * `source_mimetype` - The source mimetype.
    /// * `target_mimetype` - The target mimetype.
    /// * `use_` - The rendition or other use of the transform, if any.
    ///
    pub fn limits(
        &self,
        transformer_name: &str,
        source_mimetype: &str,
        target_mimetype: &str,
        use_: Option<&str>,
    ) -> TransformationLimits {
        let source_extension = mimetype_map().extension(source_mimetype);
        let target_extension = mimetype_map().extension(target_mimetype);
        let lookup = |limit: &str| {
            self.limit(transformer_name, source_extension, target_extension, use_, limit)
                .unwrap_or(UNLIMITED)
        };

        TransformationLimits {
            timeout_ms: lookup(LIMIT_TIMEOUT_MS),
            max_source_size_k_bytes: lookup(LIMIT_MAX_SOURCE_SIZE_K_BYTES),
            max_pages: lookup(LIMIT_MAX_PAGES),
            page_limit: lookup(LIMIT_PAGE_LIMIT),
        }
    }

    fn limit(
        &self,
        transformer_name: &str,
        source_extension: &str,
        target_extension: &str,
        use_: Option<&str>,
        limit: &str,
    ) -> Option<i64> {
        let uses = use_.into_iter().map(Some).chain([None]);
        for use_ in uses {
            let suffix = use_.map(|use_| format!(".use.{}", use_)).unwrap_or_default();
            for transformer in [transformer_name, DEFAULT_TRANSFORMER] {
                for (source, target) in [
                    (source_extension, target_extension),
                    (source_extension, ANY),
                    (ANY, target_extension),
                    (ANY, ANY),
                ] {
                    let key = format!(
                        "{}{}.extensions.{}.{}.{}{}",
                        PROPERTY_PREFIX, transformer, source, target, limit, suffix
                    );
                    if let Some(value) = self.config.get_i64(&key) {
                        trace!("Transformer limit {}={}", key, value);
                        return Some(value);
                    }
                }

                let key = format!("{}{}.{}{}", PROPERTY_PREFIX, transformer, limit, suffix);
                if let Some(value) = self.config.get_i64(&key) {
                    trace!("Transformer limit {}={}", key, value);
                    return Some(value);
                }
            }
        }
        None
    }
}
