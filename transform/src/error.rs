use thiserror::Error;

/// Errors of transform lookups and transforms.
///
#[derive(Debug, Error)]
pub enum TransformError {
    /// No transformer supports the source, target and options.
    #[error("no transformer supports {source_mimetype} to {target_mimetype}")]
    NoTransformer {
        /// The source mimetype.
        source_mimetype: String,
        /// The target mimetype.
        target_mimetype: String,
    },

    /// The source is larger than the transformer allows.
    #[error("source of {size} bytes is larger than the limit of {max_k_bytes} KB")]
    SourceTooLarge {
        /// The source size in bytes.
        size: u64,
        /// The limit in kilobytes.
        max_k_bytes: u64,
    },

    /// The transform did not finish in time.
    #[error("transform timed out after {0} ms")]
    Timeout(u64),

    /// A transformer failed.
    #[error("{transformer} failed")]
    Failed {
        /// The transformer that failed.
        transformer: String,
        /// What went wrong.
        #[source]
        source: anyhow::Error,
    },

    /// The transformer configuration is invalid.
    #[error("invalid transformer configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    /// Any other error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
