use async_trait::async_trait;
use thiserror::Error;

use identify::content::Content;

use crate::convert::ConversionError;
use crate::mapping::{ExtractMapping, MappingError, MappingProperties};
use crate::overwrite::OverwritePolicy;
use crate::qname::QName;
use crate::value::{PropertyMap, RawMetadata};

pub use self::mapping_extracter::*;

mod mapping_extracter;

/// Errors from extracting or embedding metadata.
///
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The extracter does not handle the content's mimetype.
    #[error("metadata extracter '{extracter}' does not support mimetype {mimetype}")]
    Unsupported {
        /// The extracter name.
        extracter: String,
        /// The unsupported mimetype.
        mimetype: String,
    },

    /// The embedder cannot write metadata into the target's mimetype.
    #[error("metadata extracter '{extracter}' does not support embedding into mimetype {mimetype}")]
    EmbedUnsupported {
        /// The extracter name.
        extracter: String,
        /// The unsupported mimetype.
        mimetype: String,
    },

    /// No registered extracter handles the mimetype.
    #[error("no metadata extracter for mimetype {0}")]
    NoExtracter(String),

    /// No registered embedder handles the mimetype.
    #[error("no metadata embedder for mimetype {0}")]
    NoEmbedder(String),

    /// A configured or default mapping could not be read.
    #[error("invalid property mapping for metadata extracter '{extracter}'")]
    InvalidMapping {
        /// The extracter name.
        extracter: String,
        /// The mapping problem.
        #[source]
        source: MappingError,
    },

    /// The content exceeds a configured limit.
    #[error("{0}")]
    LimitExceeded(String),

    /// The extraction took longer than its timeout.
    #[error("metadata extraction timed out after {0} ms")]
    Timeout(u64),

    /// An extracted value could not be converted to the type of its property.
    #[error("failed to convert value of {property}")]
    TypeConversion {
        /// The property.
        property: QName,
        /// The conversion problem.
        #[source]
        source: ConversionError,
    },

    /// Any other failure of the underlying extracter.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Extracts metadata from content into repository properties.
///
#[async_trait]
pub trait MetadataExtracter: Send + Sync {
    /// The name used in configuration keys and logs.
    ///
    fn name(&self) -> &str;

    /// Whether the extracter currently handles this mimetype.
    ///
    /// The answer may change over time, for example when an extracter is disabled by configuration.
    ///
    fn is_supported(&self, mimetype: &str) -> bool;

    /// Extract with the extracter's own overwrite policy and mapping.
    ///
    /// # Arguments
    ///
    /// * `content` - The content to read.
    /// * `destination` - The properties to apply the extracted values to.
    ///
    /// # Returns
    ///
    /// The properties that were changed. Failures during extraction are logged and give an empty result; only an
    /// unsupported mimetype is an error.
    ///
    async fn extract(&self, content: &Content, destination: &mut PropertyMap) -> Result<PropertyMap, ExtractError>;

    /// Extract with an explicit overwrite policy and, optionally, a mapping to use instead of the configured one.
    ///
    async fn extract_with(
        &self,
        content: &Content,
        policy: OverwritePolicy,
        destination: &mut PropertyMap,
        mapping: Option<&ExtractMapping>,
    ) -> Result<PropertyMap, ExtractError>;
}

/// Writes repository properties back into content.
///
#[async_trait]
pub trait MetadataEmbedder: Send + Sync {
    /// The name used in configuration keys and logs.
    ///
    fn name(&self) -> &str;

    /// Whether metadata can be embedded into content of this mimetype.
    ///
    fn is_embedding_supported(&self, mimetype: &str) -> bool;

    /// Embed properties into a copy of `source`, written to `target`.
    ///
    /// Failures while embedding are logged; only an unsupported target mimetype is an error.
    ///
    async fn embed(&self, properties: &PropertyMap, source: &Content, target: &Content) -> Result<(), ExtractError>;
}

/// The format-specific part of an extracter: reading and writing raw, document-named properties.
///
/// Wrap it in a [`MappingMetadataExtracter`] to get mapping, type conversion, limits and overwrite policies.
///
#[async_trait]
pub trait RawExtracter: Send + Sync {
    /// The name used in configuration keys and logs.
    ///
    fn name(&self) -> &str;

    /// Whether content of this mimetype can be read.
    ///
    fn supports_mimetype(&self, mimetype: &str) -> bool;

    /// Whether metadata can be written into content of this mimetype.
    ///
    fn supports_embed_mimetype(&self, _mimetype: &str) -> bool {
        false
    }

    /// The mapping from raw names to properties used when none is configured.
    ///
    fn default_mapping(&self) -> MappingProperties;

    /// The embed mapping used when none is configured; the reverse of the extract mapping when [`None`].
    ///
    fn default_embed_mapping(&self) -> Option<MappingProperties> {
        None
    }

    /// Read the raw properties of some content.
    ///
    async fn extract_raw(&self, content: &Content) -> Result<RawMetadata, anyhow::Error>;

    /// Write raw properties into a copy of `source`, written to `target`.
    ///
    async fn embed_raw(&self, _metadata: RawMetadata, _source: &Content, _target: &Content) -> Result<(), anyhow::Error> {
        Ok(())
    }

    /// A last chance to drop properties before they are applied to the target.
    ///
    fn filter_system_properties(&self, _system_properties: &mut PropertyMap, _target: &PropertyMap) {}
}
