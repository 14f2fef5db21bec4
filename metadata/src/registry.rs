use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use log::{debug, trace};

use identify::content::Content;

use crate::extracter::{ExtractError, MetadataEmbedder, MetadataExtracter};
use crate::value::PropertyMap;

#[derive(Default)]
struct Inner {
    extracters: Vec<Arc<dyn MetadataExtracter>>,
    embedders: Vec<Arc<dyn MetadataEmbedder>>,
    extracter_cache: HashMap<String, Vec<Arc<dyn MetadataExtracter>>>,
    embedder_cache: HashMap<String, Vec<Arc<dyn MetadataEmbedder>>>,
}

impl Inner {
    fn clear_caches(&mut self) {
        self.extracter_cache.clear();
        self.embedder_cache.clear();
    }
}

/// Finds the metadata extracter or embedder for a mimetype.
///
/// When several handle a mimetype, the most recently registered one wins. Candidates are cached per mimetype, but
/// [`MetadataExtracter::is_supported`] is asked again on every lookup since its answer may change.
///
#[derive(Default)]
pub struct MetadataExtracterRegistry {
    inner: RwLock<Inner>,
}

impl MetadataExtracterRegistry {
    /// Create an empty registry.
    ///
    pub fn new() -> Self {
        Self::default()
    }

    /// Register something that both extracts and embeds.
    ///
    pub fn register<E>(&self, extracter: Arc<E>)
    where
        E: MetadataExtracter + MetadataEmbedder + 'static,
    {
        let mut inner = self.write();
        debug!("Registering metadata extracter and embedder {}", MetadataExtracter::name(extracter.as_ref()));
        inner.extracters.push(extracter.clone());
        inner.embedders.push(extracter);
        inner.clear_caches();
    }

    /// Register an extracter.
    ///
    pub fn register_extracter(&self, extracter: Arc<dyn MetadataExtracter>) {
        let mut inner = self.write();
        debug!("Registering metadata extracter {}", extracter.name());
        inner.extracters.push(extracter);
        inner.clear_caches();
    }

    /// Register an embedder.
    ///
    pub fn register_embedder(&self, embedder: Arc<dyn MetadataEmbedder>) {
        let mut inner = self.write();
        debug!("Registering metadata embedder {}", embedder.name());
        inner.embedders.push(embedder);
        inner.clear_caches();
    }

    /// The extracter for a mimetype.
    ///
    /// # Arguments
    ///
    /// * `mimetype` - The mimetype of the content to extract from.
    ///
    /// # Returns
    ///
    /// The most recently registered extracter that currently supports the mimetype, or [`None`].
    ///
    pub fn get_extracter(&self, mimetype: &str) -> Option<Arc<dyn MetadataExtracter>> {
        let candidates = self.extracter_candidates(mimetype);
        let extracter = candidates
            .into_iter()
            .rev()
            .find(|extracter| extracter.is_supported(mimetype));
        trace!(
            "Metadata extracter for {}: {:?}",
            mimetype,
            extracter.as_ref().map(|extracter| extracter.name().to_string())
        );
        extracter
    }

    /// The embedder for a mimetype.
    ///
    /// # Returns
    ///
    /// The most recently registered embedder that supports embedding into the mimetype, or [`None`].
    ///
    pub fn get_embedder(&self, mimetype: &str) -> Option<Arc<dyn MetadataEmbedder>> {
        let candidates = self.embedder_candidates(mimetype);
        candidates
            .into_iter()
            .rev()
            .find(|embedder| embedder.is_embedding_supported(mimetype))
    }

    /// Extract metadata with the extracter for the content's mimetype.
    ///
    /// # Arguments
    ///
    /// * `content` - The content to read.
    /// * `destination` - The properties to apply the extracted values to.
    ///
    /// # Returns
    ///
    /// The changed properties, or [`ExtractError::NoExtracter`].
    ///
    pub async fn extract(&self, content: &Content, destination: &mut PropertyMap) -> Result<PropertyMap, ExtractError> {
        let extracter = self
            .get_extracter(&content.mimetype)
            .ok_or_else(|| ExtractError::NoExtracter(content.mimetype.clone()))?;
        extracter.extract(content, destination).await
    }

    /// Embed properties with the embedder for the target's mimetype.
    ///
    pub async fn embed(&self, properties: &PropertyMap, source: &Content, target: &Content) -> Result<(), ExtractError> {
        let embedder = self
            .get_embedder(&target.mimetype)
            .ok_or_else(|| ExtractError::NoEmbedder(target.mimetype.clone()))?;
        embedder.embed(properties, source, target).await
    }

    fn extracter_candidates(&self, mimetype: &str) -> Vec<Arc<dyn MetadataExtracter>> {
        if let Some(candidates) = self.read().extracter_cache.get(mimetype) {
            return candidates.clone();
        }

        let mut inner = self.write();
        let candidates: Vec<_> = inner
            .extracters
            .iter()
            .filter(|extracter| extracter.is_supported(mimetype))
            .cloned()
            .collect();
        inner.extracter_cache.insert(mimetype.to_string(), candidates.clone());
        candidates
    }

    fn embedder_candidates(&self, mimetype: &str) -> Vec<Arc<dyn MetadataEmbedder>> {
        if let Some(candidates) = self.read().embedder_cache.get(mimetype) {
            return candidates.clone();
        }

        let mut inner = self.write();
        let candidates: Vec<_> = inner
            .embedders
            .iter()
            .filter(|embedder| embedder.is_embedding_supported(mimetype))
            .cloned()
            .collect();
        inner.embedder_cache.insert(mimetype.to_string(), candidates.clone());
        candidates
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
