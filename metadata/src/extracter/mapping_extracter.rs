use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};

use identify::content::Content;
use identify::mimetype_map::{mimetype_map, MimetypeMap};
use services::Config;

use crate::convert::{convert, ConversionError, DateParser};
use crate::dictionary::{Dictionary, StaticDictionary};
use crate::extracter::{ExtractError, MetadataEmbedder, MetadataExtracter, RawExtracter};
use crate::limits::{concurrent_extractions, MimetypeLimits};
use crate::mapping::{merge_mapping, reverse_mapping, EmbedMapping, ExtractMapping, MappingProperties};
use crate::overwrite::OverwritePolicy;
use crate::qname::QName;
use crate::value::{PropertyMap, RawMetadata, Value};

const PROPERTY_PREFIX_METADATA: &str = "metadata.";
const PROPERTY_COMPONENT_EXTRACT: &str = ".extract.";
const PROPERTY_COMPONENT_EMBED: &str = ".embed.";

/// An extracter that maps raw document properties onto repository properties.
///
/// Raw values come from the wrapped [`RawExtracter`]. They are mapped to qualified names, converted to the
/// dictionary type of each property, and applied to the destination with an [`OverwritePolicy`].
///
/// Create one with [`MappingMetadataExtracter::builder`].
///
pub struct MappingMetadataExtracter<E> {
    raw: E,
    overwrite_policy: OverwritePolicy,
    extract_mapping: ExtractMapping,
    embed_mapping: EmbedMapping,
    supported_mimetypes: Option<HashSet<String>>,
    supported_embed_mimetypes: Option<HashSet<String>>,
    date_parser: DateParser,
    dictionary: Arc<dyn Dictionary>,
    limits: MimetypeLimits,
    config: Config,
    mimetype_map: Option<Arc<MimetypeMap>>,
    fail_on_type_conversion: bool,
    enable_string_tagging: bool,
}

impl<E: RawExtracter> MappingMetadataExtracter<E> {
    /// Start building an extracter around `raw`.
    ///
    pub fn builder(raw: E) -> MappingMetadataExtracterBuilder<E> {
        MappingMetadataExtracterBuilder::new(raw)
    }

    /// The wrapped raw extracter.
    ///
    pub fn raw(&self) -> &E {
        &self.raw
    }

    /// The policy [`MetadataExtracter::extract`] applies.
    ///
    pub fn overwrite_policy(&self) -> OverwritePolicy {
        self.overwrite_policy
    }

    /// The resolved extract mapping.
    ///
    pub fn extract_mapping(&self) -> &ExtractMapping {
        &self.extract_mapping
    }

    /// The resolved embed mapping.
    ///
    pub fn embed_mapping(&self) -> &EmbedMapping {
        &self.embed_mapping
    }

    fn is_enabled(&self, mimetype: &str) -> bool {
        let name = self.raw.name();
        let extension = mimetype_map().extension(mimetype);
        self.config.get_bool(&format!("{}.enabled", name), true)
            && self.config.get_bool(&format!("{}.{}.enabled", name, extension), true)
    }

    async fn extract_properties(
        &self,
        content: &Content,
        mapping: &ExtractMapping,
        destination: &PropertyMap,
    ) -> Result<PropertyMap, ExtractError> {
        let raw = if content.size > 0 && content.exists() {
            self.extract_raw(content).await?
        } else {
            RawMetadata::new()
        };
        debug!("Found raw metadata in '{}': {:?}", content.path.display(), raw);

        let system_properties = map_raw_to_system(raw, mapping);
        let mut system_properties = self.convert_system_property_values(system_properties)?;
        self.raw.filter_system_properties(&mut system_properties, destination);
        Ok(system_properties)
    }

    async fn extract_raw(&self, content: &Content) -> Result<RawMetadata, ExtractError> {
        let limits = self.limits.for_mimetype(&content.mimetype);
        limits
            .check_document_size(content.size)
            .map_err(ExtractError::LimitExceeded)?;

        let _permit = limits.acquire_permit().map_err(ExtractError::LimitExceeded)?;
        debug!("New extraction accepted. Concurrent extractions: {}", concurrent_extractions());

        let extraction = self.raw.extract_raw(content);
        let raw = match limits.timeout_ms {
            Some(timeout_ms) => tokio::time::timeout(Duration::from_millis(timeout_ms), extraction)
                .await
                .map_err(|_| ExtractError::Timeout(timeout_ms))??,
            None => extraction.await?,
        };
        Ok(raw)
    }

    fn convert_system_property_values(&self, system_properties: PropertyMap) -> Result<PropertyMap, ExtractError> {
        let mut converted = PropertyMap::with_capacity(system_properties.len());

        for (name, value) in system_properties {
            let data_type = match self.dictionary.property_type(&name) {
                Some(data_type) => data_type,
                None => {
                    converted.insert(name, value);
                    continue;
                }
            };

            let result = if data_type.is_date() {
                self.date_parser.make_date(value.clone())
            } else {
                convert(data_type, value.clone())
            };

            match result {
                Ok(value) => {
                    converted.insert(name, value);
                }
                Err(ConversionError::MalformedNodeRef(_)) if name == QName::cm("taggable") => {
                    if self.enable_string_tagging {
                        converted.insert(name, string_list(value));
                    } else {
                        info!("Dropping tags of {} that are not node references: {}", name, value);
                    }
                }
                Err(source) => {
                    warn!(
                        "Type conversion failed during metadata extraction of {} ({}): {}",
                        name, data_type, source
                    );
                    if self.fail_on_type_conversion {
                        return Err(ExtractError::TypeConversion { property: name, source });
                    }
                }
            }
        }

        Ok(converted)
    }

    fn map_system_to_raw(&self, properties: &PropertyMap) -> RawMetadata {
        let mut raw = RawMetadata::new();
        for (name, value) in properties {
            if let Some(raw_keys) = self.embed_mapping.get(name) {
                for raw_key in raw_keys {
                    raw.insert(raw_key.clone(), value.clone());
                }
            }
        }
        debug!("Converted system properties {:?} to raw metadata {:?}", properties, raw);
        raw
    }

    async fn mimetype_mismatch(&self, content: &Content) -> String {
        let detected = match &self.mimetype_map {
            Some(mimetype_map) => mimetype_map.mimetype_if_not_matches(content).await,
            None => None,
        };
        detected
            .map(|detected| format!(" (claimed mime type: {}, detected mime type: {})", content.mimetype, detected))
            .unwrap_or_default()
    }
}

fn map_raw_to_system(raw: RawMetadata, mapping: &ExtractMapping) -> PropertyMap {
    let mut system_properties = PropertyMap::new();
    for (raw_key, value) in raw {
        if let Some(names) = mapping.get(&raw_key) {
            for name in names {
                system_properties.insert(name.clone(), value.clone());
            }
        }
    }
    system_properties
}

fn string_list(value: Value) -> Value {
    match value {
        Value::List(values) => Value::List(values.into_iter().map(|value| Value::Text(value.to_string())).collect()),
        value => Value::List(vec![Value::Text(value.to_string())]),
    }
}

#[async_trait]
impl<E: RawExtracter> MetadataExtracter for MappingMetadataExtracter<E> {
    fn name(&self) -> &str {
        self.raw.name()
    }

    fn is_supported(&self, mimetype: &str) -> bool {
        let supported = match &self.supported_mimetypes {
            Some(supported) => supported.contains(mimetype),
            None => self.raw.supports_mimetype(mimetype),
        };
        supported && self.is_enabled(mimetype)
    }

    async fn extract(&self, content: &Content, destination: &mut PropertyMap) -> Result<PropertyMap, ExtractError> {
        self.extract_with(content, self.overwrite_policy, destination, None).await
    }

    async fn extract_with(
        &self,
        content: &Content,
        policy: OverwritePolicy,
        destination: &mut PropertyMap,
        mapping: Option<&ExtractMapping>,
    ) -> Result<PropertyMap, ExtractError> {
        debug!("Starting metadata extraction of '{}' with {}", content.path.display(), self.raw.name());

        if !MetadataExtracter::is_supported(self, &content.mimetype) {
            return Err(ExtractError::Unsupported {
                extracter: self.raw.name().to_string(),
                mimetype: content.mimetype.clone(),
            });
        }

        let mapping = mapping.unwrap_or(&self.extract_mapping);
        let changed = match self.extract_properties(content, mapping, destination).await {
            Ok(system_properties) => policy.apply_properties(system_properties, destination),
            Err(ExtractError::LimitExceeded(reason)) => {
                warn!("Metadata extraction rejected by {}: {}", self.raw.name(), reason);
                PropertyMap::new()
            }
            Err(err) => {
                let mismatch = self.mimetype_mismatch(content).await;
                warn!(
                    "Metadata extraction failed for '{}' with {}: {:#}{}",
                    content.path.display(),
                    self.raw.name(),
                    anyhow::Error::new(err),
                    mismatch
                );
                PropertyMap::new()
            }
        };

        debug!("Completed metadata extraction with {}, changed: {:?}", self.raw.name(), changed);
        Ok(changed)
    }
}

#[async_trait]
impl<E: RawExtracter> MetadataEmbedder for MappingMetadataExtracter<E> {
    fn name(&self) -> &str {
        self.raw.name()
    }

    fn is_embedding_supported(&self, mimetype: &str) -> bool {
        match &self.supported_embed_mimetypes {
            Some(supported) => supported.contains(mimetype),
            None => self.raw.supports_embed_mimetype(mimetype),
        }
    }

    async fn embed(&self, properties: &PropertyMap, source: &Content, target: &Content) -> Result<(), ExtractError> {
        debug!("Starting metadata embedding into '{}' with {}", target.path.display(), self.raw.name());

        if !self.is_embedding_supported(&target.mimetype) {
            return Err(ExtractError::EmbedUnsupported {
                extracter: self.raw.name().to_string(),
                mimetype: target.mimetype.clone(),
            });
        }

        let raw = self.map_system_to_raw(properties);
        match self.raw.embed_raw(raw, source, target).await {
            Ok(()) => debug!("Embedded metadata into '{}'", target.path.display()),
            Err(err) => {
                let mismatch = self.mimetype_mismatch(target).await;
                error!(
                    "Metadata embedding failed for '{}' with {}: {:#}{}",
                    target.path.display(),
                    self.raw.name(),
                    err,
                    mismatch
                );
            }
        }
        Ok(())
    }
}

/// Builds a [`MappingMetadataExtracter`], resolving its mappings.
///
pub struct MappingMetadataExtracterBuilder<E> {
    raw: E,
    overwrite_policy: OverwritePolicy,
    mapping: Option<MappingProperties>,
    embed_mapping: Option<MappingProperties>,
    inherit_default_mapping: bool,
    inherit_default_embed_mapping: bool,
    supported_mimetypes: Option<HashSet<String>>,
    supported_embed_mimetypes: Option<HashSet<String>>,
    date_formats: Option<Vec<String>>,
    dictionary: Arc<dyn Dictionary>,
    limits: Option<MimetypeLimits>,
    config: Config,
    mimetype_map: Option<Arc<MimetypeMap>>,
    fail_on_type_conversion: bool,
    enable_string_tagging: bool,
}

impl<E: RawExtracter> MappingMetadataExtracterBuilder<E> {
    /// A builder with the defaults: [`OverwritePolicy::Pragmatic`], the raw extracter's default mappings, the
    /// content model dictionary, and failing on type conversion errors.
    ///
    pub fn new(raw: E) -> Self {
        Self {
            raw,
            overwrite_policy: OverwritePolicy::default(),
            mapping: None,
            embed_mapping: None,
            inherit_default_mapping: false,
            inherit_default_embed_mapping: true,
            supported_mimetypes: None,
            supported_embed_mimetypes: None,
            date_formats: None,
            dictionary: Arc::new(StaticDictionary::content_model()),
            limits: None,
            config: Config::default(),
            mimetype_map: None,
            fail_on_type_conversion: true,
            enable_string_tagging: false,
        }
    }

    /// Set the policy used by [`MetadataExtracter::extract`].
    pub fn overwrite_policy(mut self, overwrite_policy: OverwritePolicy) -> Self {
        self.overwrite_policy = overwrite_policy;
        self
    }

    /// Replace the default extract mapping.
    pub fn mapping(mut self, mapping: MappingProperties) -> Self {
        self.mapping = Some(mapping);
        self
    }

    /// Replace the default embed mapping.
    pub fn embed_mapping(mut self, embed_mapping: MappingProperties) -> Self {
        self.embed_mapping = Some(embed_mapping);
        self
    }

    /// Add default mappings for raw names the configured mapping does not mention.
    pub fn inherit_default_mapping(mut self, inherit: bool) -> Self {
        self.inherit_default_mapping = inherit;
        self
    }

    /// Add default embed mappings for properties the configured embed mapping does not mention.
    pub fn inherit_default_embed_mapping(mut self, inherit: bool) -> Self {
        self.inherit_default_embed_mapping = inherit;
        self
    }

    /// Restrict or extend the mimetypes read, instead of asking the raw extracter.
    pub fn supported_mimetypes<S: Into<String>>(mut self, mimetypes: impl IntoIterator<Item = S>) -> Self {
        self.supported_mimetypes = Some(mimetypes.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict or extend the mimetypes embedded into, instead of asking the raw extracter.
    pub fn supported_embed_mimetypes<S: Into<String>>(mut self, mimetypes: impl IntoIterator<Item = S>) -> Self {
        self.supported_embed_mimetypes = Some(mimetypes.into_iter().map(Into::into).collect());
        self
    }

    /// `strftime` formats for dates that are not ISO 8601.
    pub fn date_formats<S: Into<String>>(mut self, formats: impl IntoIterator<Item = S>) -> Self {
        self.date_formats = Some(formats.into_iter().map(Into::into).collect());
        self
    }

    /// The dictionary giving property types.
    pub fn dictionary(mut self, dictionary: Arc<dyn Dictionary>) -> Self {
        self.dictionary = dictionary;
        self
    }

    /// Extraction limits by mimetype.
    pub fn limits(mut self, limits: MimetypeLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    /// Configuration for enable flags, global mapping overrides and the default timeout.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Used to report claimed versus detected mimetypes when extraction fails.
    pub fn mimetype_map(mut self, mimetype_map: Arc<MimetypeMap>) -> Self {
        self.mimetype_map = Some(mimetype_map);
        self
    }

    /// Whether a value that cannot be converted fails the whole extraction, rather than being dropped.
    pub fn fail_on_type_conversion(mut self, fail: bool) -> Self {
        self.fail_on_type_conversion = fail;
        self
    }

    /// Keep tags that are not node references as plain strings.
    pub fn enable_string_tagging(mut self, enable: bool) -> Self {
        self.enable_string_tagging = enable;
        self
    }

    /// Resolve the mappings and build the extracter.
    ///
    /// # Returns
    ///
    /// The extracter, or [`ExtractError::InvalidMapping`] if a default, configured or global mapping cannot be read.
    ///
    pub fn build(self) -> Result<MappingMetadataExtracter<E>, ExtractError> {
        let name = self.raw.name().to_string();
        let invalid = |source| ExtractError::InvalidMapping {
            extracter: name.clone(),
            source,
        };

        let default_mapping = self.raw.default_mapping().to_extract_mapping().map_err(invalid)?;
        let configured_mapping = self
            .mapping
            .map(|mapping| mapping.to_extract_mapping())
            .transpose()
            .map_err(invalid)?;
        let global_mapping = MappingProperties::from_config(
            &self.config,
            &format!("{}{}{}", PROPERTY_PREFIX_METADATA, name, PROPERTY_COMPONENT_EXTRACT),
        )
        .to_extract_mapping()
        .map_err(invalid)?;
        let extract_mapping = merge_mapping(
            configured_mapping,
            &default_mapping,
            self.inherit_default_mapping,
            global_mapping,
        );
        if extract_mapping.is_empty() && !default_mapping.is_empty() {
            warn!("There are no property mappings for the metadata extracter. Nothing will be extracted by: {}", name);
        }

        let default_embed_mapping = match self.raw.default_embed_mapping() {
            Some(embed_mapping) => embed_mapping.to_embed_mapping().map_err(invalid)?,
            None if extract_mapping.is_empty() => reverse_mapping(&default_mapping),
            None => reverse_mapping(&extract_mapping),
        };
        let configured_embed_mapping = self
            .embed_mapping
            .map(|mapping| mapping.to_embed_mapping())
            .transpose()
            .map_err(invalid)?;
        let global_embed_mapping = MappingProperties::from_config(
            &self.config,
            &format!("{}{}{}", PROPERTY_PREFIX_METADATA, name, PROPERTY_COMPONENT_EMBED),
        )
        .to_embed_mapping()
        .map_err(invalid)?;
        let embed_mapping = merge_mapping(
            configured_embed_mapping,
            &default_embed_mapping,
            self.inherit_default_embed_mapping,
            global_embed_mapping,
        );

        let limits = self
            .limits
            .or_else(|| MimetypeLimits::from_config(&self.config))
            .unwrap_or_default();
        let date_parser = self.date_formats.map(DateParser::new).unwrap_or_default();

        Ok(MappingMetadataExtracter {
            raw: self.raw,
            overwrite_policy: self.overwrite_policy,
            extract_mapping,
            embed_mapping,
            supported_mimetypes: self.supported_mimetypes,
            supported_embed_mimetypes: self.supported_embed_mimetypes,
            date_parser,
            dictionary: self.dictionary,
            limits,
            config: self.config,
            mimetype_map: self.mimetype_map,
            fail_on_type_conversion: self.fail_on_type_conversion,
            enable_string_tagging: self.enable_string_tagging,
        })
    }
}
