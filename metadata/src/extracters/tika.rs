use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use identify::content::Content;
use services::Tika;

use crate::extracter::RawExtracter;
use crate::mapping::MappingProperties;
use crate::value::{put_raw_value, RawMetadata, Value};

/// Raw name of the document author.
pub const KEY_AUTHOR: &str = "author";
/// Raw name of the document title.
pub const KEY_TITLE: &str = "title";
/// Raw name of the document subject.
pub const KEY_SUBJECT: &str = "subject";
/// Raw name of the creation date.
pub const KEY_CREATED: &str = "created";
/// Raw name of the last modification date.
pub const KEY_MODIFIED: &str = "modified";
/// Raw name of the document description.
pub const KEY_DESCRIPTION: &str = "description";
/// Raw name of document comments.
pub const KEY_COMMENTS: &str = "comments";
/// Raw name of the latitude the document was created at.
pub const KEY_LATITUDE: &str = "geo:lat";
/// Raw name of the longitude the document was created at.
pub const KEY_LONGITUDE: &str = "geo:long";

/// Tika property names read for each standard raw name, in order of preference.
const STANDARD_KEYS: &[(&str, &[&str])] = &[
    (KEY_AUTHOR, &["dc:creator", "meta:author", "Author"]),
    (KEY_TITLE, &["dc:title", "title"]),
    (KEY_SUBJECT, &["dc:subject", "cp:subject", "subject"]),
    (KEY_CREATED, &["dcterms:created", "meta:creation-date", "Creation-Date"]),
    (KEY_MODIFIED, &["dcterms:modified", "meta:save-date", "Last-Modified"]),
    (KEY_DESCRIPTION, &["dc:description", "description"]),
    (KEY_COMMENTS, &["w:comments", "comment"]),
    (KEY_LATITUDE, &["geo:lat"]),
    (KEY_LONGITUDE, &["geo:long"]),
];

const PDF_MIMETYPES: &[&str] = &["application/pdf"];

const OFFICE_MIMETYPES: &[&str] = &[
    "application/msword",
    "application/vnd.ms-excel",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/vnd.oasis.opendocument.text",
    "application/vnd.oasis.opendocument.spreadsheet",
    "application/vnd.oasis.opendocument.presentation",
    "application/rtf",
];

const AUTO_MIMETYPES: &[&str] = &[
    "text/html",
    "application/xhtml+xml",
    "application/epub+zip",
    "image/jpeg",
    "image/png",
    "image/tiff",
    "image/gif",
    "audio/mpeg",
    "audio/x-wav",
    "video/mp4",
    "video/quicktime",
];

/// Reads the metadata of a document as Tika property names and JSON values.
///
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataParser: Send + Sync {
    /// Parse the metadata of the file at `path`.
    ///
    async fn parse(&self, path: &Path) -> Result<serde_json::Map<String, serde_json::Value>, anyhow::Error>;
}

#[async_trait]
impl MetadataParser for Tika {
    async fn parse(&self, path: &Path) -> Result<serde_json::Map<String, serde_json::Value>, anyhow::Error> {
        self.metadata_map(path).await
    }
}

/// Which documents a [`TikaMetadataExtracter`] is set up for.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TikaProfile {
    /// Any format Tika detects itself, such as HTML, images and media.
    Auto,
    /// PDF documents.
    Pdf,
    /// Microsoft and OpenDocument office formats.
    Office,
}

impl TikaProfile {
    fn name(&self) -> &'static str {
        match self {
            TikaProfile::Auto => "extracter.TikaAuto",
            TikaProfile::Pdf => "extracter.PDFBox",
            TikaProfile::Office => "extracter.Office",
        }
    }

    fn mimetypes(&self) -> &'static [&'static str] {
        match self {
            TikaProfile::Auto => AUTO_MIMETYPES,
            TikaProfile::Pdf => PDF_MIMETYPES,
            TikaProfile::Office => OFFICE_MIMETYPES,
        }
    }
}

/// Reads document metadata through a Tika server.
///
/// The standard properties (author, title, dates, location...) are normalised to short raw names. Every other
/// Tika property is passed through under its own name so it can be mapped by configuration.
///
pub struct TikaMetadataExtracter {
    profile: TikaProfile,
    parser: Arc<dyn MetadataParser>,
}

impl TikaMetadataExtracter {
    /// Create an extracter for `profile` using the shared Tika client.
    ///
    pub fn new(profile: TikaProfile) -> Self {
        Self::with_parser(profile, Arc::new(Tika::default()))
    }

    /// Create an extracter for `profile` that reads metadata with `parser`.
    ///
    pub fn with_parser(profile: TikaProfile, parser: Arc<dyn MetadataParser>) -> Self {
        Self { profile, parser }
    }

    /// The profile.
    ///
    pub fn profile(&self) -> TikaProfile {
        self.profile
    }
}

#[async_trait]
impl RawExtracter for TikaMetadataExtracter {
    fn name(&self) -> &str {
        self.profile.name()
    }

    fn supports_mimetype(&self, mimetype: &str) -> bool {
        self.profile.mimetypes().contains(&mimetype)
    }

    fn default_mapping(&self) -> MappingProperties {
        let mut mapping = vec![
            (KEY_AUTHOR, "cm:author"),
            (KEY_TITLE, "cm:title"),
            (KEY_DESCRIPTION, "cm:description"),
            (KEY_CREATED, "cm:created"),
            (KEY_LATITUDE, "cm:latitude"),
            (KEY_LONGITUDE, "cm:longitude"),
        ];
        match self.profile {
            TikaProfile::Auto => mapping.extend([
                ("tiff:ImageWidth", "exif:pixelXDimension"),
                ("tiff:ImageLength", "exif:pixelYDimension"),
                ("tiff:Make", "exif:manufacturer"),
                ("tiff:Model", "exif:model"),
                ("tiff:Orientation", "exif:orientation"),
                ("exif:DateTimeOriginal", "exif:dateTimeOriginal"),
                ("exif:Flash", "exif:flash"),
                ("exif:FocalLength", "exif:focalLength"),
            ]),
            TikaProfile::Pdf => mapping.push((KEY_SUBJECT, "cm:description")),
            TikaProfile::Office => mapping.push((KEY_MODIFIED, "cm:modified")),
        }
        MappingProperties::new(mapping)
    }

    async fn extract_raw(&self, content: &Content) -> Result<RawMetadata, anyhow::Error> {
        let metadata = self.parser.parse(&content.path).await?;
        debug!("Tika found {} properties in '{}'", metadata.len(), content.path.display());
        Ok(to_raw_metadata(metadata))
    }
}

fn to_raw_metadata(metadata: serde_json::Map<String, serde_json::Value>) -> RawMetadata {
    let mut raw = RawMetadata::new();

    for (key, tika_keys) in STANDARD_KEYS {
        if let Some(value) = tika_keys.iter().find_map(|tika_key| metadata.get(*tika_key)) {
            put_raw_value(*key, Value::from_json(value.clone()), &mut raw);
        }
    }
    for (key, value) in metadata {
        if !raw.contains_key(&key) {
            put_raw_value(key, Value::from_json(value), &mut raw);
        }
    }

    raw
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_to_raw_metadata() {
        let metadata = json!({
            "dc:creator": "Alice",
            "meta:author": "Ignored",
            "dc:title": "  Report \u{0}",
            "dcterms:created": "2023-10-10T09:30:00Z",
            "dc:subject": ["coffee", "tea"],
            "xmpTPg:NPages": "3",
        });
        let serde_json::Value::Object(metadata) = metadata else { unreachable!() };

        let raw = to_raw_metadata(metadata);

        assert_eq!(raw[KEY_AUTHOR], Value::from("Alice"));
        assert_eq!(raw[KEY_TITLE], Value::from("Report"));
        assert_eq!(raw[KEY_CREATED], Value::from("2023-10-10T09:30:00Z"));
        assert_eq!(raw[KEY_SUBJECT], Value::from(vec!["coffee", "tea"]));
        assert_eq!(raw["xmpTPg:NPages"], Value::from("3"));
        assert_eq!(raw["meta:author"], Value::from("Ignored"));
    }

    #[tokio::test]
    async fn test_extract_raw() -> anyhow::Result<()> {
        let mut parser = MockMetadataParser::new();
        parser.expect_parse().times(1).returning(|_| {
            let mut metadata = serde_json::Map::new();
            metadata.insert("dc:title".to_string(), json!("Report"));
            Ok(metadata)
        });
        let extracter = TikaMetadataExtracter::with_parser(TikaProfile::Pdf, Arc::new(parser));

        let raw = extracter
            .extract_raw(&Content::new("report.pdf", "application/pdf", 10))
            .await?;

        assert_eq!(raw[KEY_TITLE], Value::from("Report"));
        Ok(())
    }

    #[test]
    fn test_profiles() -> anyhow::Result<()> {
        let auto = TikaMetadataExtracter::with_parser(TikaProfile::Auto, Arc::new(MockMetadataParser::new()));
        let pdf = TikaMetadataExtracter::with_parser(TikaProfile::Pdf, Arc::new(MockMetadataParser::new()));

        assert!(auto.supports_mimetype("image/jpeg"));
        assert!(!auto.supports_mimetype("application/pdf"));
        assert!(pdf.supports_mimetype("application/pdf"));
        assert!(auto.default_mapping().to_extract_mapping()?.contains_key("tiff:Model"));
        assert!(pdf.default_mapping().to_extract_mapping()?.contains_key(KEY_SUBJECT));
        Ok(())
    }
}
