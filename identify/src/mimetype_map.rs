use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use lazy_static::lazy_static;
use log::{debug, warn};

use crate::content::Content;
use crate::mimetype::identify_mimetype;

/// Mimetype of a generic binary file.
pub const MIMETYPE_BINARY: &str = "application/octet-stream";
/// Mimetype of plain text.
pub const MIMETYPE_TEXT_PLAIN: &str = "text/plain";
/// Mimetype of HTML.
pub const MIMETYPE_HTML: &str = "text/html";
/// Mimetype of PDF documents.
pub const MIMETYPE_PDF: &str = "application/pdf";
/// Mimetype of RFC 822 email messages.
pub const MIMETYPE_RFC822: &str = "message/rfc822";
/// Mimetype of PNG images.
pub const MIMETYPE_IMAGE_PNG: &str = "image/png";
/// Mimetype of JPEG images.
pub const MIMETYPE_IMAGE_JPEG: &str = "image/jpeg";
/// Pseudo mimetype of the JSON document a metadata extract transform produces.
pub const MIMETYPE_METADATA_EXTRACT: &str = "alfresco-metadata-extract";
/// Pseudo mimetype of the target of a metadata embed transform.
pub const MIMETYPE_METADATA_EMBED: &str = "alfresco-metadata-embed";

/// Mimetype, extension pairs. The first extension listed for a mimetype is its preferred one.
const MIMETYPES: &[(&str, &str)] = &[
    (MIMETYPE_BINARY, "bin"),
    (MIMETYPE_TEXT_PLAIN, "txt"),
    (MIMETYPE_HTML, "html"),
    (MIMETYPE_HTML, "htm"),
    ("text/csv", "csv"),
    ("text/xml", "xml"),
    ("application/json", "json"),
    ("application/rtf", "rtf"),
    (MIMETYPE_PDF, "pdf"),
    (MIMETYPE_RFC822, "eml"),
    ("application/vnd.ms-outlook", "msg"),
    ("application/mbox", "mbox"),
    ("application/msword", "doc"),
    ("application/vnd.openxmlformats-officedocument.wordprocessingml.document", "docx"),
    ("application/vnd.ms-excel", "xls"),
    ("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet", "xlsx"),
    ("application/vnd.ms-powerpoint", "ppt"),
    ("application/vnd.openxmlformats-officedocument.presentationml.presentation", "pptx"),
    ("application/vnd.oasis.opendocument.text", "odt"),
    ("application/vnd.oasis.opendocument.spreadsheet", "ods"),
    ("application/vnd.oasis.opendocument.presentation", "odp"),
    (MIMETYPE_IMAGE_PNG, "png"),
    (MIMETYPE_IMAGE_JPEG, "jpg"),
    (MIMETYPE_IMAGE_JPEG, "jpeg"),
    ("image/gif", "gif"),
    ("image/tiff", "tiff"),
    ("image/tiff", "tif"),
    ("image/bmp", "bmp"),
    ("image/svg+xml", "svg"),
    ("audio/mpeg", "mp3"),
    ("video/mp4", "mp4"),
    ("application/zip", "zip"),
    (MIMETYPE_METADATA_EXTRACT, "json"),
    (MIMETYPE_METADATA_EMBED, "bin"),
];

/// Alternative names detectors report for a mimetype.
const ALIASES: &[(&str, &str)] = &[
    ("image/jpg", MIMETYPE_IMAGE_JPEG),
    ("image/pjpeg", MIMETYPE_IMAGE_JPEG),
    ("application/x-pdf", MIMETYPE_PDF),
    ("application/xml", "text/xml"),
    ("text/rtf", "application/rtf"),
    ("application/x-mbox", "application/mbox"),
];

/// Mimetypes of OLE2 compound documents, which detectors may only identify as the container.
const OLE2_MIMETYPES: &[&str] = &[
    "application/msword",
    "application/vnd.ms-excel",
    "application/vnd.ms-powerpoint",
    "application/vnd.ms-outlook",
];

lazy_static! {
    static ref MIMETYPE_MAP: MimetypeMap = MimetypeMap::default();
}

/// Returns the singleton instance of the [`MimetypeMap`], detecting content with [`identify_mimetype`].
///
pub fn mimetype_map() -> &'static MimetypeMap {
    &MIMETYPE_MAP
}

/// Detects the mimetype of a file from its content.
///
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MimetypeDetector: Send + Sync {
    /// Detect the mimetype of the file at `path`, or [`None`] if it could not be identified.
    ///
    async fn detect(&self, path: &Path) -> Result<Option<String>, anyhow::Error>;
}

/// The default detector, using file signatures and then Tika.
///
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentifyDetector;

#[async_trait]
impl MimetypeDetector for IdentifyDetector {
    async fn detect(&self, path: &Path) -> Result<Option<String>, anyhow::Error> {
        identify_mimetype(path).await
    }
}

/// Maps between mimetypes and file extensions, and compares claimed mimetypes with detected ones.
///
pub struct MimetypeMap {
    extensions_by_mimetype: HashMap<String, String>,
    mimetypes_by_extension: HashMap<String, String>,
    aliases: HashMap<String, String>,
    detector: Arc<dyn MimetypeDetector>,
}

impl Default for MimetypeMap {
    fn default() -> Self {
        Self::with_detector(Arc::new(IdentifyDetector))
    }
}

impl MimetypeMap {
    /// Create a map of the known mimetypes that uses `detector` to identify content.
    ///
    pub fn with_detector(detector: Arc<dyn MimetypeDetector>) -> Self {
        let mut extensions_by_mimetype = HashMap::new();
        let mut mimetypes_by_extension = HashMap::new();
        for (mimetype, extension) in MIMETYPES {
            extensions_by_mimetype
                .entry(mimetype.to_string())
                .or_insert_with(|| extension.to_string());
            mimetypes_by_extension
                .entry(extension.to_string())
                .or_insert_with(|| mimetype.to_string());
        }
        let aliases = ALIASES
            .iter()
            .map(|(alias, mimetype)| (alias.to_string(), mimetype.to_string()))
            .collect();

        Self {
            extensions_by_mimetype,
            mimetypes_by_extension,
            aliases,
            detector,
        }
    }

    /// The preferred file extension of a mimetype, `bin` when unknown.
    ///
    pub fn extension(&self, mimetype: &str) -> &str {
        let mimetype = self.canonical(mimetype);
        self.extensions_by_mimetype
            .get(mimetype.as_str())
            .map(String::as_str)
            .unwrap_or("bin")
    }

    /// The mimetype of a file extension, `application/octet-stream` when unknown.
    ///
    pub fn mimetype(&self, extension: &str) -> &str {
        self.mimetypes_by_extension
            .get(extension.trim_start_matches('.').to_lowercase().as_str())
            .map(String::as_str)
            .unwrap_or(MIMETYPE_BINARY)
    }

    /// Whether the mimetype has an entry in the map (directly or as an alias).
    ///
    pub fn is_known(&self, mimetype: &str) -> bool {
        self.extensions_by_mimetype.contains_key(self.canonical(mimetype).as_str())
    }

    /// Whether a detected mimetype agrees with the claimed one.
    ///
    /// They agree when they name the same type (ignoring case, parameters and aliases), or when the detected type
    /// is the generic container or parent type the claimed type is a specialization of.
    ///
    pub fn is_close_match(&self, claimed: &str, detected: &str) -> bool {
        let claimed = self.canonical(claimed);
        let detected = self.canonical(detected);

        if claimed == detected || detected == MIMETYPE_BINARY {
            return true;
        }

        match detected.as_str() {
            "application/x-tika-ooxml" | "application/zip" => {
                claimed.starts_with("application/vnd.openxmlformats-officedocument.")
                    || claimed.starts_with("application/vnd.oasis.opendocument.")
            }
            "application/x-tika-msoffice" => OLE2_MIMETYPES.contains(&claimed.as_str()),
            MIMETYPE_TEXT_PLAIN => {
                claimed.starts_with("text/") || claimed == "application/json" || claimed == MIMETYPE_RFC822
            }
            _ => false,
        }
    }

    /// Detect the mimetype of some content and return it only when it clearly differs from the claimed mimetype.
    ///
    /// # Arguments
    ///
    /// * `content` - The content with its claimed mimetype.
    ///
    /// # Returns
    ///
    /// The detected mimetype when it does not match the claimed one, otherwise [`None`]. Detection failures are
    /// logged and treated as a match.
    ///
    pub async fn mimetype_if_not_matches(&self, content: &Content) -> Option<String> {
        match self.detector.detect(&content.path).await {
            Ok(Some(detected)) if !self.is_close_match(&content.mimetype, &detected) => {
                debug!(
                    "Claimed mimetype '{}' does not match detected mimetype '{}' for '{}'",
                    content.mimetype,
                    detected,
                    content.path.display()
                );
                Some(detected)
            }
            Ok(_) => None,
            Err(err) => {
                warn!("Failed to detect mimetype of '{}': {}", content.path.display(), err);
                None
            }
        }
    }

    fn canonical(&self, mimetype: &str) -> String {
        let mimetype = mimetype
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        match self.aliases.get(&mimetype) {
            Some(canonical) => canonical.clone(),
            None => mimetype,
        }
    }
}
