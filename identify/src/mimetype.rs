use std::path::Path;

use anyhow::Context;
use file_format::FileFormat;
use log::{debug, warn};

use services::tika;

use crate::mimetype_map::{MIMETYPE_BINARY, MIMETYPE_TEXT_PLAIN};

/// Identifies the mimetype of a file.
///
/// The file signature is checked first. Tika is only asked when the signature is unknown or only says the file is
/// text, since most text formats have no signature. When Tika cannot be reached the signature result is used.
///
/// # Arguments
///
/// * `path` - The file to identify the mimetype for.
///
/// # Returns
///
/// The mimetype of the file, or [`None`] if nothing more specific than "binary" could be found.
///
pub async fn identify_mimetype(path: impl AsRef<Path>) -> Result<Option<String>, anyhow::Error> {
    let path = path.as_ref();
    let from_signature = identify_using_signature(path)
        .with_context(|| format!("failed to identify MIME type for '{}'", path.display()))?;
    if let Some(mimetype) = from_signature.as_deref().filter(|mimetype| is_specific(mimetype)) {
        debug!("Identified mimetype as '{}' from the file signature", mimetype);
        return Ok(Some(mimetype.to_string()));
    }

    match tika().detect(path).await {
        Ok(mimetype) if is_specific(&mimetype) => {
            debug!("Identified mimetype as '{}' using Tika", mimetype);
            Ok(Some(mimetype))
        }
        Ok(mimetype) => Ok(from_signature.or((mimetype != MIMETYPE_BINARY).then_some(mimetype))),
        Err(err) => {
            warn!("Tika could not identify '{}': {:#}", path.display(), err);
            Ok(from_signature)
        }
    }
}

fn is_specific(mimetype: &str) -> bool {
    mimetype != MIMETYPE_BINARY && mimetype != MIMETYPE_TEXT_PLAIN
}

fn identify_using_signature(path: &Path) -> Result<Option<String>, std::io::Error> {
    let mimetype = FileFormat::from_file(path)?.media_type().to_string();
    Ok((mimetype != MIMETYPE_BINARY).then_some(mimetype))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_identify_using_signature() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(b"%PDF-1.4\n%\xe2\xe3\xcf\xd3\n")?;

        assert_eq!(identify_using_signature(file.path())?, Some("application/pdf".to_string()));
        Ok(())
    }

    #[test]
    fn test_identify_using_signature_unknown() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(&[0x00, 0x13, 0x37, 0x00])?;

        assert_eq!(identify_using_signature(file.path())?, None);
        Ok(())
    }

    #[test]
    fn test_identify_using_signature_missing_path() {
        assert!(identify_using_signature(Path::new("path-does-not-exist")).is_err());
    }

    #[tokio::test]
    async fn test_identify_mimetype_by_signature() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR")?;

        assert_eq!(identify_mimetype(file.path()).await?, Some("image/png".to_string()));
        Ok(())
    }

    #[test]
    fn test_is_specific() {
        assert!(is_specific("message/rfc822"));
        assert!(!is_specific("text/plain"));
        assert!(!is_specific("application/octet-stream"));
    }
}
