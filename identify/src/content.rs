use std::path::{Path, PathBuf};

use crate::mimetype_map::mimetype_map;

/// A file together with the mimetype it claims to be and its size.
///
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Content {
    /// Location of the file.
    pub path: PathBuf,

    /// The claimed mimetype.
    pub mimetype: String,

    /// Size in bytes; 0 for missing or empty content.
    pub size: u64,
}

impl Content {
    /// Describe content whose size is already known.
    ///
    pub fn new(path: impl Into<PathBuf>, mimetype: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            mimetype: mimetype.into(),
            size,
        }
    }

    /// Describe the file at `path`, reading its size from the file system.
    ///
    /// A file that does not exist has a size of 0.
    ///
    pub async fn from_path(path: impl AsRef<Path>, mimetype: impl Into<String>) -> Self {
        let size = tokio::fs::metadata(path.as_ref())
            .await
            .map(|metadata| metadata.len())
            .unwrap_or(0);
        Self::new(path.as_ref(), mimetype, size)
    }

    /// Whether the file exists.
    ///
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// The preferred extension of the claimed mimetype.
    ///
    pub fn extension(&self) -> &'static str {
        mimetype_map().extension(&self.mimetype)
    }

    /// The same file, claiming a different mimetype.
    ///
    pub fn with_mimetype(&self, mimetype: impl Into<String>) -> Self {
        Self {
            path: self.path.clone(),
            mimetype: mimetype.into(),
            size: self.size,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[tokio::test]
    async fn test_from_path() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(b"hello world")?;

        let content = Content::from_path(file.path(), "text/plain").await;

        assert_eq!(content.size, 11);
        assert!(content.exists());
        assert_eq!(content.extension(), "txt");
        Ok(())
    }

    #[tokio::test]
    async fn test_from_missing_path() {
        let content = Content::from_path("path-does-not-exist", "application/pdf").await;

        assert_eq!(content.size, 0);
        assert!(!content.exists());
    }

    #[test]
    fn test_with_mimetype() {
        let content = Content::new("/tmp/a", "application/pdf", 3).with_mimetype("image/png");

        assert_eq!(content, Content::new("/tmp/a", "image/png", 3));
    }
}
