//!
//! # Test Utilities
//!
//! Helpers shared by the tests of the workspace crates.
//!
#![warn(missing_docs)]

use std::io::Write;

use tempfile::{Builder, NamedTempFile};

/// Writes `contents` to a new temporary file.
///
/// # Arguments
///
/// * `contents` - The bytes to write.
/// * `suffix` - The file name suffix, such as `.eml`.
///
/// # Returns
///
/// The file, removed when dropped.
///
pub fn write_temp(contents: impl AsRef<[u8]>, suffix: &str) -> std::io::Result<NamedTempFile> {
    let mut file = Builder::new().suffix(suffix).tempfile()?;
    file.write_all(contents.as_ref())?;
    file.flush()?;
    Ok(file)
}

/// A small RFC 822 message with the headers the mail extracter reads.
///
pub const SAMPLE_EML: &str = "From: Alice Example <alice@example.com>\r\n\
To: Bob Example <bob@example.com>, carol@example.com\r\n\
Cc: dave@example.com\r\n\
Subject: Quarterly report\r\n\
Date: Tue, 10 Oct 2023 09:30:00 +0000\r\n\
Message-ID: <1234@example.com>\r\n\
Thread-Index: AQHZ+abc\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Numbers are up.\r\n";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_temp() -> std::io::Result<()> {
        let file = write_temp("hello", ".txt")?;

        assert!(file.path().to_string_lossy().ends_with(".txt"));
        assert_eq!(std::fs::read(file.path())?, b"hello");
        Ok(())
    }

    #[test]
    fn test_sample_eml_has_headers_and_body() {
        let (headers, body) = SAMPLE_EML.split_once("\r\n\r\n").unwrap_or_default();

        assert!(headers.starts_with("From: "));
        assert_eq!(body, "Numbers are up.\r\n");
    }
}
