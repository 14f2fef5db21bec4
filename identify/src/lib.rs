//!
//! Identify is a library for identifying files based on their content.
//!
//! "Identification" includes the following:
//! * MIME type detection
//! * Mapping between MIME types and file extensions
//! * Checking a claimed MIME type against the detected one
//!
#![warn(missing_docs)]

/// Content described by a path, a claimed MIME type and a size.
///
pub mod content;

/// MIME type identification functionality.
///
pub mod mimetype;

/// MIME type to extension mapping and claimed-vs-detected comparison.
///
pub mod mimetype_map;
