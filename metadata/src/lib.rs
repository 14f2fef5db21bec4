//!
//! # Metadata
//!
//! Extracts repository properties from content and embeds them back.
//!
//! A [`RawExtracter`] reads the properties of a document format under the names that format uses. Wrapped in a
//! [`MappingMetadataExtracter`] those names are mapped to qualified property names, converted to the type the
//! [`Dictionary`] declares, and applied to the destination properties under an [`OverwritePolicy`]. The
//! [`MetadataExtracterRegistry`] picks the extracter for a mimetype.
//!
#![warn(missing_docs)]

pub use convert::*;
pub use dictionary::*;
pub use extracter::*;
pub use extracters::*;
pub use limits::*;
pub use mapping::*;
pub use overwrite::*;
pub use qname::*;
pub use registry::*;
pub use value::*;

mod convert;
mod dictionary;
mod extracter;
mod extracters;
mod limits;
mod mapping;
mod overwrite;
mod qname;
mod registry;
mod value;
