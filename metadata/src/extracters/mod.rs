//! Raw extracters for specific document formats.

pub use self::rfc822::*;
pub use self::tika::*;
pub use self::transform::*;

mod rfc822;
mod tika;
mod transform;
