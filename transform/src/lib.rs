//!
//! Local content transforms.
//!
//! Transformers are declared in JSON configuration, either by the engines that perform them or as pipelines and
//! failover lists combining other transformers. The [`LocalTransformServiceRegistry`] picks the transformer for a
//! source and target mimetype and runs it, tracing each step with a [`TransformerDebug`].
//!
#![warn(missing_docs)]

pub use config::*;
pub use debug::*;
pub use engines::*;
pub use error::*;
pub use limits::*;
pub use local::*;
pub use options::*;
pub use registry::*;

mod config;
mod debug;
mod engines;
mod error;
mod limits;
mod local;
mod options;
mod registry;
