//!
//! Provides common services used for extracting metadata from and transforming files.
//!
//! This includes layered configuration, the Tika client, and wrappers around the external programs
//! (`gs`, `wkhtmltopdf`, `soffice`) that transform engines delegate to.
//!
#![warn(missing_docs)]

pub use command::{CommandError, CommandOutput};
pub use config::*;
pub use html_to_pdf::*;
pub use office::*;
pub use pdf_to_image::*;
pub use tika::*;

mod command;
mod config;
mod html_to_pdf;
mod office;
mod pdf_to_image;
mod tika;

/// Defines a closure that logs an error if the [`anyhow::Result`] passed in is an error.
///
/// Arguments follow the same syntax as [`format!`]. Meant to be used with `tap` on results that are only logged.
///
#[macro_export]
macro_rules! log_err {
    ($($arg:tt)+) => (
        |res| if let Err(err) = res {
            log::error!("{}: {:#}", format!($($arg)+), err);
        }
    );
}
