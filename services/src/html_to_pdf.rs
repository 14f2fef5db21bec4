use lazy_static::lazy_static;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::command::{CommandError, CommandOutput, ExternalCommand};

const PROGRAM: &str = "wkhtmltopdf";

const DEFAULT_ARGS: [&str; 13] = [
    "--quiet",
    "--encoding",
    "utf-8",
    "--disable-external-links",
    "--disable-internal-links",
    "--disable-forms",
    "--disable-local-file-access",
    "--disable-javascript",
    "--disable-toc-back-links",
    "--disable-plugins",
    "--proxy",
    "bogusproxy",
    "--proxy-hostname-lookup",
];

/// The type of the singleton instance of the `HtmlToPdf` service.
///
pub type HtmlToPdfService = Box<HtmlToPdf>;

lazy_static! {
    static ref HTML_TO_PDF: HtmlToPdfService = Box::<HtmlToPdf>::default();
}

/// Returns the singleton instance of the `HtmlToPdf` service.
///
pub fn html_to_pdf() -> &'static HtmlToPdfService {
    &HTML_TO_PDF
}

/// Page layout options for the `HtmlToPdf` service.
///
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HtmlToPdfOptions {
    /// Paper size such as `A4` or `Letter`; the tool's default when [`None`].
    pub page_size: Option<String>,
    /// Render in landscape orientation.
    pub landscape: bool,
}

impl HtmlToPdfOptions {
    fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = DEFAULT_ARGS.iter().map(|arg| arg.to_string()).collect();
        if let Some(page_size) = &self.page_size {
            args.push("--page-size".to_string());
            args.push(page_size.clone());
        }
        if self.landscape {
            args.push("--orientation".to_string());
            args.push("Landscape".to_string());
        }
        // Read HTML from stdin, write PDF to stdout
        args.push("-".to_string());
        args.push("-".to_string());
        args
    }
}

/// The `HtmlToPdf` service.
///
#[derive(Default)]
pub struct HtmlToPdf;

impl HtmlToPdf {
    /// Run the `HtmlToPdf` service.
    ///
    /// # Arguments
    ///
    /// * `input` - An asynchronous reader representing HTML content to read into stdin of the `HtmlToPdf` CLI tool.
    /// * `output` - An asynchronous writer representing PDF content to write from stdout of the `HtmlToPdf` CLI tool.
    /// * `options` - Page layout options.
    ///
    /// # Returns
    ///
    /// How the tool exited and its stderr, which may hold warnings, or the [`CommandError`] if it failed.
    ///
    pub async fn run<R, W>(&self, input: R, output: W, options: &HtmlToPdfOptions) -> Result<CommandOutput, CommandError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        ExternalCommand::new(PROGRAM)
            .args(options.args())
            .run(Some(input), Some(output))
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::any::{Any, TypeId};

    use super::*;

    #[test]
    fn check_singleton() {
        assert_eq!(html_to_pdf().type_id(), TypeId::of::<Box<HtmlToPdf>>());
    }

    #[test]
    fn test_args_default() {
        let args = HtmlToPdfOptions::default().args();

        assert_eq!(args.len(), DEFAULT_ARGS.len() + 2);
        assert!(args.contains(&"--disable-local-file-access".to_string()));
        assert_eq!(args[args.len() - 2..], ["-", "-"]);
    }

    #[test]
    fn test_args_page_layout() {
        let options = HtmlToPdfOptions {
            page_size: Some("A4".to_string()),
            landscape: true,
        };

        let args = options.args();

        assert_eq!(
            args[DEFAULT_ARGS.len()..],
            ["--page-size", "A4", "--orientation", "Landscape", "-", "-"]
        );
    }
}
