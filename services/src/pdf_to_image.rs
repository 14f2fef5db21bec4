use lazy_static::lazy_static;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::command::{CommandError, CommandOutput, ExternalCommand};

const PROGRAM: &str = "gs";

const DEFAULT_ARGS: [&str; 4] = [
    "-q",        // No program output to stdout
    "-dNOPAUSE", // Disable prompt/pause after end of each page
    "-dBATCH",   // Exit after operation exits
    "-dSAFER",   // Activate sandboxing; prevent I/O access outside specified files
];

/// The type of the singleton instance of the `PdfToImage` service.
///
pub type PdfToImageService = Box<PdfToImage>;

lazy_static! {
    static ref PDF_TO_IMAGE: PdfToImageService = Box::<PdfToImage>::default();
}

/// Returns the singleton instance of the `PdfToImage` service.
///
pub fn pdf_to_image() -> &'static PdfToImageService {
    &PDF_TO_IMAGE
}

/// Raster formats Ghostscript can render pages to.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormat {
    /// 24-bit PNG.
    #[default]
    Png,
    /// JPEG.
    Jpeg,
}

impl ImageFormat {
    /// Map a target mimetype to a format.
    ///
    pub fn from_mimetype(mimetype: &str) -> Option<Self> {
        match mimetype {
            "image/png" => Some(Self::Png),
            "image/jpeg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    fn device(&self) -> &'static str {
        match self {
            Self::Png => "-sDEVICE=png16m",
            Self::Jpeg => "-sDEVICE=jpeg",
        }
    }
}

/// Rendering options for the `PdfToImage` service.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfToImageOptions {
    /// The output raster format.
    pub format: ImageFormat,
    /// Resolution in DPI.
    pub resolution: u32,
    /// Render pages up to and including this one. Ghostscript concatenates pages on stdout, so it defaults to 1.
    pub last_page: u32,
}

impl Default for PdfToImageOptions {
    fn default() -> Self {
        Self {
            format: ImageFormat::default(),
            resolution: 300,
            last_page: 1,
        }
    }
}

impl PdfToImageOptions {
    fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = DEFAULT_ARGS.iter().map(|arg| arg.to_string()).collect();
        args.push(format!("-r{}", self.resolution));
        args.push(self.format.device().to_string());
        args.push("-dFirstPage=1".to_string());
        args.push(format!("-dLastPage={}", self.last_page.max(1)));
        args.push("-sOutputFile=-".to_string()); // Send output to stdout
        args.push("-".to_string()); // Read input from stdin
        args
    }
}

/// The `PdfToImage` service.
///
#[derive(Default)]
pub struct PdfToImage {}

impl PdfToImage {
    /// Run the `PdfToImage` service.
    ///
    /// # Arguments
    ///
    /// * `input` - The input stream to read the PDF from.
    /// * `output` - The output stream to write the image to.
    /// * `options` - The rendering options.
    ///
    /// # Returns
    ///
    /// How the tool exited and its stderr, which may hold warnings, or the [`CommandError`] if it failed.
    ///
    pub async fn run<R, W>(&self, input: R, output: W, options: &PdfToImageOptions) -> Result<CommandOutput, CommandError>
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
        assert_eq!(pdf_to_image().type_id(), TypeId::of::<Box<PdfToImage>>());
    }

    #[test]
    fn test_image_format_from_mimetype() {
        assert_eq!(ImageFormat::from_mimetype("image/png"), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::from_mimetype("image/jpeg"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_mimetype("image/gif"), None);
    }

    #[test]
    fn test_args() {
        let options = PdfToImageOptions {
            format: ImageFormat::Jpeg,
            resolution: 72,
            last_page: 0,
        };

        let args = options.args();

        assert_eq!(
            args,
            vec![
                "-q", "-dNOPAUSE", "-dBATCH", "-dSAFER", "-r72", "-sDEVICE=jpeg",
                "-dFirstPage=1", "-dLastPage=1", "-sOutputFile=-", "-",
            ]
        );
    }
}
