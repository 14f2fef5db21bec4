use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use lazy_static::lazy_static;
use log::debug;

use crate::command::ExternalCommand;
use crate::config;

/// The type of the singleton instance of the `LibreOffice` service.
///
pub type LibreOfficeService = Box<LibreOffice>;

lazy_static! {
    static ref LIBRE_OFFICE: LibreOfficeService = Box::<LibreOffice>::default();
}

/// Returns the singleton instance of the `LibreOffice` service.
///
pub fn libre_office() -> &'static LibreOfficeService {
    &LIBRE_OFFICE
}

/// The `LibreOffice` service, converting office documents with a headless `soffice`.
///
/// The program can be overridden with the `LIBREOFFICE_PROGRAM` configuration value.
///
pub struct LibreOffice {
    program: String,
}

impl Default for LibreOffice {
    fn default() -> Self {
        Self {
            program: config().get_or("LIBREOFFICE_PROGRAM", "soffice"),
        }
    }
}

impl LibreOffice {
    /// Convert a document into another format.
    ///
    /// # Arguments
    ///
    /// * `input_path` - The document to convert.
    /// * `target_extension` - The file extension of the format to convert to, such as `pdf`.
    /// * `output_dir` - The directory `soffice` writes the converted file into.
    ///
    /// # Returns
    ///
    /// The path of the converted file.
    ///
    pub async fn convert(
        &self,
        input_path: impl AsRef<Path>,
        target_extension: &str,
        output_dir: impl AsRef<Path>,
    ) -> Result<PathBuf, anyhow::Error> {
        let input_path = input_path.as_ref();
        let output_dir = output_dir.as_ref();
        let args = Self::args(input_path, target_extension, output_dir);
        debug!("Running {} {:?}", self.program, args);

        let result = ExternalCommand::new(&self.program)
            .args(&args)
            .run(Option::<&[u8]>::None, Option::<Vec<u8>>::None)
            .await
            .with_context(|| format!("'{}' failed to convert document", self.program))?;

        let output_path = Self::output_path(input_path, target_extension, output_dir)?;
        if !output_path.exists() {
            return Err(anyhow!(
                "'{}' did not produce '{}': {}",
                self.program,
                output_path.display(),
                result.stderr
            ));
        }
        Ok(output_path)
    }

    fn args(input_path: &Path, target_extension: &str, output_dir: &Path) -> Vec<String> {
        vec![
            "--headless".to_string(),
            "--norestore".to_string(),
            "--nolockcheck".to_string(),
            "--convert-to".to_string(),
            target_extension.to_string(),
            "--outdir".to_string(),
            output_dir.to_string_lossy().to_string(),
            input_path.to_string_lossy().to_string(),
        ]
    }

    fn output_path(input_path: &Path, target_extension: &str, output_dir: &Path) -> Result<PathBuf, anyhow::Error> {
        let stem = input_path
            .file_stem()
            .ok_or_else(|| anyhow!("input path has no file name: {}", input_path.display()))?;
        Ok(output_dir.join(format!("{}.{}", stem.to_string_lossy(), target_extension)))
    }
}

#[cfg(test)]
mod tests {
    use std::any::{Any, TypeId};

    use super::*;

    #[test]
    fn check_singleton() {
        assert_eq!(libre_office().type_id(), TypeId::of::<Box<LibreOffice>>());
    }

    #[test]
    fn test_args() {
        let args = LibreOffice::args(Path::new("/in/report.docx"), "pdf", Path::new("/out"));

        assert_eq!(
            args,
            vec![
                "--headless", "--norestore", "--nolockcheck", "--convert-to", "pdf",
                "--outdir", "/out", "/in/report.docx",
            ]
        );
    }

    #[test]
    fn test_output_path() {
        let path = LibreOffice::output_path(Path::new("/in/quarterly.report.docx"), "pdf", Path::new("/out")).unwrap();

        assert_eq!(path, PathBuf::from("/out/quarterly.report.pdf"));
    }

    #[tokio::test]
    async fn test_convert_missing_program() {
        let office = LibreOffice {
            program: "soffice-that-doesnt-exist".to_string(),
        };

        let result = office.convert("/in/report.docx", "pdf", "/tmp").await;

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().starts_with("'soffice-that-doesnt-exist' failed to convert document"));
    }
}
