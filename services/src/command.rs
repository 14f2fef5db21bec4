use std::ffi::{OsStr, OsString};
use std::process::{ExitStatus, Stdio};

use bytesize::MB;
use log::trace;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::join;

/// Failure to run an external program.
///
/// Every variant but [`CommandError::Spawn`] carries what the program wrote to stderr.
///
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The program could not be started.
    #[error("'{program}' could not be started")]
    Spawn {
        /// Name of the program.
        program: String,
        /// Why the program could not be started.
        #[source]
        source: std::io::Error,
    },

    /// The program ran, but streaming its input or output failed.
    #[error("'{program}' {status}, but streaming failed: {stderr}")]
    Stream {
        /// Name of the program.
        program: String,
        /// How the program exited.
        status: ExitStatus,
        /// The trimmed stderr of the program.
        stderr: String,
        /// The streaming error.
        #[source]
        source: std::io::Error,
    },

    /// The program exited with a non-zero status.
    #[error("'{program}' failed with {status}: {stderr}")]
    Failed {
        /// Name of the program.
        program: String,
        /// How the program exited.
        status: ExitStatus,
        /// The trimmed stderr of the program.
        stderr: String,
    },
}

impl CommandError {
    /// The exit code of the program, if it ran to completion and was not killed by a signal.
    ///
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Spawn { .. } => None,
            Self::Stream { status, .. } | Self::Failed { status, .. } => status.code(),
        }
    }

    /// What the program wrote to stderr.
    ///
    pub fn stderr(&self) -> &str {
        match self {
            Self::Spawn { .. } => "",
            Self::Stream { stderr, .. } | Self::Failed { stderr, .. } => stderr,
        }
    }
}

/// A program that ran successfully.
///
#[derive(Debug)]
pub struct CommandOutput {
    /// How the program exited.
    pub status: ExitStatus,

    /// The trimmed stderr of the program. Many tools report warnings here even when they succeed.
    pub stderr: String,
}

/// An external program and its arguments, run with its standard streams piped.
///
pub(crate) struct ExternalCommand {
    program: String,
    args: Vec<OsString>,
}

impl ExternalCommand {
    pub(crate) fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: vec![],
        }
    }

    pub(crate) fn args(mut self, args: impl IntoIterator<Item = impl AsRef<OsStr>>) -> Self {
        self.args.extend(args.into_iter().map(|arg| arg.as_ref().to_os_string()));
        self
    }

    /// Run the program, streaming `input` into its stdin and its stdout into `output`.
    ///
    /// Stdin is closed straight away when there is no input, and stdout is drained and dropped when there is no
    /// output. Stderr is always captured.
    ///
    pub(crate) async fn run<R, W>(&self, input: Option<R>, output: Option<W>) -> Result<CommandOutput, CommandError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        trace!("Running {} {:?}", self.program, self.args);
        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let mut stderr = vec![];
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let child_stderr = child.stderr.take();

        let reading = async {
            match output {
                Some(output) => pipe(stdout, Some(output)).await,
                None => pipe(stdout, Some(tokio::io::sink())).await,
            }
        };

        // Keep draining every stream even if one fails, so the program can exit
        let (writing, reading, erroring) = join!(pipe(input, stdin), reading, pipe(child_stderr, Some(&mut stderr)));
        let status = child.wait().await.map_err(|source| CommandError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        let stderr = trim_to_string(&stderr);

        if let Err(source) = writing.and(reading).and(erroring) {
            return Err(CommandError::Stream {
                program: self.program.clone(),
                status,
                stderr,
                source,
            });
        }
        if !status.success() {
            return Err(CommandError::Failed {
                program: self.program.clone(),
                status,
                stderr,
            });
        }
        Ok(CommandOutput { status, stderr })
    }
}

async fn pipe<R, W>(reader: Option<R>, writer: Option<W>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (Some(reader), Some(mut writer)) = (reader, writer) else {
        return Ok(());
    };
    let mut reader = BufReader::with_capacity(MB as usize, reader);
    tokio::io::copy_buf(&mut reader, &mut writer).await?;
    // Closes stdin of the program
    writer.shutdown().await
}

fn trim_to_string(value: &[u8]) -> String {
    String::from_utf8_lossy(value).replace('\u{0}', "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn test_run_streams_stdin_to_stdout() -> anyhow::Result<()> {
        let mut output = vec![];

        let result = ExternalCommand::new("cat")
            .run(Some(Cursor::new(b"hello world".to_vec())), Some(&mut output))
            .await?;

        assert_eq!(result.status.code(), Some(0));
        assert_eq!(result.stderr, "");
        assert_eq!(output, b"hello world");
        Ok(())
    }

    #[tokio::test]
    async fn test_run_without_streams() -> anyhow::Result<()> {
        let result = ExternalCommand::new("bash")
            .args(["-c", "echo ignored; echo warning >&2"])
            .run(Option::<Cursor<Vec<u8>>>::None, Option::<Vec<u8>>::None)
            .await?;

        assert_eq!(result.stderr, "warning");
        Ok(())
    }

    #[tokio::test]
    async fn test_run_missing_program() {
        let result = ExternalCommand::new("commandthatdoesntexist")
            .args(["random", "arguments"])
            .run(Option::<Cursor<Vec<u8>>>::None, Option::<Vec<u8>>::None)
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
        assert_eq!(err.exit_code(), None);
        assert_eq!(err.to_string(), "'commandthatdoesntexist' could not be started");
    }

    #[tokio::test]
    async fn test_run_non_zero_exit() {
        let result = ExternalCommand::new("bash")
            .args(["-c", "echo broken >&2; exit 13"])
            .run(Option::<Cursor<Vec<u8>>>::None, Option::<Vec<u8>>::None)
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, CommandError::Failed { .. }));
        assert_eq!(err.exit_code(), Some(13));
        assert_eq!(err.stderr(), "broken");
    }
}
