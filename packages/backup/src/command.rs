//! External program invocation.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::BackupError;

/// Lines of stderr kept in a [`BackupError::Command`].
const STDERR_TAIL_LINES: usize = 5;

/// A program and its arguments, optionally with stdout sent to a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program name, resolved through `PATH`.
    pub program: String,
    /// Arguments in order.
    pub args: Vec<String>,
    /// File that receives stdout and stderr instead of the pipe.
    pub output: Option<PathBuf>,
}

impl CommandSpec {
    #[must_use]
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            output: None,
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<S: Into<String>>(mut self, args: impl IntoIterator<Item = S>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sends stdout and stderr to `path`, truncating it.
    #[must_use]
    pub fn output_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        if let Some(output) = &self.output {
            write!(f, " > {}", output.display())?;
        }
        Ok(())
    }
}

/// Runs external programs.
pub trait CommandRunner: Send + Sync + 'static {
    /// Runs `command` to completion.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::Spawn`] if the program cannot be started and
    /// [`BackupError::Command`] if it exits unsuccessfully.
    fn run(&self, command: &CommandSpec) -> impl Future<Output = Result<(), BackupError>> + Send;
}

/// Runs commands with `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    async fn run(&self, command: &CommandSpec) -> Result<(), BackupError> {
        log::debug!("Running {command}");

        let mut process = tokio::process::Command::new(&command.program);
        process.args(&command.args).stdin(Stdio::null());

        let spawn_error = |source| BackupError::Spawn {
            command: command.to_string(),
            source,
        };

        let Some(path) = &command.output else {
            let output = process.output().await.map_err(spawn_error)?;

            let stdout = String::from_utf8_lossy(&output.stdout);
            for line in stdout.lines() {
                log::trace!("  {line}");
            }

            if output.status.success() {
                return Ok(());
            }
            return Err(BackupError::Command {
                command: command.to_string(),
                status: output.status.to_string(),
                detail: stderr_tail(&String::from_utf8_lossy(&output.stderr)),
            });
        };

        let file = open_output(path).await?;
        process
            .stderr(Stdio::from(file.try_clone()?))
            .stdout(Stdio::from(file));

        let status = process.status().await.map_err(spawn_error)?;
        if status.success() {
            return Ok(());
        }

        Err(BackupError::Command {
            command: command.to_string(),
            status: status.to_string(),
            detail: format!("output in {}", path.display()),
        })
    }
}

/// Opens `path` for a command's stdout and stderr, truncating it. Symbolic
/// links are refused.
async fn open_output(path: &Path) -> Result<std::fs::File, BackupError> {
    match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.file_type().is_symlink() => {
            return Err(BackupError::OutputSymlink {
                path: path.to_path_buf(),
            });
        }
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .await?;
    Ok(file.into_std().await)
}

/// Logs commands instead of running them.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunRunner;

impl CommandRunner for DryRunRunner {
    async fn run(&self, command: &CommandSpec) -> Result<(), BackupError> {
        log::info!("Dry run: would run {command}");
        Ok(())
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join(" | ")
}
