//! External editor invocation.

use std::env;
use std::path::Path;
use std::process::{Command, ExitStatus};

use thiserror::Error;
use tracing::debug;

const EDITOR_ENV_VARS: [&str; 3] = ["FIN_EDITOR", "VISUAL", "EDITOR"];
const FALLBACK_EDITOR: &str = "vi";

/// Exit information reported by an editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditorExit {
    /// Process exit code; `None` when the editor was killed by a signal.
    pub code: Option<i32>,
}

impl EditorExit {
    /// Exit with status 0.
    pub const SUCCESS: Self = Self { code: Some(0) };

    /// Whether the editor exited with status 0.
    #[must_use]
    pub const fn success(self) -> bool {
        matches!(self.code, Some(0))
    }
}

impl From<ExitStatus> for EditorExit {
    fn from(status: ExitStatus) -> Self {
        Self { code: status.code() }
    }
}

/// Errors raised while starting an editor.
#[derive(Debug, Error)]
pub enum EditorError {
    /// The configured command could not be split into words.
    #[error("cannot parse editor command '{command}': {source}")]
    Parse {
        /// Raw command string.
        command: String,
        /// Tokenizer error.
        #[source]
        source: shell_words::ParseError,
    },
    /// The editor process could not be spawned.
    #[error("failed to launch editor '{program}': {source}")]
    Launch {
        /// Program that failed to start.
        program: String,
        /// Spawn error.
        #[source]
        source: std::io::Error,
    },
}

/// Opens a file for interactive editing and waits until the user is done.
pub trait EditorLauncher {
    /// Edit the file at `path` in place.
    ///
    /// # Errors
    /// Returns [`EditorError`] when the editor cannot be started.
    fn launch(&self, path: &Path) -> Result<EditorExit, EditorError>;
}

impl<F> EditorLauncher for F
where
    F: Fn(&Path) -> Result<EditorExit, EditorError>,
{
    fn launch(&self, path: &Path) -> Result<EditorExit, EditorError> {
        self(path)
    }
}

/// Launches a shell-style command line with the file path appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEditor {
    command: String,
}

impl CommandEditor {
    /// Use an explicit command line such as `code --wait`.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// Resolve the command from the environment, then `configured`, then `vi`.
    #[must_use]
    pub fn from_env(configured: Option<&str>) -> Self {
        Self::new(resolve_editor_command(|key| env::var(key).ok(), configured))
    }

    /// Command line that will be run.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }
}

impl EditorLauncher for CommandEditor {
    fn launch(&self, path: &Path) -> Result<EditorExit, EditorError> {
        let mut parts = shell_words::split(&self.command).map_err(|source| EditorError::Parse {
            command: self.command.clone(),
            source,
        })?;
        if parts.is_empty() {
            parts.push(self.command.clone());
        }
        let program = parts.remove(0);

        debug!(%program, path = %path.display(), "launching editor");
        let status = Command::new(&program)
            .args(&parts)
            .arg(path)
            .status()
            .map_err(|source| EditorError::Launch { program, source })?;
        Ok(status.into())
    }
}

/// Pick the editor command: `FIN_EDITOR`, `VISUAL`, `EDITOR`, the configured
/// command, then `vi`. Blank values are skipped.
#[must_use]
pub fn resolve_editor_command<F>(lookup: F, configured: Option<&str>) -> String
where
    F: Fn(&str) -> Option<String>,
{
    EDITOR_ENV_VARS
        .iter()
        .find_map(|key| lookup(key).filter(|value| !value.trim().is_empty()))
        .or_else(|| {
            configured
                .filter(|value| !value.trim().is_empty())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| FALLBACK_EDITOR.to_owned())
}
