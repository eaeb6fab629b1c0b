//! Error taxonomy for command execution

use std::fmt;
use std::io;
use thiserror::Error;

/// Result type alias for command execution
pub type CommandResult<T> = std::result::Result<T, CommandError>;

/// One of the three standard streams of a child process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardStream {
    Input,
    Output,
    Error,
}

impl StandardStream {
    /// Get the conventional short name
    pub fn as_str(&self) -> &'static str {
        match self {
            StandardStream::Input => "stdin",
            StandardStream::Output => "stdout",
            StandardStream::Error => "stderr",
        }
    }
}

impl fmt::Display for StandardStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Discriminant of [`CommandError`], for callers that only branch on the kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Launch,
    Pipe,
    Validation,
    Cancelled,
}

/// Failure outcomes of a command run
///
/// A cancelled run has no result at all. A validation failure means the
/// process completed but its exit code violated the configured policy.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The executable could not be resolved or started. No stream was opened.
    #[error("Failed to launch '{target}': {source}")]
    Launch {
        target: String,
        #[source]
        source: io::Error,
    },

    /// A configured pipe source or target failed while the process was running
    #[error("Pipe error on {stream}: {source}")]
    Pipe {
        stream: StandardStream,
        #[source]
        source: io::Error,
    },

    /// The process exited with a code rejected by the validation policy
    #[error(
        "Command '{command}' exited with non-zero exit code {exit_code}{}",
        format_stderr(.stderr)
    )]
    Validation {
        command: String,
        exit_code: i32,
        stderr: Option<String>,
    },

    /// The run was cancelled by the caller
    #[error("Command execution was cancelled")]
    Cancelled { process_id: Option<u32> },
}

fn format_stderr(stderr: &Option<String>) -> String {
    match stderr.as_deref().map(str::trim_end) {
        Some(text) if !text.is_empty() => format!("\n\nStandard error:\n{}", text),
        _ => String::new(),
    }
}

impl CommandError {
    /// Create a launch error for the given target
    pub fn launch(target: impl Into<String>, source: io::Error) -> Self {
        CommandError::Launch {
            target: target.into(),
            source,
        }
    }

    /// Create a pipe error on the given stream
    pub fn pipe(stream: StandardStream, source: io::Error) -> Self {
        CommandError::Pipe { stream, source }
    }

    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommandError::Launch { .. } => ErrorKind::Launch,
            CommandError::Pipe { .. } => ErrorKind::Pipe,
            CommandError::Validation { .. } => ErrorKind::Validation,
            CommandError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Check if the run was cancelled rather than failed
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CommandError::Cancelled { .. })
    }

    /// Exit code carried by a validation failure
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            CommandError::Validation { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }

    /// Captured standard error carried by a validation failure
    pub fn stderr(&self) -> Option<&str> {
        match self {
            CommandError::Validation { stderr, .. } => stderr.as_deref(),
            _ => None,
        }
    }

    /// The failure of a nested command that fed this run's standard input
    ///
    /// Nested failures travel through the stdin pipe as an [`io::Error`]
    /// wrapping the inner [`CommandError`].
    pub fn nested(&self) -> Option<&CommandError> {
        match self {
            CommandError::Pipe { source, .. } => source
                .get_ref()
                .and_then(|inner| inner.downcast_ref::<CommandError>()),
            _ => None,
        }
    }

    /// Wrap this error so it can travel through an I/O boundary
    pub fn into_io_error(self) -> io::Error {
        io::Error::other(self)
    }
}
