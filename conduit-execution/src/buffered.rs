//! Exit code validation and buffered execution

use conduit_core::{CommandError, CommandResult, ExecutionResult, TextEncoding, ValidationPolicy};
use tracing::debug;

use crate::cancel::Cancellation;
use crate::command::Command;
use crate::pipes::{PipeTarget, TextBuffer};
use crate::runner::ProcessRunner;

/// Apply the command's validation policy to a finished run
pub(crate) fn validate(
    command: &Command,
    result: ExecutionResult,
    stderr: Option<String>,
) -> CommandResult<ExecutionResult> {
    if command.validation().accepts(result.exit_code) {
        return Ok(result);
    }

    debug!(exit_code = result.exit_code, "Exit code rejected by validation");
    Err(CommandError::Validation {
        command: command.to_string(),
        exit_code: result.exit_code,
        stderr,
    })
}

impl ProcessRunner {
    /// Run and capture both outputs as text in the default encoding
    ///
    /// Capture buffers are added alongside the command's own output targets,
    /// which still receive everything. A rejected exit code carries the
    /// captured standard error.
    pub async fn execute_buffered(
        &self,
        command: &Command,
        cancellation: impl Into<Cancellation>,
    ) -> CommandResult<ExecutionResult> {
        let encoding = self.config().default_encoding;
        self.execute_buffered_with_encoding(command, encoding, encoding, cancellation)
            .await
    }

    pub async fn execute_buffered_with_encoding(
        &self,
        command: &Command,
        stdout_encoding: TextEncoding,
        stderr_encoding: TextEncoding,
        cancellation: impl Into<Cancellation>,
    ) -> CommandResult<ExecutionResult> {
        let stdout = TextBuffer::new();
        let stderr = TextBuffer::new();

        let capturing = command
            .with_standard_output_pipe(PipeTarget::merge([
                command.standard_output_pipe().clone(),
                PipeTarget::to_text_with_encoding(&stdout, stdout_encoding),
            ]))
            .with_standard_error_pipe(PipeTarget::merge([
                command.standard_error_pipe().clone(),
                PipeTarget::to_text_with_encoding(&stderr, stderr_encoding),
            ]))
            .with_validation(ValidationPolicy::None);

        let result = self.execute(&capturing, cancellation).await?;
        let stderr = stderr.take();

        validate(command, result, Some(stderr.clone()))
            .map(|result| result.with_output(stdout.take(), stderr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn finished(exit_code: i32) -> ExecutionResult {
        let now = Utc::now();
        ExecutionResult {
            exit_code,
            process_id: 42,
            stdout: None,
            stderr: None,
            started_at: now,
            exited_at: now,
        }
    }

    #[test]
    fn test_validate_zero_exit_code() {
        let command = Command::new("make").with_arguments(["all"]);

        assert!(validate(&command, finished(0), None).is_ok());

        let err = validate(&command, finished(2), Some("make: *** failed".into())).unwrap_err();
        assert_eq!(err.exit_code(), Some(2));
        assert_eq!(err.stderr(), Some("make: *** failed"));
        let message = err.to_string();
        assert!(message.contains("make all"));
        assert!(message.contains("make: *** failed"));
    }

    #[test]
    fn test_validate_none_accepts_anything() {
        let command = Command::new("grep").with_validation(ValidationPolicy::None);

        let result = validate(&command, finished(1), None).unwrap();
        assert_eq!(result.exit_code, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_buffered_captures_both_streams() {
        let command = Command::new("sh").with_arguments(["-c", "printf out; printf err >&2"]);

        let result = command.execute_buffered(()).await.unwrap();
        assert_eq!(result.stdout.as_deref(), Some("out"));
        assert_eq!(result.stderr.as_deref(), Some("err"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_buffered_keeps_configured_targets() {
        let own = TextBuffer::new();
        let command = Command::new("sh")
            .with_arguments(["-c", "printf shared"])
            .with_standard_output_pipe(PipeTarget::to_text(&own));

        let result = command.execute_buffered(()).await.unwrap();
        assert_eq!(result.stdout.as_deref(), Some("shared"));
        assert_eq!(own.contents(), "shared");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_buffered_validation_carries_stderr() {
        let command = Command::new("sh").with_arguments(["-c", "echo broken >&2; exit 4"]);

        let err = command.execute_buffered(()).await.unwrap_err();
        assert_eq!(err.exit_code(), Some(4));
        assert_eq!(err.stderr(), Some("broken\n"));
    }
}
