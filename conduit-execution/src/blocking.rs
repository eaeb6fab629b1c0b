//! Synchronous entry points
//!
//! These build a private current-thread runtime for the duration of one
//! run. Calling them from inside a tokio runtime would block one of its
//! worker threads, so that is refused with a launch error.

use conduit_core::{CommandError, CommandResult, ExecutionResult};
use std::future::Future;
use std::io;

use crate::cancel::Cancellation;
use crate::command::Command;
use crate::runner::ProcessRunner;

impl ProcessRunner {
    /// Run `command` to completion on the calling thread
    pub fn execute_blocking(&self, command: &Command) -> CommandResult<ExecutionResult> {
        block_on(command, self.execute(command, Cancellation::new()))
    }

    /// Run `command` to completion on the calling thread, capturing its output
    pub fn execute_buffered_blocking(&self, command: &Command) -> CommandResult<ExecutionResult> {
        block_on(command, self.execute_buffered(command, Cancellation::new()))
    }
}

fn block_on<F>(command: &Command, run: F) -> CommandResult<ExecutionResult>
where
    F: Future<Output = CommandResult<ExecutionResult>>,
{
    let launch_error =
        |source| CommandError::launch(command.target_file_path().display().to_string(), source);

    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(launch_error(io::Error::other(
            "blocking execution cannot run inside an async runtime; use execute instead",
        )));
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(launch_error)?;
    runtime.block_on(run)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use conduit_core::ErrorKind;

    #[test]
    fn test_execute_blocking() {
        let result = Command::new("sh")
            .with_arguments(["-c", "printf hello"])
            .execute_buffered_blocking()
            .unwrap();

        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_blocking_refused_inside_runtime() {
        let err = Command::new("sh").execute_blocking().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Launch);
    }
}
