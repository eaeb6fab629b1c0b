//! Immutable command descriptor

use conduit_core::{
    Arguments, ArgumentsBuilder, CommandResult, EnvironmentVariables, EnvironmentVariablesBuilder,
    ExecutionResult, TextEncoding, ValidationPolicy,
};
use std::fmt;
use std::ops::BitOr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cancel::Cancellation;
use crate::events::EventStream;
use crate::pipes::{PipeSource, PipeTarget};
use crate::runner::{ProcessRunner, RunningCommand};

/// Everything needed to run one process
///
/// A `Command` never changes once built. Each `with_*` method returns a new
/// descriptor that shares every untouched field with the original, so a
/// configured command can be reused and run concurrently from many tasks.
#[derive(Clone)]
pub struct Command {
    target_file_path: Arc<Path>,
    arguments: Arc<Arguments>,
    working_dir_path: Option<Arc<Path>>,
    environment_variables: Arc<EnvironmentVariables>,
    validation: ValidationPolicy,
    standard_input_pipe: PipeSource,
    standard_output_pipe: PipeTarget,
    standard_error_pipe: PipeTarget,
}

impl Command {
    /// A command with no arguments, inherited working directory and
    /// environment, null pipes and zero-exit-code validation
    pub fn new(target_file_path: impl AsRef<Path>) -> Self {
        Self {
            target_file_path: Arc::from(target_file_path.as_ref()),
            arguments: Arc::new(Arguments::new()),
            working_dir_path: None,
            environment_variables: Arc::new(EnvironmentVariables::new()),
            validation: ValidationPolicy::default(),
            standard_input_pipe: PipeSource::null(),
            standard_output_pipe: PipeTarget::null(),
            standard_error_pipe: PipeTarget::null(),
        }
    }

    pub fn target_file_path(&self) -> &Path {
        &self.target_file_path
    }

    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    pub fn working_dir_path(&self) -> Option<&Path> {
        self.working_dir_path.as_deref()
    }

    pub fn environment_variables(&self) -> &EnvironmentVariables {
        &self.environment_variables
    }

    pub fn validation(&self) -> ValidationPolicy {
        self.validation
    }

    pub fn standard_input_pipe(&self) -> &PipeSource {
        &self.standard_input_pipe
    }

    pub fn standard_output_pipe(&self) -> &PipeTarget {
        &self.standard_output_pipe
    }

    pub fn standard_error_pipe(&self) -> &PipeTarget {
        &self.standard_error_pipe
    }

    pub fn with_target_file_path(&self, target_file_path: impl AsRef<Path>) -> Self {
        Self {
            target_file_path: Arc::from(target_file_path.as_ref()),
            ..self.clone()
        }
    }

    /// Replace the arguments with tokens that are escaped when rendered
    pub fn with_arguments<I, S>(&self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_parsed_arguments(Arguments::from_tokens(tokens))
    }

    /// Replace the arguments with one pre-formatted line, passed through unescaped
    pub fn with_raw_arguments(&self, line: impl Into<String>) -> Self {
        self.with_parsed_arguments(Arguments::raw(line))
    }

    /// Replace the arguments with the output of a builder
    pub fn with_arguments_builder<F>(&self, configure: F) -> Self
    where
        F: FnOnce(&mut ArgumentsBuilder),
    {
        let mut builder = ArgumentsBuilder::new();
        configure(&mut builder);
        self.with_parsed_arguments(builder.build())
    }

    pub fn with_parsed_arguments(&self, arguments: Arguments) -> Self {
        Self {
            arguments: Arc::new(arguments),
            ..self.clone()
        }
    }

    pub fn with_working_directory(&self, working_dir_path: impl AsRef<Path>) -> Self {
        Self {
            working_dir_path: Some(Arc::from(working_dir_path.as_ref())),
            ..self.clone()
        }
    }

    /// Edit the environment overrides, starting from the current ones
    pub fn with_environment_variables<F>(&self, configure: F) -> Self
    where
        F: FnOnce(&mut EnvironmentVariablesBuilder),
    {
        let mut builder = EnvironmentVariablesBuilder::from_existing(&self.environment_variables);
        configure(&mut builder);
        Self {
            environment_variables: Arc::new(builder.build()),
            ..self.clone()
        }
    }

    pub fn with_standard_input_pipe(&self, source: impl Into<PipeSource>) -> Self {
        Self {
            standard_input_pipe: source.into(),
            ..self.clone()
        }
    }

    pub fn with_standard_output_pipe(&self, target: PipeTarget) -> Self {
        Self {
            standard_output_pipe: target,
            ..self.clone()
        }
    }

    pub fn with_standard_error_pipe(&self, target: PipeTarget) -> Self {
        Self {
            standard_error_pipe: target,
            ..self.clone()
        }
    }

    pub fn with_validation(&self, validation: ValidationPolicy) -> Self {
        Self {
            validation,
            ..self.clone()
        }
    }

    /// Run to completion with the default runner
    pub async fn execute(
        &self,
        cancellation: impl Into<Cancellation>,
    ) -> CommandResult<ExecutionResult> {
        ProcessRunner::default().execute(self, cancellation).await
    }

    /// Run to completion and capture both outputs as text
    pub async fn execute_buffered(
        &self,
        cancellation: impl Into<Cancellation>,
    ) -> CommandResult<ExecutionResult> {
        ProcessRunner::default()
            .execute_buffered(self, cancellation)
            .await
    }

    pub async fn execute_buffered_with_encoding(
        &self,
        stdout_encoding: TextEncoding,
        stderr_encoding: TextEncoding,
        cancellation: impl Into<Cancellation>,
    ) -> CommandResult<ExecutionResult> {
        ProcessRunner::default()
            .execute_buffered_with_encoding(self, stdout_encoding, stderr_encoding, cancellation)
            .await
    }

    /// Spawn the process and return a handle immediately
    pub fn start(&self, cancellation: impl Into<Cancellation>) -> CommandResult<RunningCommand> {
        ProcessRunner::default().start(self, cancellation)
    }

    /// Run and stream lifecycle and output events
    pub fn listen(&self, cancellation: impl Into<Cancellation>) -> EventStream {
        ProcessRunner::default().listen(self, cancellation)
    }

    /// Run to completion from synchronous code
    pub fn execute_blocking(&self) -> CommandResult<ExecutionResult> {
        ProcessRunner::default().execute_blocking(self)
    }

    pub fn execute_buffered_blocking(&self) -> CommandResult<ExecutionResult> {
        ProcessRunner::default().execute_buffered_blocking(self)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.target_file_path.display())?;
        if !self.arguments.is_empty() {
            write!(f, " {}", self.arguments)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("target_file_path", &self.target_file_path)
            .field("arguments", &self.arguments.render())
            .field("working_dir_path", &self.working_dir_path)
            .field("environment_variables", &self.environment_variables)
            .field("validation", &self.validation)
            .field("standard_input_pipe", &self.standard_input_pipe)
            .field("standard_output_pipe", &self.standard_output_pipe)
            .field("standard_error_pipe", &self.standard_error_pipe)
            .finish()
    }
}

impl From<&str> for Command {
    fn from(target_file_path: &str) -> Self {
        Command::new(target_file_path)
    }
}

impl From<PathBuf> for Command {
    fn from(target_file_path: PathBuf) -> Self {
        Command::new(target_file_path)
    }
}

/// `command | target` sends standard output to `target`
impl BitOr<PipeTarget> for Command {
    type Output = Command;

    fn bitor(self, target: PipeTarget) -> Command {
        self.with_standard_output_pipe(target)
    }
}

/// `command | (stdout, stderr)` sets both output targets
impl BitOr<(PipeTarget, PipeTarget)> for Command {
    type Output = Command;

    fn bitor(self, (stdout, stderr): (PipeTarget, PipeTarget)) -> Command {
        self.with_standard_output_pipe(stdout)
            .with_standard_error_pipe(stderr)
    }
}

/// `source | command` feeds `source` to standard input
impl BitOr<Command> for PipeSource {
    type Output = Command;

    fn bitor(self, command: Command) -> Command {
        command.with_standard_input_pipe(self)
    }
}

/// `a | b` feeds the standard output of `a` to `b`
impl BitOr<Command> for Command {
    type Output = Command;

    fn bitor(self, next: Command) -> Command {
        next.with_standard_input_pipe(PipeSource::from_command(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipes::TextBuffer;

    #[test]
    fn test_defaults() {
        let command = Command::new("git");

        assert_eq!(command.target_file_path(), Path::new("git"));
        assert!(command.arguments().is_empty());
        assert!(command.working_dir_path().is_none());
        assert!(command.environment_variables().is_empty());
        assert_eq!(command.validation(), ValidationPolicy::ZeroExitCode);
        assert!(command.standard_input_pipe().is_null());
        assert!(command.standard_output_pipe().is_null());
        assert!(command.standard_error_pipe().is_null());
    }

    #[test]
    fn test_with_methods_leave_original_untouched() {
        let original = Command::new("git").with_arguments(["status"]);
        let modified = original
            .with_arguments(["commit", "-m", "two words"])
            .with_working_directory("/tmp")
            .with_environment_variables(|env| {
                env.set("GIT_AUTHOR_NAME", "someone");
            })
            .with_validation(ValidationPolicy::None);

        assert_eq!(original.to_string(), "git status");
        assert!(original.working_dir_path().is_none());
        assert!(original.environment_variables().is_empty());
        assert_eq!(original.validation(), ValidationPolicy::ZeroExitCode);

        assert_eq!(modified.to_string(), "git commit -m \"two words\"");
        assert_eq!(modified.working_dir_path(), Some(Path::new("/tmp")));
        assert_eq!(
            modified.environment_variables().get("GIT_AUTHOR_NAME"),
            Some(Some("someone"))
        );
    }

    #[test]
    fn test_unchanged_fields_are_shared() {
        let original = Command::new("ls").with_arguments(["-l", "-a"]);
        let modified = original.with_validation(ValidationPolicy::None);

        assert!(Arc::ptr_eq(&original.arguments, &modified.arguments));
        assert!(Arc::ptr_eq(
            &original.environment_variables,
            &modified.environment_variables
        ));
    }

    #[test]
    fn test_environment_edits_accumulate() {
        let command = Command::new("env")
            .with_environment_variables(|env| {
                env.set("A", "1");
            })
            .with_environment_variables(|env| {
                env.remove("HOME");
            });

        assert_eq!(command.environment_variables().get("A"), Some(Some("1")));
        assert_eq!(command.environment_variables().get("HOME"), Some(None));
    }

    #[test]
    fn test_argument_forms() {
        let raw = Command::new("sh").with_raw_arguments("-c \"echo hi\"");
        assert_eq!(raw.to_string(), "sh -c \"echo hi\"");

        let built = Command::new("sh").with_arguments_builder(|args| {
            args.add("-c").add_raw("'exit 3'");
        });
        assert_eq!(built.to_string(), "sh -c 'exit 3'");

        assert_eq!(Command::new("true").to_string(), "true");
    }

    #[test]
    fn test_pipe_operators() {
        let stdout = TextBuffer::new();
        let stderr = TextBuffer::new();

        let command = PipeSource::from_text("input")
            | Command::new("cat")
            | (PipeTarget::to_text(&stdout), PipeTarget::to_text(&stderr));

        assert_eq!(command.standard_input_pipe().kind(), "text");
        assert_eq!(command.standard_output_pipe().kind(), "text");
        assert_eq!(command.standard_error_pipe().kind(), "text");

        let chained = Command::new("echo") | Command::new("wc");
        assert_eq!(chained.target_file_path(), Path::new("wc"));
        assert_eq!(chained.standard_input_pipe().kind(), "command");
    }

    #[test]
    fn test_command_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Command>();
    }
}
