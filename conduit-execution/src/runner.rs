//! Process runner
//!
//! [`ProcessRunner::start`] spawns the child synchronously and hands its
//! supervision to a tokio task. The supervisor pumps the three standard
//! streams on their own tasks while it waits for the process to exit, and
//! watches both cancellation tokens the whole time.

use chrono::{DateTime, Utc};
use conduit_config::{ConfigResult, ExecutionConfig, Validatable};
use conduit_core::{CommandError, CommandResult, ExecutionResult, StandardStream};
use futures::future::BoxFuture;
use std::future::IntoFuture;
use std::io;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::process::Child;
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::buffered::validate;
use crate::cancel::Cancellation;
use crate::command::Command;
use crate::pipes::{join_error, BoxedReader, PipeContext, PipeTarget};
use crate::resolve::resolve_executable;

/// Runs [`Command`]s with a shared execution configuration
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    config: Arc<ExecutionConfig>,
}

impl ProcessRunner {
    /// Create a runner, rejecting configurations that fail validation
    pub fn new(config: ExecutionConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Spawn the process described by `command`
    ///
    /// Returns as soon as the process exists, so the caller can read its id
    /// while it runs. Must be called from within a tokio runtime. Dropping
    /// the returned handle kills the process.
    pub fn start(
        &self,
        command: &Command,
        cancellation: impl Into<Cancellation>,
    ) -> CommandResult<RunningCommand> {
        let cancellation = cancellation.into();
        if cancellation.is_cancelled() {
            debug!(command = %command, "Cancelled before start");
            return Err(CommandError::Cancelled { process_id: None });
        }

        let target = command.target_file_path();
        let launch_error = |err| CommandError::launch(target.display().to_string(), err);
        let program = resolve_executable(
            target,
            command.working_dir_path(),
            command.environment_variables(),
        )
        .map_err(launch_error)?;

        let mut process = tokio::process::Command::new(&program);
        process.args(command.arguments().to_argv());
        if let Some(dir) = command.working_dir_path() {
            process.current_dir(dir);
        }
        for (name, value) in command.environment_variables().iter() {
            match value {
                Some(value) => process.env(name, value),
                None => process.env_remove(name),
            };
        }
        process
            .stdin(stdio(!command.standard_input_pipe().is_null()))
            .stdout(stdio(!command.standard_output_pipe().is_null()))
            .stderr(stdio(!command.standard_error_pipe().is_null()))
            .kill_on_drop(true);

        let child = process.spawn().map_err(launch_error)?;
        let started_at = Utc::now();
        let process_id = child.id().unwrap_or_default();

        let span = tracing::info_span!(
            "command",
            run_id = %Uuid::new_v4(),
            target = %target.display(),
            pid = process_id,
        );
        debug!(parent: &span, program = %program.display(), "Process started");

        let supervisor = Supervisor {
            runner: self.clone(),
            command: command.clone(),
            cancellation,
            process_id,
            started_at,
        };
        let task = tokio::spawn(supervisor.run(child).instrument(span));

        Ok(RunningCommand {
            process_id,
            started_at,
            task: AbortOnDropHandle::new(task),
        })
    }

    /// Spawn the process and wait for it to finish
    pub async fn execute(
        &self,
        command: &Command,
        cancellation: impl Into<Cancellation>,
    ) -> CommandResult<ExecutionResult> {
        self.start(command, cancellation)?.wait().await
    }
}

/// A process that has been spawned and is being supervised
///
/// Await it (or call [`wait`](Self::wait)) for the result. Dropping it
/// kills the process and stops every pump.
pub struct RunningCommand {
    process_id: u32,
    started_at: DateTime<Utc>,
    task: AbortOnDropHandle<CommandResult<ExecutionResult>>,
}

impl RunningCommand {
    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub async fn wait(self) -> CommandResult<ExecutionResult> {
        match self.task.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => Err(CommandError::Cancelled {
                process_id: Some(self.process_id),
            }),
        }
    }
}

impl std::fmt::Debug for RunningCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningCommand")
            .field("process_id", &self.process_id)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

impl IntoFuture for RunningCommand {
    type Output = CommandResult<ExecutionResult>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}

type PumpHandle = JoinHandle<io::Result<()>>;

enum Event {
    Cancelled,
    Interrupt,
    GraceElapsed,
    Pump(StandardStream, io::Result<()>),
    Exited(io::Result<ExitStatus>),
}

struct Supervisor {
    runner: ProcessRunner,
    command: Command,
    cancellation: Cancellation,
    process_id: u32,
    started_at: DateTime<Utc>,
}

impl Supervisor {
    async fn run(self, mut child: Child) -> CommandResult<ExecutionResult> {
        let forceful = self.cancellation.forceful_token().clone();
        let graceful = self.cancellation.graceful_token().clone();

        // Pumps stop once the supervisor returns, whatever the outcome
        let pumps = CancellationToken::new();
        let _pumps_guard = pumps.clone().drop_guard();
        let stdin_token = pumps.child_token();

        let mut stdin_task = child.stdin.take().map(|stdin| {
            let source = self.command.standard_input_pipe().clone();
            let context = self.context(stdin_token.clone());
            tokio::spawn(
                async move { source.pump(Box::new(stdin), context).await }.in_current_span(),
            )
        });
        let mut stdout_task = child.stdout.take().map(|stdout| {
            spawn_drain(
                self.command.standard_output_pipe().clone(),
                Box::new(stdout),
                self.context(pumps.clone()),
            )
        });
        let mut stderr_task = child.stderr.take().map(|stderr| {
            spawn_drain(
                self.command.standard_error_pipe().clone(),
                Box::new(stderr),
                self.context(pumps.clone()),
            )
        });

        let mut grace: Option<Pin<Box<Sleep>>> = None;
        let mut interrupted = false;

        let status = loop {
            // An exit that already happened wins over a cancellation racing it
            let event = tokio::select! {
                biased;
                status = child.wait() => Event::Exited(status),
                _ = forceful.cancelled() => Event::Cancelled,
                _ = graceful.cancelled(), if !interrupted => Event::Interrupt,
                _ = wait_for(&mut grace) => Event::GraceElapsed,
                result = join_pump(&mut stdin_task) => Event::Pump(StandardStream::Input, result),
                result = join_pump(&mut stdout_task) => Event::Pump(StandardStream::Output, result),
                result = join_pump(&mut stderr_task) => Event::Pump(StandardStream::Error, result),
            };

            match event {
                Event::Cancelled => return Err(self.kill(&mut child, "Run cancelled").await),
                Event::Interrupt => {
                    interrupted = true;
                    let grace_period = self.runner.config().kill_grace_period;
                    info!(grace_period = ?grace_period, "Interrupting process");
                    if let Err(err) = interrupt(&mut child) {
                        warn!(error = %err, "Failed to interrupt process");
                    }
                    grace = Some(Box::pin(tokio::time::sleep(grace_period)));
                }
                Event::GraceElapsed => {
                    return Err(self.kill(&mut child, "Grace period elapsed").await);
                }
                Event::Pump(_, Ok(())) => {}
                Event::Pump(StandardStream::Input, Err(err)) if is_benign_stdin_error(&err) => {
                    debug!("Process closed its standard input early");
                }
                Event::Pump(stream, Err(err)) => {
                    warn!(stream = %stream, error = %err, "Pipe failed, killing process");
                    self.kill(&mut child, "Pipe failed").await;
                    return Err(CommandError::pipe(stream, err));
                }
                Event::Exited(Ok(status)) => break status,
                Event::Exited(Err(err)) => {
                    warn!(error = %err, "Failed to wait for process");
                    self.kill(&mut child, "Wait failed").await;
                    return Err(CommandError::launch(
                        self.command.target_file_path().display().to_string(),
                        err,
                    ));
                }
            }
        };

        let exited_at = Utc::now();
        let exit_code = exit_code(status);

        // Feeding stops once the process is gone; output is drained to the end
        stdin_token.cancel();
        let drained = async {
            tokio::join!(
                finish_pump(stdin_task.take()),
                finish_pump(stdout_task.take()),
                finish_pump(stderr_task.take())
            )
        };
        let (stdin_result, stdout_result, stderr_result) = tokio::select! {
            biased;
            results = drained => results,
            _ = forceful.cancelled() => {
                info!("Run cancelled while draining output");
                return Err(self.cancelled());
            }
        };
        if let Err(err) = stdin_result {
            if !is_benign_stdin_error(&err) {
                warn!(error = %err, "Standard input pipe failed");
                return Err(CommandError::pipe(StandardStream::Input, err));
            }
        }
        stdout_result.map_err(|err| CommandError::pipe(StandardStream::Output, err))?;
        stderr_result.map_err(|err| CommandError::pipe(StandardStream::Error, err))?;

        if interrupted {
            info!(exit_code, "Process exited after cancellation");
            return Err(self.cancelled());
        }

        let result = ExecutionResult {
            exit_code,
            process_id: self.process_id,
            stdout: None,
            stderr: None,
            started_at: self.started_at,
            exited_at,
        };
        debug!(exit_code, run_time = ?result.run_time(), "Process exited");

        validate(&self.command, result, None)
    }

    fn context(&self, token: CancellationToken) -> PipeContext {
        PipeContext::new(
            self.runner.clone(),
            token,
            self.cancellation.graceful_token().clone(),
        )
    }

    fn cancelled(&self) -> CommandError {
        CommandError::Cancelled {
            process_id: Some(self.process_id),
        }
    }

    /// Kill and reap the child
    async fn kill(&self, child: &mut Child, reason: &str) -> CommandError {
        info!(reason, "Killing process");
        if let Err(err) = child.kill().await {
            warn!(error = %err, "Failed to kill process");
        }
        self.cancelled()
    }
}

fn stdio(piped: bool) -> Stdio {
    if piped {
        Stdio::piped()
    } else {
        Stdio::null()
    }
}

fn spawn_drain(target: PipeTarget, source: BoxedReader, context: PipeContext) -> PumpHandle {
    tokio::spawn(async move { target.drain(source, context).await }.in_current_span())
}

/// Resolve once the pump finishes; pending forever when there is none
async fn join_pump(task: &mut Option<PumpHandle>) -> io::Result<()> {
    match task.as_mut() {
        Some(handle) => {
            let joined = handle.await;
            *task = None;
            joined.map_err(join_error)?
        }
        None => std::future::pending().await,
    }
}

async fn finish_pump(task: Option<PumpHandle>) -> io::Result<()> {
    match task {
        Some(handle) => handle.await.map_err(join_error)?,
        None => Ok(()),
    }
}

async fn wait_for(sleep: &mut Option<Pin<Box<Sleep>>>) {
    match sleep {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

/// The child stopped reading, or a nested feeder was stopped because of that
fn is_benign_stdin_error(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::BrokenPipe {
        return true;
    }
    match err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<CommandError>())
    {
        Some(CommandError::Cancelled { .. }) => true,
        Some(CommandError::Pipe { source, .. }) => is_benign_stdin_error(source),
        _ => false,
    }
}

#[cfg(unix)]
fn interrupt(child: &mut Child) -> io::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match child.id() {
        Some(pid) => kill(Pid::from_raw(pid as i32), Signal::SIGINT).map_err(io::Error::from),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn interrupt(child: &mut Child) -> io::Result<()> {
    child.start_kill()
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use conduit_core::{ErrorKind, ValidationPolicy};

    #[test]
    fn test_exit_code_from_signal() {
        use std::os::unix::process::ExitStatusExt;

        assert_eq!(exit_code(ExitStatus::from_raw(0)), 0);
        assert_eq!(exit_code(ExitStatus::from_raw(3 << 8)), 3);
        assert_eq!(exit_code(ExitStatus::from_raw(9)), 137);
    }

    #[test]
    fn test_benign_stdin_errors() {
        assert!(is_benign_stdin_error(&io::Error::from(io::ErrorKind::BrokenPipe)));
        assert!(is_benign_stdin_error(
            &CommandError::Cancelled { process_id: Some(1) }.into_io_error()
        ));
        assert!(is_benign_stdin_error(
            &CommandError::pipe(
                StandardStream::Output,
                io::Error::from(io::ErrorKind::BrokenPipe)
            )
            .into_io_error()
        ));
        assert!(!is_benign_stdin_error(&io::Error::from(io::ErrorKind::NotFound)));
        assert!(!is_benign_stdin_error(
            &CommandError::Validation {
                command: "false".into(),
                exit_code: 1,
                stderr: None,
            }
            .into_io_error()
        ));
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let zero_buffer = ExecutionConfig {
            pipe_buffer_size: 0,
            ..ExecutionConfig::default()
        };
        assert!(ProcessRunner::new(zero_buffer).is_err());

        let zero_capacity = ExecutionConfig {
            event_channel_capacity: 0,
            ..ExecutionConfig::default()
        };
        assert!(ProcessRunner::new(zero_capacity).is_err());

        let runner = ProcessRunner::new(ExecutionConfig::default()).unwrap();
        assert_eq!(runner.config(), &ExecutionConfig::default());
    }

    #[tokio::test]
    async fn test_execute_reports_exit_code() {
        let runner = ProcessRunner::default();
        let command = Command::new("sh")
            .with_arguments(["-c", "exit 5"])
            .with_validation(ValidationPolicy::None);

        let result = runner.execute(&command, ()).await.unwrap();
        assert_eq!(result.exit_code, 5);
        assert!(result.process_id > 0);
        assert!(result.exited_at >= result.started_at);
        assert!(result.stdout.is_none());
    }

    #[tokio::test]
    async fn test_start_exposes_process_id() {
        let running = Command::new("sh")
            .with_arguments(["-c", "exit 0"])
            .start(())
            .unwrap();
        let process_id = running.process_id();

        let result = running.await.unwrap();
        assert_eq!(result.process_id, process_id);
    }

    #[tokio::test]
    async fn test_launch_error_for_missing_target() {
        let err = Command::new("/no/such/program").execute(()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Launch);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();

        let err = Command::new("sh").start(&token).unwrap_err();
        assert!(matches!(err, CommandError::Cancelled { process_id: None }));
    }
}
