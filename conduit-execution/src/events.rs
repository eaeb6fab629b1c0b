//! Event streaming for a single run

use conduit_core::{CommandResult, ExecutionResult};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::cancel::Cancellation;
use crate::command::Command;
use crate::pipes::PipeTarget;
use crate::runner::ProcessRunner;

/// Something that happened during a run, in the order it happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandEvent {
    /// The process was spawned; always the first event
    Started { process_id: u32 },

    /// One line of standard output, without its terminator
    StandardOutput(String),

    /// One line of standard error, without its terminator
    StandardError(String),

    /// The process exited and all output was delivered; always the last event
    Exited { exit_code: i32 },
}

/// Events of one run; a failed run ends with an `Err` item instead of `Exited`
pub type EventStream = ReceiverStream<CommandResult<CommandEvent>>;

impl ProcessRunner {
    /// Start `command` and stream its events
    ///
    /// Output lines are decoded with the configured default encoding. The
    /// command's own output targets still receive everything. When the
    /// consumer falls behind by more than the configured channel capacity the
    /// child is slowed down rather than events dropped. Dropping the stream
    /// kills the process.
    ///
    /// Must be called from within a tokio runtime.
    pub fn listen(&self, command: &Command, cancellation: impl Into<Cancellation>) -> EventStream {
        let (sender, receiver) = mpsc::channel(self.config().event_channel_capacity);
        let (started, started_gate) = watch::channel(false);

        let lines = |event: fn(String) -> CommandEvent| {
            let sender = sender.clone();
            let started_gate = started_gate.clone();
            PipeTarget::to_async_line_handler(move |line| {
                let sender = sender.clone();
                let mut started_gate = started_gate.clone();
                async move {
                    // Lines never overtake the Started event
                    let _ = started_gate.wait_for(|started| *started).await;
                    let _ = sender.send(Ok(event(line))).await;
                }
            })
        };
        let listening = command
            .with_standard_output_pipe(PipeTarget::merge([
                command.standard_output_pipe().clone(),
                lines(CommandEvent::StandardOutput),
            ]))
            .with_standard_error_pipe(PipeTarget::merge([
                command.standard_error_pipe().clone(),
                lines(CommandEvent::StandardError),
            ]));

        let running = match self.start(&listening, cancellation) {
            Ok(running) => running,
            Err(err) => {
                let _ = sender.try_send(Err(err));
                return ReceiverStream::new(receiver);
            }
        };

        let _ = sender.try_send(Ok(CommandEvent::Started {
            process_id: running.process_id(),
        }));
        started.send_replace(true);

        tokio::spawn(async move {
            tokio::select! {
                outcome = running.wait() => {
                    let event = outcome.map(|result: ExecutionResult| CommandEvent::Exited {
                        exit_code: result.exit_code,
                    });
                    let _ = sender.send(event).await;
                }
                _ = sender.closed() => debug!("Event stream dropped, stopping command"),
            }
            drop(started);
        });

        ReceiverStream::new(receiver)
    }
}
