//! Conduit Execution Engine
//!
//! This crate runs external processes described by an immutable
//! [`Command`] and connects their standard streams to pluggable pipe
//! sources and targets. The [`ProcessRunner`] supervises each run on its
//! own tokio task, applies the exit code validation policy and honours
//! forceful and graceful cancellation.

mod blocking;
mod buffered;
pub mod cancel;
pub mod command;
pub mod events;
pub mod pipes;
mod resolve;
pub mod runner;

// Re-export main types
pub use cancel::Cancellation;
pub use command::Command;
pub use events::{CommandEvent, EventStream};
pub use pipes::{
    shared_reader, shared_writer, BoxedReader, BoxedWriter, ByteBuffer, PipeContext, PipeSource,
    PipeTarget, SharedReader, SharedWriter, SourceAdapter, TargetAdapter, TextBuffer,
};
pub use runner::{ProcessRunner, RunningCommand};

// Re-export core types so most callers need a single dependency
pub use conduit_core::{
    Arguments, ArgumentsBuilder, CommandError, CommandResult, EnvironmentVariables,
    EnvironmentVariablesBuilder, ErrorKind, ExecutionResult, StandardStream, TextEncoding,
    ValidationPolicy,
};
pub use tokio_util::sync::CancellationToken;

/// Shorthand for [`Command::new`]
pub fn cmd(target_file_path: impl AsRef<std::path::Path>) -> Command {
    Command::new(target_file_path)
}
