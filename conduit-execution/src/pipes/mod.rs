//! Pipe sources and targets for a child process's standard streams
//!
//! Each direction has one adapter trait ([`SourceAdapter`],
//! [`TargetAdapter`]) with an implementation per variant. Callers build
//! pipes through the factory functions on [`PipeSource`] and
//! [`PipeTarget`]; the runner only ever talks to the trait.
//!
//! Adapters receive an owned handle to the child's stream. When the adapter
//! returns (successfully, with an error, or by panicking) the handle is
//! dropped, which closes the stream.

mod buffer;
mod source;
mod target;

pub use buffer::{ByteBuffer, TextBuffer};
pub use source::{PipeSource, SourceAdapter};
pub use target::{PipeTarget, TargetAdapter};

use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::cancel::Cancellation;
use crate::runner::ProcessRunner;

/// Owned readable end of a pipe
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Owned writable end of a pipe
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A caller-owned input stream shared with the engine
pub type SharedReader = Arc<tokio::sync::Mutex<BoxedReader>>;

/// A caller-owned output stream shared with the engine
pub type SharedWriter = Arc<tokio::sync::Mutex<BoxedWriter>>;

/// Wrap a reader so it can be shared between descriptors and the caller
pub fn shared_reader(reader: impl AsyncRead + Send + Unpin + 'static) -> SharedReader {
    Arc::new(tokio::sync::Mutex::new(Box::new(reader)))
}

/// Wrap a writer so it can be shared between descriptors and the caller
pub fn shared_writer(writer: impl AsyncWrite + Send + Unpin + 'static) -> SharedWriter {
    Arc::new(tokio::sync::Mutex::new(Box::new(writer)))
}

/// Everything an adapter may need while pumping one stream
#[derive(Debug, Clone)]
pub struct PipeContext {
    runner: ProcessRunner,
    token: CancellationToken,
    graceful: CancellationToken,
}

impl PipeContext {
    pub(crate) fn new(
        runner: ProcessRunner,
        token: CancellationToken,
        graceful: CancellationToken,
    ) -> Self {
        Self {
            runner,
            token,
            graceful,
        }
    }

    /// Fires when the run is cancelled, aborted, or no longer needs this stream
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    /// Size of the buffer used for each copy
    pub fn buffer_size(&self) -> usize {
        self.runner.config().pipe_buffer_size
    }

    /// The runner executing this pipe, used to run nested commands
    pub fn runner(&self) -> &ProcessRunner {
        &self.runner
    }

    /// Cancellation signals for a nested run started by this pipe
    pub(crate) fn nested_cancellation(&self) -> Cancellation {
        Cancellation::forceful(self.token.child_token())
            .with_graceful(self.graceful.child_token())
    }
}

/// Copy `reader` into `writer` until end of input or cancellation
///
/// Stops promptly when the token fires, including while blocked on either
/// side. The writer is flushed after the last chunk (and after every chunk
/// when `flush_each` is set) but never shut down.
pub(crate) async fn copy_until_cancelled<R, W>(
    reader: &mut R,
    writer: &mut W,
    context: &PipeContext,
    flush_each: bool,
) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let token = context.cancellation_token();
    let mut buffer = vec![0u8; context.buffer_size()];
    let mut total = 0u64;

    loop {
        let read = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(total),
            read = reader.read(&mut buffer) => read?,
        };
        if read == 0 {
            break;
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(total),
            written = writer.write_all(&buffer[..read]) => written?,
        }
        if flush_each {
            writer.flush().await?;
        }
        total += read as u64;
    }

    writer.flush().await?;
    Ok(total)
}

/// Read `reader` to the end, handing each chunk to `sink`
pub(crate) async fn for_each_chunk<R, F>(
    reader: &mut R,
    context: &PipeContext,
    mut sink: F,
) -> io::Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
    F: FnMut(&[u8]),
{
    let token = context.cancellation_token();
    let mut buffer = vec![0u8; context.buffer_size()];

    loop {
        let read = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(()),
            read = reader.read(&mut buffer) => read?,
        };
        if read == 0 {
            return Ok(());
        }
        sink(&buffer[..read]);
    }
}

/// Convert a failed blocking callback into an I/O error
pub(crate) fn join_error(err: tokio::task::JoinError) -> io::Error {
    if err.is_panic() {
        io::Error::other("pipe callback panicked")
    } else {
        io::Error::other("pipe callback was cancelled")
    }
}
