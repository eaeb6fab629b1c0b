use async_trait::async_trait;
use bytes::Bytes;
use conduit_core::{CommandError, TextEncoding};
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio_util::io::SyncIoBridge;
use tokio_util::sync::CancellationToken;

use super::target::PipeTarget;
use super::{
    copy_until_cancelled, join_error, shared_reader, BoxedWriter, PipeContext, SharedReader,
};
use crate::command::Command;

/// Feeds bytes into a child's standard input
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Short name used in logs and `Debug` output
    fn kind(&self) -> &'static str;

    /// A null source leaves the child's stdin unconnected
    fn is_null(&self) -> bool {
        false
    }

    /// Write everything into `destination`; dropping it closes the child's stdin
    async fn pump(&self, destination: BoxedWriter, context: PipeContext) -> io::Result<()>;
}

/// Where a child's standard input comes from
#[derive(Clone)]
pub struct PipeSource {
    adapter: Arc<dyn SourceAdapter>,
}

impl PipeSource {
    /// No input; the child sees end of input immediately
    pub fn null() -> Self {
        Self::from_adapter(NullSource)
    }

    /// A custom adapter
    pub fn from_adapter(adapter: impl SourceAdapter + 'static) -> Self {
        Self {
            adapter: Arc::new(adapter),
        }
    }

    /// Bytes written in full, then the stream is closed
    ///
    /// [`Bytes`] is reference counted, so every run of a descriptor shares
    /// the same allocation.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self::from_adapter(BytesSource { data: data.into() })
    }

    /// Static bytes, never copied
    pub fn from_static(data: &'static [u8]) -> Self {
        Self::from_bytes(Bytes::from_static(data))
    }

    /// Text encoded with the runner's default encoding
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::from_adapter(TextSource {
            text: text.into(),
            encoding: None,
        })
    }

    /// Text encoded with an explicit encoding
    pub fn from_text_with_encoding(text: impl Into<String>, encoding: TextEncoding) -> Self {
        Self::from_adapter(TextSource {
            text: text.into(),
            encoding: Some(encoding),
        })
    }

    /// Contents of a file, opened when the run starts
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self::from_adapter(FileSource { path: path.into() })
    }

    /// An open reader; it is consumed by the first run and never closed by the engine
    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self::from_shared_reader(shared_reader(reader))
    }

    /// An open reader the caller keeps a handle to
    pub fn from_shared_reader(reader: SharedReader) -> Self {
        Self::from_adapter(StreamSource { reader })
    }

    /// Standard output of another command, started together with this one
    pub fn from_command(command: Command) -> Self {
        Self::from_adapter(CommandSource { command })
    }

    /// A blocking writer function, run on the blocking thread pool
    pub fn from_callback<F>(handler: F) -> Self
    where
        F: Fn(&mut dyn Write) -> io::Result<()> + Send + Sync + 'static,
    {
        Self::from_adapter(CallbackSource {
            handler: Arc::new(handler),
        })
    }

    /// An async writer function; the token fires when the run is cancelled
    pub fn from_async_callback<F, Fut>(handler: F) -> Self
    where
        F: Fn(BoxedWriter, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = io::Result<()>> + Send + 'static,
    {
        Self::from_adapter(AsyncCallbackSource {
            handler: Arc::new(move |writer, token| Box::pin(handler(writer, token))),
        })
    }

    pub fn kind(&self) -> &'static str {
        self.adapter.kind()
    }

    pub fn is_null(&self) -> bool {
        self.adapter.is_null()
    }

    pub(crate) async fn pump(
        &self,
        destination: BoxedWriter,
        context: PipeContext,
    ) -> io::Result<()> {
        self.adapter.pump(destination, context).await
    }
}

impl Default for PipeSource {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Debug for PipeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PipeSource({})", self.kind())
    }
}

impl From<Bytes> for PipeSource {
    fn from(data: Bytes) -> Self {
        PipeSource::from_bytes(data)
    }
}

impl From<Vec<u8>> for PipeSource {
    fn from(data: Vec<u8>) -> Self {
        PipeSource::from_bytes(data)
    }
}

impl From<String> for PipeSource {
    fn from(text: String) -> Self {
        PipeSource::from_text(text)
    }
}

impl From<&str> for PipeSource {
    fn from(text: &str) -> Self {
        PipeSource::from_text(text)
    }
}

impl From<Command> for PipeSource {
    fn from(command: Command) -> Self {
        PipeSource::from_command(command)
    }
}

async fn write_until_cancelled(
    mut destination: BoxedWriter,
    data: &[u8],
    context: &PipeContext,
) -> io::Result<()> {
    tokio::select! {
        biased;
        _ = context.cancellation_token().cancelled() => return Ok(()),
        written = destination.write_all(data) => written?,
    }
    destination.flush().await
}

struct NullSource;

#[async_trait]
impl SourceAdapter for NullSource {
    fn kind(&self) -> &'static str {
        "null"
    }

    fn is_null(&self) -> bool {
        true
    }

    async fn pump(&self, _destination: BoxedWriter, _context: PipeContext) -> io::Result<()> {
        Ok(())
    }
}

struct BytesSource {
    data: Bytes,
}

#[async_trait]
impl SourceAdapter for BytesSource {
    fn kind(&self) -> &'static str {
        "bytes"
    }

    async fn pump(&self, destination: BoxedWriter, context: PipeContext) -> io::Result<()> {
        write_until_cancelled(destination, &self.data, &context).await
    }
}

struct TextSource {
    text: String,
    encoding: Option<TextEncoding>,
}

#[async_trait]
impl SourceAdapter for TextSource {
    fn kind(&self) -> &'static str {
        "text"
    }

    async fn pump(&self, destination: BoxedWriter, context: PipeContext) -> io::Result<()> {
        let encoding = self
            .encoding
            .unwrap_or(context.runner().config().default_encoding);
        let data = encoding.encode(&self.text);
        write_until_cancelled(destination, &data, &context).await
    }
}

struct FileSource {
    path: PathBuf,
}

#[async_trait]
impl SourceAdapter for FileSource {
    fn kind(&self) -> &'static str {
        "file"
    }

    async fn pump(&self, mut destination: BoxedWriter, context: PipeContext) -> io::Result<()> {
        let mut file = tokio::fs::File::open(&self.path).await.map_err(|e| {
            io::Error::new(e.kind(), format!("cannot open '{}': {}", self.path.display(), e))
        })?;
        copy_until_cancelled(&mut file, &mut destination, &context, false).await?;
        Ok(())
    }
}

struct StreamSource {
    reader: SharedReader,
}

#[async_trait]
impl SourceAdapter for StreamSource {
    fn kind(&self) -> &'static str {
        "stream"
    }

    async fn pump(&self, mut destination: BoxedWriter, context: PipeContext) -> io::Result<()> {
        // Held for the whole copy so concurrent runs never interleave reads
        let mut reader = tokio::select! {
            biased;
            _ = context.cancellation_token().cancelled() => return Ok(()),
            guard = self.reader.lock() => guard,
        };
        copy_until_cancelled(&mut *reader, &mut destination, &context, false).await?;
        Ok(())
    }
}

struct CommandSource {
    command: Command,
}

#[async_trait]
impl SourceAdapter for CommandSource {
    fn kind(&self) -> &'static str {
        "command"
    }

    async fn pump(&self, destination: BoxedWriter, context: PipeContext) -> io::Result<()> {
        // The nested command keeps its own stdout target and also feeds ours
        let stdout = PipeTarget::merge([
            self.command.standard_output_pipe().clone(),
            PipeTarget::forward_to(destination),
        ]);
        let nested = self.command.with_standard_output_pipe(stdout);

        context
            .runner()
            .execute(&nested, context.nested_cancellation())
            .await
            .map(|_| ())
            .map_err(CommandError::into_io_error)
    }
}

type WriteCallback = dyn Fn(&mut dyn Write) -> io::Result<()> + Send + Sync;

struct CallbackSource {
    handler: Arc<WriteCallback>,
}

#[async_trait]
impl SourceAdapter for CallbackSource {
    fn kind(&self) -> &'static str {
        "callback"
    }

    async fn pump(&self, destination: BoxedWriter, context: PipeContext) -> io::Result<()> {
        let handler = Arc::clone(&self.handler);
        let mut bridge = SyncIoBridge::new(destination);
        let task = tokio::task::spawn_blocking(move || {
            handler(&mut bridge)?;
            bridge.flush()
        });

        tokio::select! {
            biased;
            _ = context.cancellation_token().cancelled() => Ok(()),
            joined = task => joined.map_err(join_error)?,
        }
    }
}

type AsyncWriteCallback =
    dyn Fn(BoxedWriter, CancellationToken) -> BoxFuture<'static, io::Result<()>> + Send + Sync;

struct AsyncCallbackSource {
    handler: Arc<AsyncWriteCallback>,
}

#[async_trait]
impl SourceAdapter for AsyncCallbackSource {
    fn kind(&self) -> &'static str {
        "async_callback"
    }

    async fn pump(&self, destination: BoxedWriter, context: PipeContext) -> io::Result<()> {
        (self.handler)(destination, context.cancellation_token().clone()).await
    }
}
