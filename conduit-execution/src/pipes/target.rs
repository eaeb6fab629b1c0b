use async_trait::async_trait;
use conduit_core::{TextDecoder, TextEncoding};
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::io::SyncIoBridge;
use tokio_util::sync::CancellationToken;

use super::buffer::{ByteBuffer, TextBuffer};
use super::{
    copy_until_cancelled, for_each_chunk, join_error, shared_writer, BoxedReader, BoxedWriter,
    PipeContext, SharedWriter,
};

/// Consumes bytes from a child's standard output or standard error
#[async_trait]
pub trait TargetAdapter: Send + Sync {
    /// Short name used in logs and `Debug` output
    fn kind(&self) -> &'static str;

    /// A null target leaves the stream unconnected
    fn is_null(&self) -> bool {
        false
    }

    /// Read `source` until end of input or cancellation
    async fn drain(&self, source: BoxedReader, context: PipeContext) -> io::Result<()>;
}

/// Where a child's standard output or standard error goes
#[derive(Clone)]
pub struct PipeTarget {
    adapter: Arc<dyn TargetAdapter>,
}

impl PipeTarget {
    /// Discard everything
    pub fn null() -> Self {
        Self::from_adapter(NullTarget)
    }

    /// A custom adapter
    pub fn from_adapter(adapter: impl TargetAdapter + 'static) -> Self {
        Self {
            adapter: Arc::new(adapter),
        }
    }

    /// Create or truncate a file and write everything to it
    pub fn to_file(path: impl Into<PathBuf>) -> Self {
        Self::from_adapter(FileTarget { path: path.into() })
    }

    /// An open writer; the engine flushes it but never closes it
    pub fn to_writer(writer: impl AsyncWrite + Send + Unpin + 'static, flush_each: bool) -> Self {
        Self::to_shared_writer(shared_writer(writer), flush_each)
    }

    /// An open writer the caller keeps a handle to
    pub fn to_shared_writer(writer: SharedWriter, flush_each: bool) -> Self {
        Self::from_adapter(StreamTarget { writer, flush_each })
    }

    /// Decode with the runner's default encoding and append to `buffer`
    pub fn to_text(buffer: &TextBuffer) -> Self {
        Self::from_adapter(TextTarget {
            buffer: buffer.clone(),
            encoding: None,
        })
    }

    pub fn to_text_with_encoding(buffer: &TextBuffer, encoding: TextEncoding) -> Self {
        Self::from_adapter(TextTarget {
            buffer: buffer.clone(),
            encoding: Some(encoding),
        })
    }

    /// Append raw bytes to `buffer`
    pub fn to_bytes(buffer: &ByteBuffer) -> Self {
        Self::from_adapter(BytesTarget {
            buffer: buffer.clone(),
        })
    }

    /// Call `handler` once per line, without the line terminator
    ///
    /// `\n` ends a line and a trailing `\r` is stripped. Output that does not
    /// end with a newline is delivered as a final line.
    pub fn to_line_handler<F>(handler: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self::from_adapter(LinesTarget {
            handler: LineHandler::Sync(Arc::new(handler)),
            encoding: None,
        })
    }

    pub fn to_line_handler_with_encoding<F>(handler: F, encoding: TextEncoding) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self::from_adapter(LinesTarget {
            handler: LineHandler::Sync(Arc::new(handler)),
            encoding: Some(encoding),
        })
    }

    /// Await `handler` once per line; the next line is not read until it completes
    pub fn to_async_line_handler<F, Fut>(handler: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::from_adapter(LinesTarget {
            handler: LineHandler::Async(Arc::new(move |line| Box::pin(handler(line)))),
            encoding: None,
        })
    }

    /// A blocking reader function, run on the blocking thread pool
    pub fn to_callback<F>(handler: F) -> Self
    where
        F: Fn(&mut dyn Read) -> io::Result<()> + Send + Sync + 'static,
    {
        Self::from_adapter(CallbackTarget {
            handler: Arc::new(handler),
        })
    }

    /// An async reader function; the token fires when the run is cancelled
    pub fn to_async_callback<F, Fut>(handler: F) -> Self
    where
        F: Fn(BoxedReader, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = io::Result<()>> + Send + 'static,
    {
        Self::from_adapter(AsyncCallbackTarget {
            handler: Arc::new(move |reader, token| Box::pin(handler(reader, token))),
        })
    }

    /// Copy the stream to every target
    ///
    /// Null targets are skipped. A branch that stops reading early is
    /// dropped from the fan-out without stalling the others.
    pub fn merge(targets: impl IntoIterator<Item = PipeTarget>) -> Self {
        let mut targets: Vec<PipeTarget> = targets.into_iter().filter(|t| !t.is_null()).collect();
        match targets.len() {
            0 => Self::null(),
            1 => targets.remove(0),
            _ => Self::from_adapter(MergeTarget { targets }),
        }
    }

    /// Write into a pipe owned by another run; usable once
    pub(crate) fn forward_to(writer: BoxedWriter) -> Self {
        Self::from_adapter(ForwardTarget {
            writer: parking_lot::Mutex::new(Some(writer)),
        })
    }

    pub fn kind(&self) -> &'static str {
        self.adapter.kind()
    }

    pub fn is_null(&self) -> bool {
        self.adapter.is_null()
    }

    pub(crate) async fn drain(&self, source: BoxedReader, context: PipeContext) -> io::Result<()> {
        self.adapter.drain(source, context).await
    }
}

impl Default for PipeTarget {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Debug for PipeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PipeTarget({})", self.kind())
    }
}

impl From<&TextBuffer> for PipeTarget {
    fn from(buffer: &TextBuffer) -> Self {
        PipeTarget::to_text(buffer)
    }
}

impl From<&ByteBuffer> for PipeTarget {
    fn from(buffer: &ByteBuffer) -> Self {
        PipeTarget::to_bytes(buffer)
    }
}

struct NullTarget;

#[async_trait]
impl TargetAdapter for NullTarget {
    fn kind(&self) -> &'static str {
        "null"
    }

    fn is_null(&self) -> bool {
        true
    }

    async fn drain(&self, mut source: BoxedReader, context: PipeContext) -> io::Result<()> {
        for_each_chunk(&mut source, &context, |_| {}).await
    }
}

struct FileTarget {
    path: PathBuf,
}

#[async_trait]
impl TargetAdapter for FileTarget {
    fn kind(&self) -> &'static str {
        "file"
    }

    async fn drain(&self, mut source: BoxedReader, context: PipeContext) -> io::Result<()> {
        let mut file = tokio::fs::File::create(&self.path).await.map_err(|e| {
            io::Error::new(e.kind(), format!("cannot create '{}': {}", self.path.display(), e))
        })?;
        copy_until_cancelled(&mut source, &mut file, &context, false).await?;
        Ok(())
    }
}

struct StreamTarget {
    writer: SharedWriter,
    flush_each: bool,
}

#[async_trait]
impl TargetAdapter for StreamTarget {
    fn kind(&self) -> &'static str {
        "stream"
    }

    async fn drain(&self, mut source: BoxedReader, context: PipeContext) -> io::Result<()> {
        let mut writer = tokio::select! {
            biased;
            _ = context.cancellation_token().cancelled() => return Ok(()),
            guard = self.writer.lock() => guard,
        };
        copy_until_cancelled(&mut source, &mut *writer, &context, self.flush_each).await?;
        Ok(())
    }
}

struct TextTarget {
    buffer: TextBuffer,
    encoding: Option<TextEncoding>,
}

#[async_trait]
impl TargetAdapter for TextTarget {
    fn kind(&self) -> &'static str {
        "text"
    }

    async fn drain(&self, mut source: BoxedReader, context: PipeContext) -> io::Result<()> {
        let encoding = self
            .encoding
            .unwrap_or(context.runner().config().default_encoding);
        let mut decoder = encoding.decoder();

        for_each_chunk(&mut source, &context, |chunk| {
            self.buffer.push_str(&decoder.decode(chunk));
        })
        .await?;

        self.buffer.push_str(&decoder.finish());
        Ok(())
    }
}

struct BytesTarget {
    buffer: ByteBuffer,
}

#[async_trait]
impl TargetAdapter for BytesTarget {
    fn kind(&self) -> &'static str {
        "bytes"
    }

    async fn drain(&self, mut source: BoxedReader, context: PipeContext) -> io::Result<()> {
        for_each_chunk(&mut source, &context, |chunk| {
            self.buffer.extend_from_slice(chunk);
        })
        .await
    }
}

/// Incremental decoder that yields complete lines
pub(crate) struct LineSplitter {
    decoder: TextDecoder,
    partial: String,
}

impl LineSplitter {
    pub(crate) fn new(encoding: TextEncoding) -> Self {
        Self {
            decoder: encoding.decoder(),
            partial: String::new(),
        }
    }

    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let text = self.decoder.decode(chunk);
        self.partial.push_str(&text);

        let mut lines = Vec::new();
        while let Some(end) = self.partial.find('\n') {
            let mut line: String = self.partial.drain(..=end).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            lines.push(line);
        }
        lines
    }

    /// The unterminated final line, if any
    pub(crate) fn finish(mut self) -> Option<String> {
        let rest = self.decoder.finish();
        self.partial.push_str(&rest);
        if self.partial.ends_with('\r') {
            self.partial.pop();
        }
        (!self.partial.is_empty()).then_some(self.partial)
    }
}

type SyncLineHandler = dyn Fn(&str) + Send + Sync;
type AsyncLineHandler = dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync;

enum LineHandler {
    Sync(Arc<SyncLineHandler>),
    Async(Arc<AsyncLineHandler>),
}

impl LineHandler {
    async fn deliver(&self, line: String) {
        match self {
            LineHandler::Sync(handler) => handler(&line),
            LineHandler::Async(handler) => handler(line).await,
        }
    }
}

struct LinesTarget {
    handler: LineHandler,
    encoding: Option<TextEncoding>,
}

#[async_trait]
impl TargetAdapter for LinesTarget {
    fn kind(&self) -> &'static str {
        "lines"
    }

    async fn drain(&self, mut source: BoxedReader, context: PipeContext) -> io::Result<()> {
        let encoding = self
            .encoding
            .unwrap_or(context.runner().config().default_encoding);
        let mut splitter = LineSplitter::new(encoding);
        let token = context.cancellation_token();
        let mut buffer = vec![0u8; context.buffer_size()];

        loop {
            let read = tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(()),
                read = source.read(&mut buffer) => read?,
            };
            if read == 0 {
                break;
            }
            for line in splitter.push(&buffer[..read]) {
                self.handler.deliver(line).await;
            }
        }

        if let Some(line) = splitter.finish() {
            self.handler.deliver(line).await;
        }
        Ok(())
    }
}

type ReadCallback = dyn Fn(&mut dyn Read) -> io::Result<()> + Send + Sync;

struct CallbackTarget {
    handler: Arc<ReadCallback>,
}

#[async_trait]
impl TargetAdapter for CallbackTarget {
    fn kind(&self) -> &'static str {
        "callback"
    }

    async fn drain(&self, source: BoxedReader, context: PipeContext) -> io::Result<()> {
        let handler = Arc::clone(&self.handler);
        let mut bridge = SyncIoBridge::new(source);
        let task = tokio::task::spawn_blocking(move || handler(&mut bridge));

        tokio::select! {
            biased;
            _ = context.cancellation_token().cancelled() => Ok(()),
            joined = task => joined.map_err(join_error)?,
        }
    }
}

type AsyncReadCallback =
    dyn Fn(BoxedReader, CancellationToken) -> BoxFuture<'static, io::Result<()>> + Send + Sync;

struct AsyncCallbackTarget {
    handler: Arc<AsyncReadCallback>,
}

#[async_trait]
impl TargetAdapter for AsyncCallbackTarget {
    fn kind(&self) -> &'static str {
        "async_callback"
    }

    async fn drain(&self, source: BoxedReader, context: PipeContext) -> io::Result<()> {
        (self.handler)(source, context.cancellation_token().clone()).await
    }
}

struct MergeTarget {
    targets: Vec<PipeTarget>,
}

#[async_trait]
impl TargetAdapter for MergeTarget {
    fn kind(&self) -> &'static str {
        "merge"
    }

    async fn drain(&self, mut source: BoxedReader, context: PipeContext) -> io::Result<()> {
        let mut branches = Vec::with_capacity(self.targets.len());
        let mut drains = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            let (writer, reader) = tokio::io::duplex(context.buffer_size());
            branches.push(Some(writer));
            drains.push(target.drain(Box::new(reader), context.clone()));
        }

        let token = context.cancellation_token().clone();
        let buffer_size = context.buffer_size();
        let fan_out = async move {
            let mut buffer = vec![0u8; buffer_size];
            loop {
                let read = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    read = source.read(&mut buffer) => read?,
                };
                if read == 0 {
                    break;
                }
                for slot in branches.iter_mut() {
                    let Some(writer) = slot else { continue };
                    let written = tokio::select! {
                        biased;
                        _ = token.cancelled() => return Ok(()),
                        written = writer.write_all(&buffer[..read]) => written,
                    };
                    // The branch's own drain result reports why it stopped reading
                    if written.is_err() {
                        *slot = None;
                    }
                }
            }
            // Dropping the writers signals end of input to every branch
            drop(branches);
            Ok::<(), io::Error>(())
        };

        tokio::try_join!(fan_out, futures::future::try_join_all(drains))?;
        Ok(())
    }
}

struct ForwardTarget {
    writer: parking_lot::Mutex<Option<BoxedWriter>>,
}

#[async_trait]
impl TargetAdapter for ForwardTarget {
    fn kind(&self) -> &'static str {
        "forward"
    }

    async fn drain(&self, mut source: BoxedReader, context: PipeContext) -> io::Result<()> {
        let taken = self.writer.lock().take();
        let Some(mut writer) = taken else {
            return Err(io::Error::other("forwarding pipe was already used"));
        };
        copy_until_cancelled(&mut source, &mut writer, &context, false).await?;
        Ok(())
    }
}
