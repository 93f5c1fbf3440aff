use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite};

/// Readable half of a [`Pipe`].
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Writable half of a [`Pipe`].
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A connected duplex byte pipe.
///
/// The core never assumes how bytes travel. Writes suspend while the pipe
/// cannot accept more data, which is the only backpressure signal the
/// layers above rely on.
pub struct Pipe {
    reader: BoxedReader,
    writer: BoxedWriter,
    kind: &'static str,
}

impl Pipe {
    /// Build a pipe from two independent halves.
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            kind: "custom",
        }
    }

    /// Build a pipe from a single bidirectional stream.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(reader, writer).with_kind("stream")
    }

    /// Create two connected in-process pipe ends.
    ///
    /// Each direction buffers at most `capacity` bytes. A writer that fills
    /// the buffer suspends until the other end reads.
    pub fn memory_pair(capacity: usize) -> (Self, Self) {
        let (left, right) = tokio::io::duplex(capacity.max(1));
        (
            Self::from_stream(left).with_kind("memory"),
            Self::from_stream(right).with_kind("memory"),
        )
    }

    /// A pipe over this process's stdin (read) and stdout (write).
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout()).with_kind("stdio")
    }

    pub(crate) fn with_kind(mut self, kind: &'static str) -> Self {
        self.kind = kind;
        self
    }

    /// Short transport name for diagnostics.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Split into owned read and write halves.
    pub fn into_split(self) -> (BoxedReader, BoxedWriter) {
        (self.reader, self.writer)
    }
}

impl fmt::Debug for Pipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipe").field("kind", &self.kind).finish()
    }
}
