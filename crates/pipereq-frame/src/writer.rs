use bytes::{Buf, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::codec::{encode_message, FrameConfig};
use crate::error::{FrameError, Result};
use crate::message::WireMessage;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete frames to any `AsyncWrite` pipe half.
///
/// `send` suspends while the pipe cannot accept more bytes. That suspension
/// is the backpressure wait; it returns once the whole frame is flushed.
///
/// Unwritten bytes live in the writer, not in the `send` future. If a send
/// is cancelled or hits the write timeout partway through a frame, the rest
/// of that frame goes out ahead of the next one, so the peer never sees a
/// torn frame.
pub struct FrameWriter<W> {
    inner: W,
    buf: BytesMut,
    config: FrameConfig,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: W) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: W, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Frame and write one message, after any frame left unfinished.
    pub async fn send<M: WireMessage>(&mut self, msg: &M) -> Result<()> {
        encode_message(msg, &mut self.buf, self.config.max_payload_size)?;

        match self.config.write_timeout {
            Some(limit) => tokio::time::timeout(limit, self.drain())
                .await
                .map_err(|_| FrameError::Timeout(limit))?,
            None => self.drain().await,
        }
    }

    /// Bytes of earlier frames still waiting to be written.
    pub fn unfinished(&self) -> usize {
        self.buf.len()
    }

    /// Shut down the write half of the pipe.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await.map_err(FrameError::Io)
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> W {
        self.inner
    }

    // `write` either writes some bytes or none, so the buffer is only
    // advanced for bytes that actually reached the pipe.
    async fn drain(&mut self) -> Result<()> {
        while !self.buf.is_empty() {
            let written = self.inner.write(&self.buf).await.map_err(write_error)?;
            if written == 0 {
                return Err(FrameError::ConnectionClosed);
            }
            self.buf.advance(written);
        }
        self.inner.flush().await.map_err(write_error)
    }
}

fn write_error(err: std::io::Error) -> FrameError {
    match err.kind() {
        std::io::ErrorKind::WriteZero | std::io::ErrorKind::BrokenPipe => {
            FrameError::ConnectionClosed
        }
        _ => FrameError::Io(err),
    }
}
