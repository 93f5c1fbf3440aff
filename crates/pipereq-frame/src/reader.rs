use std::collections::VecDeque;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::codec::FrameConfig;
use crate::error::{FrameError, Result};
use crate::message::WireMessage;
use crate::reassembler::FrameReassembler;

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete messages from any `AsyncRead` pipe half.
///
/// Handles partial reads internally; callers always get whole messages.
/// Undecodable frames are logged and skipped by the reassembler.
/// `read_message` is cancel-safe: no bytes are lost if the future is dropped.
pub struct FrameReader<R, M> {
    inner: R,
    reassembler: FrameReassembler<M>,
    ready: VecDeque<M>,
    chunk: Vec<u8>,
    config: FrameConfig,
}

impl<R: AsyncRead + Unpin, M: WireMessage> FrameReader<R, M> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: R, config: FrameConfig) -> Self {
        Self {
            inner,
            reassembler: FrameReassembler::with_max_payload(config.max_payload_size),
            ready: VecDeque::new(),
            chunk: vec![0u8; READ_CHUNK_SIZE],
            config,
        }
    }

    /// Read the next complete message.
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` at end of stream.
    pub async fn read_message(&mut self) -> Result<M> {
        loop {
            if let Some(msg) = self.ready.pop_front() {
                return Ok(msg);
            }

            let read = match self.inner.read(&mut self.chunk).await {
                Ok(n) => n,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                if !self.reassembler.is_idle() {
                    tracing::debug!(
                        buffered = self.reassembler.buffered_len(),
                        "pipe closed mid-frame"
                    );
                }
                return Err(FrameError::ConnectionClosed);
            }

            let ready = &mut self.ready;
            self.reassembler
                .push_with(&self.chunk[..read], |msg| ready.push_back(msg));
        }
    }

    /// Frames dropped so far by the underlying reassembler.
    pub fn dropped_frames(&self) -> u64 {
        self.reassembler.dropped_frames()
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use bytes::{BufMut, Bytes, BytesMut};
    use tokio::io::ReadBuf;

    use super::*;
    use crate::codec::{encode_message, DEFAULT_MAX_PAYLOAD};
    use crate::message::{Request, Response};

    fn wire<M: WireMessage>(msgs: &[M]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for msg in msgs {
            encode_message(msg, &mut buf, DEFAULT_MAX_PAYLOAD).unwrap();
        }
        buf.to_vec()
    }

    #[tokio::test]
    async fn read_single_message() {
        let request = Request::new("1", "GET", "/hello", Bytes::new());
        let mut reader = FrameReader::<_, Request>::new(Cursor::new(wire(&[request.clone()])));

        assert_eq!(reader.read_message().await.unwrap(), request);
    }

    #[tokio::test]
    async fn read_multiple_messages() {
        let msgs = vec![
            Response::plain("1", 200, "one"),
            Response::plain("2", 200, "two"),
            Response::plain("3", 500, "three"),
        ];
        let mut reader = FrameReader::<_, Response>::new(Cursor::new(wire(&msgs)));

        for expected in msgs {
            assert_eq!(reader.read_message().await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn byte_by_byte_reader() {
        let request = Request::new("slow", "POST", "/p", Bytes::from_static(b"data"));
        let source = ByteByByteReader {
            bytes: wire(&[request.clone()]),
            pos: 0,
        };
        let mut reader = FrameReader::<_, Request>::new(source);

        assert_eq!(reader.read_message().await.unwrap(), request);
    }

    #[tokio::test]
    async fn read_large_payload() {
        let body = vec![0xAB; 64 * 1024];
        let request = Request::new("big", "PUT", "/blob", body.clone());
        let mut reader = FrameReader::<_, Request>::new(Cursor::new(wire(&[request])));

        let decoded = reader.read_message().await.unwrap();
        assert_eq!(decoded.body.as_ref(), body.as_slice());
    }

    #[tokio::test]
    async fn connection_closed_cleanly() {
        let mut reader = FrameReader::<_, Request>::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_message().await.unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[tokio::test]
    async fn connection_closed_mid_frame() {
        let mut partial = BytesMut::new();
        partial.put_u32_le(16);
        partial.put_slice(b"only-part");

        let mut reader = FrameReader::<_, Request>::new(Cursor::new(partial.to_vec()));
        let err = reader.read_message().await.unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[tokio::test]
    async fn corrupt_frame_is_skipped() {
        let good = Request::new("ok", "GET", "/", Bytes::new());
        let mut bytes = BytesMut::new();
        bytes.put_u32_le(2);
        bytes.put_slice(&[0xfe, 0x01]);
        bytes.extend_from_slice(&wire(&[good.clone()]));

        let mut reader = FrameReader::<_, Request>::new(Cursor::new(bytes.to_vec()));
        assert_eq!(reader.read_message().await.unwrap(), good);
        assert_eq!(reader.dropped_frames(), 1);
    }

    #[tokio::test]
    async fn roundtrip_over_memory_pipe() {
        let (left, right) = pipereq_transport::Pipe::memory_pair(32);
        let (_left_rx, left_tx) = left.into_split();
        let (right_rx, _right_tx) = right.into_split();

        let mut writer = crate::writer::FrameWriter::new(left_tx);
        let mut reader = FrameReader::<_, Request>::new(right_rx);

        let request = Request::new("p", "GET", "/ping", vec![1u8; 100]);
        let expected = request.clone();
        let sender = tokio::spawn(async move {
            writer.send(&request).await.unwrap();
        });

        assert_eq!(reader.read_message().await.unwrap(), expected);
        sender.await.unwrap();
    }

    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl AsyncRead for ByteByByteReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            if self.pos < self.bytes.len() && buf.remaining() > 0 {
                let byte = self.bytes[self.pos];
                buf.put_slice(&[byte]);
                self.pos += 1;
            }
            Poll::Ready(Ok(()))
        }
    }
}
