use std::marker::PhantomData;

use bytes::{Buf, BytesMut};
use tracing::{trace, warn};

use crate::codec::{DEFAULT_MAX_PAYLOAD, LENGTH_PREFIX_SIZE};
use crate::message::WireMessage;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Where the reassembler is inside the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReassemblyState {
    /// Waiting for the 4-byte length prefix.
    AwaitingLength,
    /// Length known; waiting for this many payload bytes.
    AwaitingPayload(usize),
    /// Skipping the remaining bytes of an oversized frame.
    Discarding(usize),
}

/// Rebuilds complete frames from byte chunks of any size.
///
/// Chunks may carry a fraction of a frame, exactly one frame, or several
/// frames back to back; every complete payload is decoded as `M` and
/// returned in arrival order.
///
/// A payload that fails to decode is logged and dropped. The length prefix
/// was valid, so the following frames are still aligned and processing
/// continues with them. A payload whose declared length is above the
/// configured maximum is never buffered: its bytes are skipped as they
/// arrive, possibly across many chunks, and reading resumes at the length
/// prefix that follows it.
#[derive(Debug)]
pub struct FrameReassembler<M> {
    buf: BytesMut,
    state: ReassemblyState,
    max_payload: usize,
    dropped: u64,
    _message: PhantomData<fn() -> M>,
}

impl<M: WireMessage> FrameReassembler<M> {
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }

    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            state: ReassemblyState::AwaitingLength,
            max_payload,
            dropped: 0,
            _message: PhantomData,
        }
    }

    /// Feed one chunk; returns every message it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<M> {
        let mut out = Vec::new();
        self.push_with(chunk, |msg| out.push(msg));
        out
    }

    /// Feed one chunk, handing each completed message to `on_message`.
    pub fn push_with(&mut self, chunk: &[u8], mut on_message: impl FnMut(M)) {
        self.buf.extend_from_slice(chunk);

        loop {
            match self.state {
                ReassemblyState::AwaitingLength => {
                    if self.buf.len() < LENGTH_PREFIX_SIZE {
                        return;
                    }
                    let len = self.buf.get_u32_le() as usize;
                    if len > self.max_payload {
                        warn!(
                            len,
                            max = self.max_payload,
                            "frame length exceeds limit; skipping its payload"
                        );
                        self.dropped += 1;
                        self.state = ReassemblyState::Discarding(len);
                        continue;
                    }
                    self.state = ReassemblyState::AwaitingPayload(len);
                }
                ReassemblyState::Discarding(remaining) => {
                    let skip = remaining.min(self.buf.len());
                    self.buf.advance(skip);
                    if skip < remaining {
                        self.state = ReassemblyState::Discarding(remaining - skip);
                        return;
                    }
                    self.state = ReassemblyState::AwaitingLength;
                }
                ReassemblyState::AwaitingPayload(len) => {
                    if self.buf.len() < len {
                        return;
                    }
                    let payload = self.buf.split_to(len);
                    self.state = ReassemblyState::AwaitingLength;
                    match M::decode(&payload) {
                        Ok(msg) => {
                            trace!(id = msg.id(), len, "frame decoded");
                            on_message(msg);
                        }
                        Err(err) => {
                            warn!(error = %err, len, "dropping undecodable frame");
                            self.dropped += 1;
                        }
                    }
                }
            }
        }
    }

    /// Current position in the frame state machine.
    pub fn state(&self) -> ReassemblyState {
        self.state
    }

    /// Bytes received but not yet consumed.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Frames dropped because they could not be decoded or were oversized.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped
    }

    /// True when no partial frame is pending.
    pub fn is_idle(&self) -> bool {
        self.state == ReassemblyState::AwaitingLength && self.buf.is_empty()
    }
}

impl<M: WireMessage> Default for FrameReassembler<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use bytes::{BufMut, Bytes};

    use super::*;
    use crate::codec::{encode_frame, encode_message};
    use crate::message::{Request, Response};

    fn framed<M: WireMessage>(msgs: &[M]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for msg in msgs {
            encode_message(msg, &mut buf, DEFAULT_MAX_PAYLOAD).unwrap();
        }
        buf.to_vec()
    }

    #[test]
    fn one_byte_at_a_time_yields_one_request() {
        let body = Bytes::from_static(b"\x00\x01body");
        let request = Request::new("r-1", "PUT", "/files/a?b=c", body);
        let wire = framed(std::slice::from_ref(&request));

        let mut reassembler = FrameReassembler::<Request>::new();
        let mut decoded = Vec::new();
        for byte in &wire {
            decoded.extend(reassembler.push(std::slice::from_ref(byte)));
        }

        assert_eq!(decoded, vec![request]);
        assert!(reassembler.is_idle());
    }

    #[test]
    fn two_frames_in_one_chunk_yield_two_messages_in_order() {
        let first = Response::plain("a", 200, "first");
        let second = Response::plain("b", 404, "Not Found");
        let wire = framed(&[first.clone(), second.clone()]);

        let mut reassembler = FrameReassembler::<Response>::new();
        assert_eq!(reassembler.push(&wire), vec![first, second]);
    }

    #[test]
    fn frame_split_across_chunk_boundary_inside_prefix() {
        let request = Request::new("r", "GET", "/", Bytes::new());
        let wire = framed(&[request.clone(), request.clone()]);

        let mut reassembler = FrameReassembler::<Request>::new();
        let split = wire.len() / 2 + 2;
        let mut decoded = reassembler.push(&wire[..split]);
        assert_eq!(decoded.len(), 1);
        decoded.extend(reassembler.push(&wire[split..]));
        assert_eq!(decoded, vec![request.clone(), request]);
    }

    #[test]
    fn partial_frame_stays_buffered() {
        let wire = framed(&[Request::new("r", "GET", "/slow", Bytes::new())]);

        let mut reassembler = FrameReassembler::<Request>::new();
        assert!(reassembler.push(&wire[..2]).is_empty());
        assert_eq!(reassembler.state(), ReassemblyState::AwaitingLength);
        assert_eq!(reassembler.buffered_len(), 2);

        assert!(reassembler.push(&wire[2..6]).is_empty());
        assert_eq!(
            reassembler.state(),
            ReassemblyState::AwaitingPayload(wire.len() - LENGTH_PREFIX_SIZE)
        );

        assert_eq!(reassembler.push(&wire[6..]).len(), 1);
    }

    #[test]
    fn corrupt_frame_is_dropped_and_next_frame_survives() {
        let good = Request::new("ok", "GET", "/", Bytes::new());
        let mut wire = BytesMut::new();
        encode_frame(&[0xff, 0xff, 0xff], &mut wire).unwrap();
        encode_message(&good, &mut wire, DEFAULT_MAX_PAYLOAD).unwrap();

        let mut reassembler = FrameReassembler::<Request>::new();
        assert_eq!(reassembler.push(&wire), vec![good]);
        assert_eq!(reassembler.dropped_frames(), 1);
        assert!(reassembler.is_idle());
    }

    #[test]
    fn oversized_frame_is_skipped_across_chunks() {
        let mut head = BytesMut::new();
        head.put_u32_le(1024);
        head.put_slice(b"junk");

        let mut reassembler = FrameReassembler::<Request>::with_max_payload(64);
        assert!(reassembler.push(&head).is_empty());
        assert_eq!(reassembler.dropped_frames(), 1);
        assert_eq!(reassembler.state(), ReassemblyState::Discarding(1020));
        assert_eq!(reassembler.buffered_len(), 0);

        // the rest of the oversized payload must not be read as length prefixes
        assert!(reassembler.push(&[0x01; 600]).is_empty());
        assert_eq!(reassembler.state(), ReassemblyState::Discarding(420));

        let good = Request::new("after", "GET", "/", Bytes::new());
        let mut tail = vec![0x01; 420];
        tail.extend(framed(std::slice::from_ref(&good)));
        assert_eq!(reassembler.push(&tail), vec![good]);
        assert_eq!(reassembler.dropped_frames(), 1);
        assert!(reassembler.is_idle());
    }

    #[test]
    fn empty_chunk_is_harmless() {
        let mut reassembler = FrameReassembler::<Response>::new();
        assert!(reassembler.push(&[]).is_empty());
        assert!(reassembler.is_idle());
    }
}
