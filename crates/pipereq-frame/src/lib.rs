//! Binary request/response structs and length-prefixed framing for pipereq.
//!
//! Every message on a pipe is framed as:
//! - A 4-byte little-endian payload length
//! - One encoded [`Request`] or [`Response`] struct
//!
//! Readers reassemble frames from arbitrary chunk boundaries, so callers
//! never deal with partial reads or buffer management.

pub mod codec;
pub mod encoding;
pub mod error;
pub mod message;
pub mod reader;
pub mod reassembler;
pub mod writer;

pub use codec::{encode_frame, encode_message, FrameConfig, DEFAULT_MAX_PAYLOAD, LENGTH_PREFIX_SIZE};
pub use encoding::Headers;
pub use error::{CodecError, FrameError, Result};
pub use message::{
    decode_request, decode_response, encode_request, encode_response, Request, Response,
    WireMessage, DEFAULT_CONTENT_TYPE, DEFAULT_STATUS,
};
pub use reader::FrameReader;
pub use reassembler::{FrameReassembler, ReassemblyState};
pub use writer::FrameWriter;

use pipereq_transport::{BoxedReader, BoxedWriter, Pipe};

/// Split a pipe into a typed frame reader and a frame writer sharing `config`.
///
/// `In` is the message type expected from the peer: [`Request`] on the
/// serving side, [`Response`] on the client side.
pub fn framed<In: WireMessage>(
    pipe: Pipe,
    config: FrameConfig,
) -> (FrameReader<BoxedReader, In>, FrameWriter<BoxedWriter>) {
    let (reader, writer) = pipe.into_split();
    (
        FrameReader::with_config(reader, config.clone()),
        FrameWriter::with_config(writer, config),
    )
}
