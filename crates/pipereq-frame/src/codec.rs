use std::time::Duration;

use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};
use crate::message::WireMessage;

/// Frame header: a single u32 payload length.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Configuration for framing in both directions.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Upper bound on how long a single frame write may stay suspended.
    pub write_timeout: Option<Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            write_timeout: None,
        }
    }
}

/// Frame a raw payload.
///
/// Wire format:
/// ```text
/// ┌──────────────┬─────────────────────────────┐
/// │ Length (4B)  │ Payload (Length bytes)       │
/// │ u32 LE       │ one encoded Request/Response │
/// └──────────────┴─────────────────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: payload.len(),
        max: u32::MAX as usize,
    })?;
    dst.reserve(LENGTH_PREFIX_SIZE + payload.len());
    dst.put_u32_le(len);
    dst.put_slice(payload);
    Ok(())
}

/// Encode a message and its length prefix directly into `dst`.
///
/// On error `dst` is left as it was.
pub fn encode_message<M: WireMessage>(
    msg: &M,
    dst: &mut BytesMut,
    max_payload: usize,
) -> Result<()> {
    let start = dst.len();
    dst.put_u32_le(0);
    msg.encode(dst);

    let size = dst.len() - start - LENGTH_PREFIX_SIZE;
    let limit = max_payload.min(u32::MAX as usize);
    if size > limit {
        dst.truncate(start);
        return Err(FrameError::PayloadTooLarge { size, max: limit });
    }

    dst[start..start + LENGTH_PREFIX_SIZE].copy_from_slice(&(size as u32).to_le_bytes());
    Ok(())
}
