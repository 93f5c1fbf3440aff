/// Errors raised while decoding a single message struct.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The buffer ended before a field was complete.
    #[error("truncated {field}: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },

    /// A string field did not hold valid UTF-8.
    #[error("field {field} is not valid utf-8")]
    InvalidUtf8 { field: &'static str },

    /// The headers field did not hold a JSON object of strings.
    #[error("invalid headers: {0}")]
    Headers(#[from] serde_json::Error),

    /// Bytes were left over after the last field.
    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),

    /// A declared length does not fit in memory on this platform.
    #[error("declared length {0} overflows usize")]
    LengthOverflow(u64),
}

/// Errors that can occur while framing, reading or writing messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The pipe was closed before a complete frame was received.
    #[error("connection closed")]
    ConnectionClosed,

    /// A write did not complete within the configured timeout.
    #[error("write timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// A complete frame held a malformed message.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

pub type Result<T> = std::result::Result<T, FrameError>;
