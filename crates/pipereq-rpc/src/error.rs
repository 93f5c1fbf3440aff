use std::time::Duration;

/// Errors that can occur while routing requests or waiting for responses.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] pipereq_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] pipereq_frame::FrameError),

    /// A frame payload could not be decoded.
    #[error("decode error: {0}")]
    Codec(#[from] pipereq_frame::CodecError),

    /// The request url has no path component.
    #[error("invalid url: {0:?}")]
    InvalidUrl(String),

    /// A request with this id is already waiting for a response.
    #[error("request id {0} is already in flight")]
    DuplicateRequestId(String),

    /// The operation is not allowed in the current ready state.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// No response arrived before the deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The pipe closed before a response arrived.
    #[error("peer disconnected: {0}")]
    Disconnected(String),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RpcError>;

/// Error type returned by route handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
