use std::path::PathBuf;

/// Errors raised while opening or accepting a pipe.
///
/// Once a [`Pipe`](crate::Pipe) exists its halves report plain
/// `std::io::Error`; the frame layer decides what those mean.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The listening socket could not be created at `path`.
    #[error("cannot listen on {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Nothing accepted a connection at `path`.
    #[error("cannot connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("accept failed: {0}")]
    Accept(std::io::Error),

    /// `path` does not fit in `sockaddr_un.sun_path` with its NUL terminator.
    #[error("socket path is {len} bytes, at most {max} fit: {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },
}

pub type Result<T> = std::result::Result<T, TransportError>;
