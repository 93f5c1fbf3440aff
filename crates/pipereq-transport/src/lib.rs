//! Duplex byte pipe abstraction.
//!
//! Everything above this crate talks to a [`Pipe`]: a readable half and a
//! writable half of one ordered, bidirectional byte channel. Where the bytes
//! actually travel is decided here:
//! - in-process memory pair (bounded, with real backpressure)
//! - stdin/stdout of the current process
//! - Unix domain sockets (Linux/macOS)
//!
//! This is the lowest layer of pipereq.

pub mod error;
pub mod pipe;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use pipe::{BoxedReader, BoxedWriter, Pipe};

#[cfg(unix)]
pub use uds::UnixDomainSocket;
