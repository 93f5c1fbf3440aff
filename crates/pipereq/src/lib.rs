//! HTTP-style request routing over local pipes.
//!
//! pipereq carries method/url/body requests and status/headers/body
//! responses across any byte pipe (an in-memory duplex, stdio, or a Unix
//! socket) using length-prefixed binary frames.
//!
//! # Crate Structure
//!
//! - [`transport`]: pipes and Unix domain sockets
//! - [`frame`]: request/response structs, framing and frame reassembly
//! - [`rpc`]: router, server loop and client (behind the `rpc` feature)

/// Re-export transport types.
pub mod transport {
    pub use pipereq_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use pipereq_frame::*;
}

/// Re-export routing and client types (requires `rpc` feature).
#[cfg(feature = "rpc")]
pub mod rpc {
    pub use pipereq_rpc::*;
}
