//! Request/response exchange over framed pipes.
//!
//! The serving side registers handlers on a [`Router`] and runs a
//! [`Server`] on a pipe. The requesting side wraps the other end in a
//! [`Client`] and issues requests through [`Client::fetch`] or the
//! browser-style [`XhrRequest`]. Responses are matched to requests by a
//! correlation id, so any number of requests can be in flight at once.

pub mod client;
pub mod error;
pub mod pattern;
pub mod pending;
pub mod router;
pub mod server;

pub use client::{
    reason_phrase, Client, ClientConfig, PendingResponse, ReadyState, RequestBody, ResponseBody,
    Upload, XhrEvent, XhrRequest, DEFAULT_REQUEST_TIMEOUT, DEFAULT_SWEEP_INTERVAL,
};
pub use error::{HandlerError, Result, RpcError};
pub use pattern::{Params, RoutePattern, Segment};
pub use pending::{Outcome, PendingTable};
pub use router::{BoxFuture, Handler, HandlerResult, Reply, RouteRequest, Router};
pub use server::{Responder, ServeSummary, Server, ServerConfig, DEFAULT_MAX_IN_FLIGHT};

pub use pipereq_frame::{Headers, Request, Response};
pub use pipereq_transport::Pipe;
