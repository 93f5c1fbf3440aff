//! Client side of a pipe: sends requests and correlates responses by id.
//!
//! [`Client`] owns the outbound half of the pipe and runs two background
//! tasks, one resolving responses as they arrive and one failing requests
//! whose deadline passed. [`XhrRequest`] wraps a single exchange in the
//! familiar `open` / `send` / `onload` lifecycle.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use pipereq_frame::{
    framed, FrameConfig, FrameError, FrameReader, FrameWriter, Headers, Request, Response,
};
use pipereq_transport::{BoxedReader, BoxedWriter, Pipe};
use tokio::sync::{oneshot, Mutex};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, RpcError};
use crate::pending::{Outcome, PendingTable};

/// Default time a request may wait for its response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default period of the deadline sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(100);

/// Configuration for a [`Client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Deadline applied to every request. `None` waits until the pipe closes.
    pub request_timeout: Option<Duration>,
    /// How often expired requests are failed.
    pub sweep_interval: Duration,
    pub frame: FrameConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            frame: FrameConfig::default(),
        }
    }
}

struct ClientInner {
    pending: Arc<PendingTable>,
    writer: Mutex<FrameWriter<BoxedWriter>>,
    config: ClientConfig,
    shutdown: CancellationToken,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// A handle for issuing requests over one pipe.
///
/// Cheap to clone; all clones share the pipe and the pending table. The
/// background tasks stop when the last clone is dropped, when
/// [`close`](Self::close) is called, or when the peer closes the pipe.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Start a client on `pipe` with default configuration.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(pipe: Pipe) -> Self {
        Self::with_config(pipe, ClientConfig::default())
    }

    /// Start a client on `pipe` with explicit configuration.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_config(pipe: Pipe, config: ClientConfig) -> Self {
        let (reader, writer) = framed::<Response>(pipe, config.frame.clone());
        let pending = Arc::new(PendingTable::new());
        let shutdown = CancellationToken::new();

        tokio::spawn(read_loop(reader, Arc::clone(&pending), shutdown.clone()));
        tokio::spawn(sweep_loop(
            Arc::clone(&pending),
            config.sweep_interval,
            shutdown.clone(),
        ));

        Self {
            inner: Arc::new(ClientInner {
                pending,
                writer: Mutex::new(writer),
                config,
                shutdown,
            }),
        }
    }

    /// A fresh request object bound to this client.
    pub fn request(&self) -> XhrRequest {
        XhrRequest::new(self.clone())
    }

    /// Send one request and wait for its response.
    pub async fn fetch(
        &self,
        method: &str,
        url: &str,
        body: impl Into<RequestBody>,
    ) -> Result<Response> {
        self.start(method, url, body.into().into_bytes(), Headers::new())
            .await?
            .wait()
            .await
    }

    /// Send one request without waiting for the response.
    pub async fn start(
        &self,
        method: &str,
        url: &str,
        body: Bytes,
        headers: Headers,
    ) -> Result<PendingResponse> {
        if self.is_closed() {
            return Err(RpcError::Disconnected("client closed".to_string()));
        }

        let id = Uuid::new_v4().to_string();
        let rx = self
            .inner
            .pending
            .register(id.clone(), self.inner.config.request_timeout)?;
        if self.is_closed() {
            self.inner.pending.remove(&id);
            return Err(RpcError::Disconnected("client closed".to_string()));
        }

        let request = Request::new(id.clone(), method, url, body).with_headers(headers);
        debug!(%id, method, url, len = request.body.len(), "sending request");

        // Unregisters the id if the write fails or this future is dropped.
        let registration = Registration {
            pending: self.inner.pending.as_ref(),
            id: &id,
            armed: true,
        };
        {
            let mut writer = self.inner.writer.lock().await;
            writer.send(&request).await?;
        }
        registration.keep();

        Ok(PendingResponse { id, rx })
    }

    /// Requests sent and not yet settled.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Stop the background tasks and fail every pending request.
    pub fn close(&self) {
        self.inner.shutdown.cancel();
        self.inner.pending.fail_all("client closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("pending", &self.pending_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

struct Registration<'a> {
    pending: &'a PendingTable,
    id: &'a str,
    armed: bool,
}

impl Registration<'_> {
    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.pending.remove(self.id);
        }
    }
}

/// A request on the wire, waiting for its response.
#[derive(Debug)]
pub struct PendingResponse {
    id: String,
    rx: oneshot::Receiver<Outcome>,
}

impl PendingResponse {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn wait(self) -> Result<Response> {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(RpcError::Disconnected("client dropped".to_string())),
        }
    }
}

async fn read_loop(
    mut reader: FrameReader<BoxedReader, Response>,
    pending: Arc<PendingTable>,
    shutdown: CancellationToken,
) {
    let reason = loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break "client closed".to_string(),
            next = reader.read_message() => next,
        };
        match next {
            Ok(response) => {
                debug!(id = %response.id, status = response.status, "response received");
                pending.resolve(response);
            }
            Err(FrameError::ConnectionClosed) => break "pipe closed".to_string(),
            Err(err) => {
                warn!(error = %err, "response stream failed");
                break err.to_string();
            }
        }
    };

    shutdown.cancel();
    pending.fail_all(&reason);
}

async fn sweep_loop(pending: Arc<PendingTable>, every: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(every.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {
                pending.sweep(Instant::now());
            }
        }
    }
}

/// Lifecycle of an [`XhrRequest`]. There is no state 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ReadyState {
    Unsent = 0,
    Opened = 1,
    Loading = 2,
    Done = 4,
}

impl ReadyState {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Anything that can be sent as a request body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RequestBody {
    #[default]
    Empty,
    Bytes(Bytes),
    Text(String),
}

impl RequestBody {
    pub fn into_bytes(self) -> Bytes {
        match self {
            Self::Empty => Bytes::new(),
            Self::Bytes(bytes) => bytes,
            Self::Text(text) => Bytes::from(text),
        }
    }
}

impl From<()> for RequestBody {
    fn from(_: ()) -> Self {
        Self::Empty
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<&[u8]> for RequestBody {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(Bytes::copy_from_slice(bytes))
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<&serde_json::Value> for RequestBody {
    fn from(value: &serde_json::Value) -> Self {
        Self::Text(value.to_string())
    }
}

impl<T: Into<RequestBody>> From<Option<T>> for RequestBody {
    fn from(body: Option<T>) -> Self {
        body.map_or(Self::Empty, Into::into)
    }
}

/// A response payload interpreted by MIME type.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(serde_json::Value),
    Text(String),
    Bytes(Bytes),
}

/// Passed to event listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XhrEvent {
    /// `"load"`, `"error"` or `"timeout"`.
    pub event_type: &'static str,
    pub ready_state: ReadyState,
    pub status: u16,
}

type Listener = Box<dyn FnMut(&XhrEvent) + Send>;

/// Upload progress target. Listeners are stored but never fired.
#[derive(Default)]
pub struct Upload {
    listeners: HashMap<String, Listener>,
}

impl Upload {
    pub fn add_event_listener(
        &mut self,
        event: impl Into<String>,
        callback: impl FnMut(&XhrEvent) + Send + 'static,
    ) {
        self.listeners.insert(event.into(), Box::new(callback));
    }

    pub fn has_listener(&self, event: &str) -> bool {
        self.listeners.contains_key(event)
    }
}

impl fmt::Debug for Upload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upload")
            .field("listeners", &self.listeners.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// One request/response exchange with a browser-style lifecycle.
///
/// ```ignore
/// let mut xhr = client.request();
/// xhr.open("GET", "/users/42")?;
/// xhr.send(()).await?;
/// xhr.wait().await?;
/// assert_eq!(xhr.status(), 200);
/// ```
pub struct XhrRequest {
    client: Client,
    method: Option<String>,
    url: Option<String>,
    mime_type: Option<String>,
    ready_state: ReadyState,
    request_headers: Headers,
    response_headers: Headers,
    response: Option<Bytes>,
    status: u16,
    status_text: &'static str,
    id: Option<String>,
    in_flight: Option<PendingResponse>,
    onload: Option<Box<dyn FnMut() + Send>>,
    listeners: HashMap<String, Listener>,
    pub upload: Upload,
}

impl XhrRequest {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            method: None,
            url: None,
            mime_type: None,
            ready_state: ReadyState::Unsent,
            request_headers: Headers::new(),
            response_headers: Headers::new(),
            response: None,
            status: 0,
            status_text: "",
            id: None,
            in_flight: None,
            onload: None,
            listeners: HashMap::new(),
            upload: Upload::default(),
        }
    }

    /// Set method and url and move to `Opened`.
    ///
    /// Clears any previous response. Not allowed while a request is loading.
    pub fn open(&mut self, method: impl Into<String>, url: impl Into<String>) -> Result<()> {
        if self.ready_state == ReadyState::Loading {
            return Err(RpcError::InvalidState("open() while a request is loading"));
        }
        self.method = Some(method.into());
        self.url = Some(url.into());
        self.response = None;
        self.response_headers.clear();
        self.status = 0;
        self.status_text = "";
        self.id = None;
        self.ready_state = ReadyState::Opened;
        Ok(())
    }

    /// Write the request to the pipe and move to `Loading`.
    ///
    /// Suspends while the pipe applies backpressure. Use [`wait`](Self::wait)
    /// for the response.
    pub async fn send(&mut self, body: impl Into<RequestBody>) -> Result<()> {
        if self.ready_state != ReadyState::Opened {
            return Err(RpcError::InvalidState("send() requires open()"));
        }
        let (Some(method), Some(url)) = (self.method.as_deref(), self.url.as_deref()) else {
            return Err(RpcError::InvalidState("send() requires open()"));
        };

        let pending = self
            .client
            .start(
                method,
                url,
                body.into().into_bytes(),
                self.request_headers.clone(),
            )
            .await?;
        self.id = Some(pending.id().to_string());
        self.in_flight = Some(pending);
        self.ready_state = ReadyState::Loading;
        Ok(())
    }

    /// Wait for the response and move to `Done`.
    ///
    /// Fires `onload` and `load` listeners on success, `timeout` or `error`
    /// listeners on failure.
    pub async fn wait(&mut self) -> Result<()> {
        let Some(pending) = self.in_flight.take() else {
            return Err(RpcError::InvalidState("wait() requires send()"));
        };

        match pending.wait().await {
            Ok(response) => {
                self.ready_state = ReadyState::Done;
                self.status = response.status;
                self.status_text = reason_phrase(response.status);
                self.response_headers = response.headers;
                self.response = Some(response.body);
                if let Some(onload) = self.onload.as_mut() {
                    onload();
                }
                self.dispatch("load");
                Ok(())
            }
            Err(err) => {
                self.ready_state = ReadyState::Done;
                let event = match err {
                    RpcError::Timeout(_) => "timeout",
                    _ => "error",
                };
                self.dispatch(event);
                Err(err)
            }
        }
    }

    pub fn set_request_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.request_headers.insert(name.into(), value.into());
    }

    /// A copy of the response headers.
    pub fn get_all_response_headers(&self) -> Headers {
        self.response_headers.clone()
    }

    /// Case-insensitive response header lookup.
    pub fn get_response_header(&self, name: &str) -> Option<&str> {
        self.response_headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Interpret the response as `mime_type` instead of its Content-Type.
    pub fn override_mime_type(&mut self, mime_type: impl Into<String>) {
        self.mime_type = Some(mime_type.into());
    }

    /// The overridden MIME type, if any.
    pub fn response_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    /// The response payload interpreted by MIME type.
    ///
    /// `application/json` parses to a JSON value, `text/*` decodes to a
    /// string, anything else stays raw bytes. The overridden MIME type wins
    /// over the response Content-Type. `None` until a non-empty response
    /// has arrived.
    pub fn response(&self) -> Result<Option<ResponseBody>> {
        let Some(raw) = self.response.as_ref().filter(|raw| !raw.is_empty()) else {
            return Ok(None);
        };

        let mime = self
            .mime_type
            .as_deref()
            .or_else(|| self.get_response_header("Content-Type"))
            .map(mime_essence)
            .unwrap_or_default();

        let body = if mime == "application/json" || mime.ends_with("+json") {
            ResponseBody::Json(serde_json::from_slice(raw)?)
        } else if mime.starts_with("text/") {
            ResponseBody::Text(String::from_utf8_lossy(raw).into_owned())
        } else {
            ResponseBody::Bytes(raw.clone())
        };
        Ok(Some(body))
    }

    /// The response payload as UTF-8 text, replacing invalid sequences.
    pub fn response_text(&self) -> Option<String> {
        self.response
            .as_ref()
            .map(|raw| String::from_utf8_lossy(raw).into_owned())
    }

    /// Raw response bytes.
    pub fn response_bytes(&self) -> Option<&Bytes> {
        self.response.as_ref()
    }

    /// Called once the response has been stored.
    pub fn set_onload(&mut self, callback: impl FnMut() + Send + 'static) {
        self.onload = Some(Box::new(callback));
    }

    /// Register the listener for `event`, replacing any previous one.
    pub fn add_event_listener(
        &mut self,
        event: impl Into<String>,
        callback: impl FnMut(&XhrEvent) + Send + 'static,
    ) {
        self.listeners.insert(event.into(), Box::new(callback));
    }

    pub fn ready_state(&self) -> ReadyState {
        self.ready_state
    }

    /// Response status, `0` before a response arrives.
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn status_text(&self) -> &str {
        self.status_text
    }

    /// Correlation id minted by the last `send`.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    fn dispatch(&mut self, event_type: &'static str) {
        let event = XhrEvent {
            event_type,
            ready_state: self.ready_state,
            status: self.status,
        };
        if let Some(listener) = self.listeners.get_mut(event_type) {
            listener(&event);
        }
    }
}

impl fmt::Debug for XhrRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XhrRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("ready_state", &self.ready_state)
            .field("status", &self.status)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

fn mime_essence(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Canonical reason phrase for a status code, or `""` for unregistered
/// and out-of-range codes.
pub fn reason_phrase(status: u16) -> &'static str {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("")
}
