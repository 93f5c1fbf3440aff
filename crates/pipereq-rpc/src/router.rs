//! Method + path routing for decoded requests.
//!
//! Routes are scanned in registration order and the first one whose method
//! (case-insensitively) and pattern both match handles the request. A
//! handler receives the request with its captured params plus a draft
//! [`Reply`] and returns the final reply.

use std::borrow::Cow;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::FutureExt;
use pipereq_frame::{
    CodecError, Headers, Request, Response, WireMessage, DEFAULT_CONTENT_TYPE, DEFAULT_STATUS,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::error::{HandlerError, RpcError};
use crate::pattern::{Params, RoutePattern};

/// Boxed future returned by handlers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a handler produces: the final reply or an error that becomes a 500.
pub type HandlerResult = std::result::Result<Reply, HandlerError>;

/// A route handler.
///
/// Implemented for every `Fn(RouteRequest, Reply) -> impl Future<Output =
/// HandlerResult>`, so async closures and `async fn`s can be registered
/// directly.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, request: RouteRequest, draft: Reply) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> Handler for F
where
    F: Fn(RouteRequest, Reply) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, request: RouteRequest, draft: Reply) -> BoxFuture<'static, HandlerResult> {
        Box::pin(self(request, draft))
    }
}

/// The response a handler builds.
///
/// Starts as a draft with status 200, `Content-Type: text/html` and an
/// empty body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub headers: Headers,
    pub body: Bytes,
}

impl Default for Reply {
    fn default() -> Self {
        let mut headers = Headers::new();
        headers.insert("Content-Type".to_string(), DEFAULT_CONTENT_TYPE.to_string());
        Self {
            status: DEFAULT_STATUS,
            headers,
            body: Bytes::new(),
        }
    }
}

impl Reply {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Set a header, replacing any existing entry with the same name in any case.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|key, _| !key.eq_ignore_ascii_case(&name));
        self.headers.insert(name, value.into());
        self
    }

    /// Replace the body, leaving headers untouched.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Plain-text body with `Content-Type: text/plain`.
    pub fn text(self, body: impl Into<String>) -> Self {
        self.header("Content-Type", "text/plain").body(body.into())
    }

    /// JSON body with `Content-Type: application/json`.
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        Ok(self.header("Content-Type", "application/json").body(body))
    }

    pub fn into_response(self, id: impl Into<String>) -> Response {
        Response {
            id: id.into(),
            body: self.body,
            headers: self.headers,
            status: self.status,
        }
    }
}

/// A request as seen by a handler: the decoded request plus route params.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    request: Request,
    params: Params,
}

impl RouteRequest {
    pub fn new(request: Request, params: Params) -> Self {
        Self { request, params }
    }

    pub fn id(&self) -> &str {
        &self.request.id
    }

    pub fn method(&self) -> &str {
        &self.request.method
    }

    /// The url exactly as sent, query string included.
    pub fn url(&self) -> &str {
        &self.request.url
    }

    pub fn path(&self) -> &str {
        self.request.path()
    }

    pub fn body(&self) -> &Bytes {
        &self.request.body
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.request.body)
    }

    /// Body parsed as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.request.body)
    }

    pub fn headers(&self) -> &Headers {
        &self.request.headers
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Query string pairs in order, form-urlencoded decoded.
    pub fn query(&self) -> Vec<(String, String)> {
        match self.request.query_string() {
            Some(query) => url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// First value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.request.query_string()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    pub fn into_request(self) -> Request {
        self.request
    }
}

struct Route {
    method: String,
    pattern: RoutePattern,
    handler: Box<dyn Handler>,
}

/// Ordered route table.
///
/// Built once, then shared (usually behind an `Arc`) by every task that
/// handles requests.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route. The pattern is compiled here.
    pub fn route<F, Fut>(
        &mut self,
        method: impl Into<String>,
        pattern: &str,
        handler: F,
    ) -> &mut Self
    where
        F: Fn(RouteRequest, Reply) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.add(method.into(), pattern, Box::new(handler))
    }

    pub fn get<F, Fut>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(RouteRequest, Reply) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.route("GET", pattern, handler)
    }

    pub fn put<F, Fut>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(RouteRequest, Reply) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.route("PUT", pattern, handler)
    }

    pub fn post<F, Fut>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(RouteRequest, Reply) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.route("POST", pattern, handler)
    }

    pub fn delete<F, Fut>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(RouteRequest, Reply) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.route("DELETE", pattern, handler)
    }

    /// Append a route backed by a hand-written [`Handler`] implementation.
    pub fn route_handler(
        &mut self,
        method: impl Into<String>,
        pattern: &str,
        handler: impl Handler,
    ) -> &mut Self {
        self.add(method.into(), pattern, Box::new(handler))
    }

    fn add(&mut self, method: String, pattern: &str, handler: Box<dyn Handler>) -> &mut Self {
        self.routes.push(Route {
            method,
            pattern: RoutePattern::parse(pattern),
            handler,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Registered routes as `(method, pattern)` in match order.
    pub fn routes(&self) -> impl Iterator<Item = (&str, &RoutePattern)> {
        self.routes
            .iter()
            .map(|route| (route.method.as_str(), &route.pattern))
    }

    /// Index and captures of the first route matching `method` and `path`.
    pub fn find(&self, method: &str, path: &str) -> Option<(usize, Params)> {
        self.routes.iter().enumerate().find_map(|(index, route)| {
            if !route.method.eq_ignore_ascii_case(method) {
                return None;
            }
            route.pattern.matches(path).map(|params| (index, params))
        })
    }

    /// Route one request and produce its response.
    ///
    /// Never fails: bad urls become 400, missing routes 404, and handler
    /// errors or panics 500.
    pub async fn handle_request(&self, request: Request) -> Response {
        let id = request.id.clone();

        if let Err(err) = check_path(&request) {
            warn!(%id, url = %request.url, error = %err, "rejecting request");
            return Response::plain(id, 400, "Bad Request");
        }

        let Some((index, params)) = self.find(&request.method, request.path()) else {
            debug!(%id, method = %request.method, url = %request.url, "no matching route");
            return Response::plain(id, 404, "Not Found");
        };

        let route = &self.routes[index];
        debug!(
            %id,
            method = %request.method,
            url = %request.url,
            pattern = %route.pattern,
            "dispatching request"
        );

        let route_request = RouteRequest::new(request, params);
        let call = async { route.handler.call(route_request, Reply::new()).await };
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(reply)) => {
                debug!(%id, status = reply.status, len = reply.body.len(), "handler finished");
                reply.into_response(id)
            }
            Ok(Err(err)) => {
                error!(%id, pattern = %route.pattern, error = %err, "route handler failed");
                Response::plain(id, 500, "Internal Server Error")
            }
            Err(panic) => {
                error!(
                    %id,
                    pattern = %route.pattern,
                    panic = panic_message(&panic),
                    "route handler panicked"
                );
                Response::plain(id, 500, "Internal Server Error")
            }
        }
    }

    /// Decode one frame payload as a request and route it.
    pub async fn process_message(&self, raw: &[u8]) -> Result<Response, CodecError> {
        let request = Request::decode(raw)?;
        Ok(self.handle_request(request).await)
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(
                self.routes
                    .iter()
                    .map(|route| format!("{} {}", route.method, route.pattern)),
            )
            .finish()
    }
}

fn check_path(request: &Request) -> Result<(), RpcError> {
    if request.path().is_empty() {
        return Err(RpcError::InvalidUrl(request.url.clone()));
    }
    Ok(())
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}
