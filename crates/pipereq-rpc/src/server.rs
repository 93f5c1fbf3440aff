use std::sync::Arc;

use pipereq_frame::{framed, FrameConfig, FrameError, FrameWriter, Request, Response};
use pipereq_transport::{BoxedWriter, Pipe};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::router::Router;

/// Default cap on concurrently running handlers per pipe.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 64;

/// Configuration for a [`Server`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Handlers allowed to run at once. `1` processes requests strictly
    /// one after another.
    pub max_in_flight: usize,
    pub frame: FrameConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            frame: FrameConfig::default(),
        }
    }
}

/// Serialized access to the outbound half of a pipe.
///
/// Clones share one writer, so frames from concurrent handlers never
/// interleave.
#[derive(Clone)]
pub struct Responder {
    writer: Arc<Mutex<FrameWriter<BoxedWriter>>>,
}

impl Responder {
    pub fn new(writer: FrameWriter<BoxedWriter>) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    /// Frame and write one response.
    ///
    /// Suspends until the pipe has accepted every byte.
    pub async fn send_response(&self, response: &Response) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.send(response).await?;
        debug!(
            id = %response.id,
            status = response.status,
            len = response.body.len(),
            "response sent"
        );
        Ok(())
    }
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder").finish_non_exhaustive()
    }
}

/// What a finished serve loop did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeSummary {
    /// Requests handed to the router.
    pub requests: u64,
    /// Frames that could not be decoded and were skipped.
    pub dropped_frames: u64,
}

/// Serves one pipe: decodes requests, routes them, writes responses.
#[derive(Debug, Clone)]
pub struct Server {
    router: Arc<Router>,
    config: ServerConfig,
}

impl Server {
    pub fn new(router: Router) -> Self {
        Self::with_config(router, ServerConfig::default())
    }

    pub fn with_config(router: Router, config: ServerConfig) -> Self {
        Self {
            router: Arc::new(router),
            config,
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Serve until the peer closes the pipe.
    pub async fn serve(&self, pipe: Pipe) -> Result<ServeSummary> {
        self.serve_until(pipe, CancellationToken::new()).await
    }

    /// Serve until the peer closes the pipe or `shutdown` is cancelled.
    ///
    /// Requests are decoded and dispatched in arrival order. Handlers run
    /// concurrently up to `max_in_flight`; their responses go out as they
    /// finish. Returns after every dispatched handler has responded.
    pub async fn serve_until(
        &self,
        pipe: Pipe,
        shutdown: CancellationToken,
    ) -> Result<ServeSummary> {
        let kind = pipe.kind();
        let (mut reader, writer) = framed::<Request>(pipe, self.config.frame.clone());
        let responder = Responder::new(writer);
        let permits = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));
        let mut tasks = JoinSet::new();
        let mut summary = ServeSummary::default();

        info!(transport = kind, routes = self.router.len(), "serving pipe");

        let outcome = loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => break Ok(()),
                next = reader.read_message() => next,
            };

            while let Some(joined) = tasks.try_join_next() {
                log_join(joined);
            }

            let request = match next {
                Ok(request) => request,
                Err(FrameError::ConnectionClosed) => break Ok(()),
                Err(err) => break Err(err),
            };

            let permit = tokio::select! {
                _ = shutdown.cancelled() => break Ok(()),
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break Ok(()),
                },
            };

            summary.requests += 1;
            let router = Arc::clone(&self.router);
            let responder = responder.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let id = request.id.clone();
                let response = router.handle_request(request).await;
                if let Err(err) = responder.send_response(&response).await {
                    warn!(%id, error = %err, "failed to send response");
                }
            });
        };

        while let Some(joined) = tasks.join_next().await {
            log_join(joined);
        }
        summary.dropped_frames = reader.dropped_frames();

        match outcome {
            Ok(()) => {
                info!(
                    requests = summary.requests,
                    dropped_frames = summary.dropped_frames,
                    "pipe closed"
                );
                Ok(summary)
            }
            Err(err) => Err(err.into()),
        }
    }
}

fn log_join(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(err) = joined {
        warn!(error = %err, "request task ended abnormally");
    }
}
