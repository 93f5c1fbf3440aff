use std::path::Path;
use std::time::Instant;

use pipereq_rpc::{Reply, RouteRequest, Router, Server, ServerConfig};
use pipereq_transport::{Pipe, UnixDomainSocket};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cmd::{runtime, ServeArgs};
use crate::exit::{io_error, rpc_error, transport_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_routes, OutputFormat};

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let router = demo_router(Instant::now());

    if args.list_routes {
        let routes: Vec<(String, String)> = router
            .routes()
            .map(|(method, pattern)| (method.to_string(), pattern.to_string()))
            .collect();
        print_routes(&routes, format);
        return Ok(SUCCESS);
    }

    if args.max_in_flight == 0 {
        return Err(CliError::new(USAGE, "--max-in-flight must be at least 1"));
    }
    let config = ServerConfig {
        max_in_flight: args.max_in_flight,
        ..ServerConfig::default()
    };

    let server = Server::with_config(router, config);

    if args.stdio {
        return runtime()?.block_on(serve_stdio(server));
    }
    match args.path {
        Some(path) => runtime()?.block_on(serve(&path, server)),
        None => Err(CliError::new(USAGE, "a socket path or --stdio is required")),
    }
}

async fn serve_stdio(server: Server) -> CliResult<i32> {
    info!("serving on stdio");
    let summary = server
        .serve(Pipe::stdio())
        .await
        .map_err(|err| rpc_error("stdio session failed", err))?;
    info!(
        requests = summary.requests,
        dropped_frames = summary.dropped_frames,
        "stdin closed"
    );
    Ok(SUCCESS)
}

async fn serve(path: &Path, server: Server) -> CliResult<i32> {
    let listener =
        UnixDomainSocket::bind(path).map_err(|err| transport_error("bind failed", err))?;
    info!(path = %path.display(), routes = server.router().len(), "listening");

    let shutdown = CancellationToken::new();
    let mut connections = JoinSet::new();
    let mut next_connection = 0u64;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                signal.map_err(|err| io_error("signal handler setup failed", err))?;
                info!("interrupt received; shutting down");
                break;
            }
            accepted = listener.accept() => {
                let pipe = accepted.map_err(|err| transport_error("accept failed", err))?;
                next_connection += 1;
                let connection = next_connection;
                let server = server.clone();
                let token = shutdown.child_token();
                info!(connection, "peer connected");
                connections.spawn(async move {
                    match server.serve_until(pipe, token).await {
                        Ok(summary) => info!(
                            connection,
                            requests = summary.requests,
                            dropped_frames = summary.dropped_frames,
                            "peer disconnected"
                        ),
                        Err(err) => warn!(connection, error = %err, "connection failed"),
                    }
                });
            }
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(err) = joined {
                    warn!(error = %err, "connection task ended abnormally");
                }
            }
        }
    }

    shutdown.cancel();
    while connections.join_next().await.is_some() {}
    Ok(SUCCESS)
}

/// Routes served by `pipereq serve`.
pub fn demo_router(started: Instant) -> Router {
    let mut router = Router::new();
    router
        .get("/health", |_req: RouteRequest, reply: Reply| async move {
            Ok(reply.json(&serde_json::json!({ "status": "ok" }))?)
        })
        .post("/echo", |req: RouteRequest, reply: Reply| async move {
            let body = req.body().clone();
            Ok(reply
                .header("Content-Type", "application/octet-stream")
                .body(body))
        })
        .get("/info", move |_req: RouteRequest, reply: Reply| async move {
            let info = serde_json::json!({
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
                "pid": std::process::id(),
                "uptime_ms": started.elapsed().as_millis() as u64,
            });
            Ok(reply.json(&info)?)
        })
        .get("/hello/:name", |req: RouteRequest, reply: Reply| async move {
            let name = req.param("name").unwrap_or("world").to_string();
            let greeting = req
                .query_param("greeting")
                .unwrap_or_else(|| "Hello".to_string());
            Ok(reply.text(format!("{greeting}, {name}!")))
        });
    router
}
