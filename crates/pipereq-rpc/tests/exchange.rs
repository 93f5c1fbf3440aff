use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use pipereq_frame::{framed, FrameConfig, Headers, Request, Response};
use pipereq_rpc::{
    Client, ClientConfig, Reply, RouteRequest, Router, RpcError, ServeSummary, Server,
    ServerConfig,
};
use pipereq_transport::Pipe;
use tokio::sync::Barrier;
use tokio::task::JoinHandle;

fn demo_router() -> Router {
    let mut router = Router::new();
    router
        .get("/users/:id", |req: RouteRequest, reply: Reply| async move {
            let id = req.param("id").unwrap_or_default().to_string();
            Ok(reply.json(&serde_json::json!({ "id": id }))?)
        })
        .post("/echo", |req: RouteRequest, reply: Reply| async move {
            let body = req.body().clone();
            Ok(reply.header("Content-Type", "application/octet-stream").body(body))
        })
        .get("/search", |req: RouteRequest, reply: Reply| async move {
            let q = req.query_param("q").unwrap_or_default();
            Ok(reply.text(format!("results for {q}")))
        })
        .get("/teapot", |_req: RouteRequest, reply: Reply| async move {
            Ok(reply.status(418).text("short and stout"))
        })
        .get("/fail", |_req: RouteRequest, _reply: Reply| async move {
            Err("backend unavailable".into())
        });
    router
}

fn start_server(router: Router, pipe: Pipe) -> JoinHandle<pipereq_rpc::Result<ServeSummary>> {
    let server = Server::new(router);
    tokio::spawn(async move { server.serve(pipe).await })
}

#[tokio::test]
async fn client_and_server_over_memory_pipe() {
    let (client_end, server_end) = Pipe::memory_pair(64 * 1024);
    let serving = start_server(demo_router(), server_end);
    let client = Client::new(client_end);

    let user = client
        .fetch("GET", "/users/42", ())
        .await
        .expect("user lookup should succeed");
    assert_eq!(user.status, 200);
    assert_eq!(user.header("content-type"), Some("application/json"));
    let value: serde_json::Value =
        serde_json::from_slice(&user.body).expect("body should be json");
    assert_eq!(value["id"], "42");

    let search = client
        .fetch("GET", "/search?q=rust+pipes", ())
        .await
        .expect("search should succeed");
    assert_eq!(search.body.as_ref(), b"results for rust pipes");

    let missing = client
        .fetch("GET", "/nope", ())
        .await
        .expect("404 is still a response");
    assert_eq!(missing.status, 404);
    assert_eq!(missing.body.as_ref(), b"Not Found");

    let failed = client
        .fetch("GET", "/fail", ())
        .await
        .expect("500 is still a response");
    assert_eq!(failed.status, 500);
    assert_eq!(failed.body.as_ref(), b"Internal Server Error");

    drop(client);
    let summary = serving
        .await
        .expect("server task should not panic")
        .expect("server should stop cleanly");
    assert_eq!(summary.requests, 4);
    assert_eq!(summary.dropped_frames, 0);
}

#[tokio::test]
async fn xhr_request_reports_wire_status() {
    let (client_end, server_end) = Pipe::memory_pair(4096);
    let _serving = start_server(demo_router(), server_end);
    let client = Client::new(client_end);

    let mut xhr = client.request();
    xhr.open("GET", "/teapot").expect("open should succeed");
    xhr.send(()).await.expect("send should succeed");
    xhr.wait().await.expect("response should arrive");

    assert_eq!(xhr.status(), 418);
    assert_eq!(xhr.status_text(), "I'm a teapot");
    assert_eq!(
        xhr.response().expect("text decodes"),
        Some(pipereq_rpc::ResponseBody::Text("short and stout".to_string()))
    );
}

#[tokio::test]
async fn concurrent_requests_are_correlated_by_id() {
    let (client_end, server_end) = Pipe::memory_pair(4096);
    let mut router = Router::new();
    router.get("/delay/:ms", |req: RouteRequest, reply: Reply| async move {
        let ms: u64 = req.param("ms").unwrap_or("0").parse()?;
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(reply.body(ms.to_string()))
    });
    let _serving = start_server(router, server_end);
    let client = Client::new(client_end);

    let mut tasks = Vec::new();
    for ms in [60u64, 5, 30, 0, 45] {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let response = client
                .fetch("GET", &format!("/delay/{ms}"), ())
                .await
                .expect("delayed request should succeed");
            (ms, response)
        }));
    }

    for task in tasks {
        let (ms, response) = task.await.expect("request task should not panic");
        assert_eq!(response.body.as_ref(), ms.to_string().as_bytes());
    }
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test]
async fn unknown_response_id_is_ignored() {
    let (client_end, server_end) = Pipe::memory_pair(4096);
    let client = Client::new(client_end);

    let peer = tokio::spawn(async move {
        let (mut reader, mut writer) = framed::<Request>(server_end, FrameConfig::default());
        let request = reader.read_message().await.expect("request should arrive");
        writer
            .send(&Response::plain("not-a-real-id", 200, "stray"))
            .await
            .expect("stray response should send");
        writer
            .send(&Response::plain(request.id, 200, "real"))
            .await
            .expect("real response should send");
        // keep the pipe open until the client is done
        let _ = reader.read_message().await;
    });

    let response = client
        .fetch("GET", "/anything", ())
        .await
        .expect("matching response should resolve");
    assert_eq!(response.body.as_ref(), b"real");

    client.close();
    drop(client);
    peer.await.expect("peer task should not panic");
}

#[tokio::test]
async fn large_body_survives_backpressure() {
    let (client_end, server_end) = Pipe::memory_pair(512);
    let _serving = start_server(demo_router(), server_end);
    let client = Client::new(client_end);

    let payload: Vec<u8> = (0..256 * 1024).map(|i| (i % 251) as u8).collect();
    let response = client
        .fetch("POST", "/echo", payload.clone())
        .await
        .expect("large echo should succeed");
    assert_eq!(response.body.len(), payload.len());
    assert_eq!(response.body.as_ref(), payload.as_slice());
}

#[tokio::test]
async fn cancelled_fetch_does_not_corrupt_later_requests() {
    let (client_end, server_end) = Pipe::memory_pair(64);
    let client = Client::new(client_end);

    // nobody reads yet, so the write stalls on the full pipe and is abandoned
    let payload = vec![0x5a_u8; 4096];
    let abandoned =
        tokio::time::timeout(Duration::from_millis(20), client.fetch("POST", "/echo", payload))
            .await;
    assert!(abandoned.is_err(), "fetch should still be blocked on the pipe");
    assert_eq!(client.pending_count(), 0);

    let serving = start_server(demo_router(), server_end);

    let user = client
        .fetch("GET", "/users/7", ())
        .await
        .expect("next request should be framed intact");
    assert_eq!(user.status, 200);
    let value: serde_json::Value = serde_json::from_slice(&user.body).expect("json body");
    assert_eq!(value["id"], "7");

    drop(client);
    let summary = serving
        .await
        .expect("server task should not panic")
        .expect("server should stop cleanly");
    // the abandoned echo still arrives whole; its response is ignored
    assert_eq!(summary.requests, 2);
    assert_eq!(summary.dropped_frames, 0);
}

#[tokio::test]
async fn request_times_out_when_handler_is_slow() {
    let (client_end, server_end) = Pipe::memory_pair(4096);
    let gate = Arc::new(Barrier::new(2));
    let mut router = Router::new();
    let handler_gate = Arc::clone(&gate);
    router.get("/stuck", move |_req: RouteRequest, reply: Reply| {
        let gate = Arc::clone(&handler_gate);
        async move {
            gate.wait().await;
            Ok(reply)
        }
    });
    let _serving = start_server(router, server_end);

    let config = ClientConfig {
        request_timeout: Some(Duration::from_millis(40)),
        sweep_interval: Duration::from_millis(5),
        ..ClientConfig::default()
    };
    let client = Client::with_config(client_end, config);

    let err = client
        .fetch("GET", "/stuck", ())
        .await
        .expect_err("request should time out");
    assert!(matches!(err, RpcError::Timeout(_)));

    // late response for the expired id is dropped without disturbing the client
    gate.wait().await;
    let after = client
        .fetch("GET", "/missing", ())
        .await
        .expect("client should stay usable after a timeout");
    assert_eq!(after.status, 404);
}

#[tokio::test]
async fn server_shutdown_disconnects_client() {
    let (client_end, server_end) = Pipe::memory_pair(4096);
    let mut router = Router::new();
    router.get("/never", |_req: RouteRequest, reply: Reply| async move {
        std::future::pending::<()>().await;
        Ok(reply)
    });
    let config = ServerConfig {
        max_in_flight: 1,
        ..ServerConfig::default()
    };
    let server = Server::with_config(router, config);
    let token = tokio_util::sync::CancellationToken::new();
    let stop = token.clone();
    let serving = tokio::spawn(async move { server.serve_until(server_end, stop).await });

    let client = Client::new(client_end);
    let pending = client
        .start("GET", "/never", Bytes::new(), Headers::new())
        .await
        .expect("request should be written");

    // the handler never finishes, so the serve future has to be dropped
    token.cancel();
    serving.abort();

    let err = pending.wait().await.expect_err("pending request should fail");
    assert!(matches!(err, RpcError::Disconnected(_)));
}

#[cfg(unix)]
#[tokio::test]
async fn client_and_server_over_unix_socket() {
    use pipereq_transport::UnixDomainSocket;

    let dir = std::env::temp_dir().join(format!("pipereq-rpc-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    let path = dir.join("exchange.sock");

    let listener = UnixDomainSocket::bind(&path).expect("socket should bind");
    let accepting = tokio::spawn(async move {
        let pipe = listener.accept().await.expect("client should connect");
        Server::new(demo_router()).serve(pipe).await
    });

    let pipe = UnixDomainSocket::connect(&path)
        .await
        .expect("connect should succeed");
    assert_eq!(pipe.kind(), "unix");
    let client = Client::new(pipe);

    let response = client
        .fetch("POST", "/echo", "over a socket")
        .await
        .expect("echo should succeed");
    assert_eq!(response.body.as_ref(), b"over a socket");

    drop(client);
    let summary = accepting
        .await
        .expect("server task should not panic")
        .expect("server should stop cleanly");
    assert_eq!(summary.requests, 1);
    let _ = std::fs::remove_dir_all(&dir);
}
