//! Serving over a real listener: lifecycle order, transport close and
//! shutdown teardown.

use std::sync::Arc;
use std::time::Duration;

use bitbeat_config::BitbeatConfig;
use bitbeat_core::{ActionDefinition, BoxFuture, FnAction};
use bitbeat_server::{
    Connection, ConnectionMiddleware, HookResult, Lifecycle, ShutdownSignal, WebServer,
};
use http::Method;
use parking_lot::Mutex;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

type Log = Arc<Mutex<Vec<String>>>;

struct Recorder(Log);

impl Recorder {
    fn push(&self, entry: &str) {
        self.0.lock().push(entry.to_string());
    }
}

impl ConnectionMiddleware for Recorder {
    fn name(&self) -> &'static str {
        "recorder"
    }

    fn before_create<'a>(&'a self, _c: &'a Connection) -> BoxFuture<'a, HookResult> {
        Box::pin(async move {
            self.push("before_create");
            Ok(())
        })
    }

    fn after_create<'a>(&'a self, _c: &'a Connection) -> BoxFuture<'a, HookResult> {
        Box::pin(async move {
            self.push("after_create");
            Ok(())
        })
    }

    fn before_destroy<'a>(&'a self, _c: &'a Connection) -> BoxFuture<'a, HookResult> {
        Box::pin(async move {
            self.push("before_destroy");
            Ok(())
        })
    }

    fn after_destroy<'a>(&'a self, _c: &'a Connection) -> BoxFuture<'a, HookResult> {
        Box::pin(async move {
            self.push("after_destroy");
            Ok(())
        })
    }
}

fn server(log: &Log) -> WebServer {
    let (started, stopped) = (Arc::clone(log), Arc::clone(log));
    let lifecycle = Lifecycle::new()
        .on_post_start(move |_| {
            let log = Arc::clone(&started);
            async move {
                log.lock().push("post_start".to_string());
                Ok(())
            }
        })
        .on_post_stop(move |_| {
            let log = Arc::clone(&stopped);
            async move {
                log.lock().push("post_stop".to_string());
                Ok(())
            }
        });

    let mut config = BitbeatConfig::default();
    config.server.shutdown_timeout_secs = 5;

    WebServer::builder()
        .config(config)
        .action(FnAction::from_sync(
            ActionDefinition::builder("ping").methods([Method::GET]).build(),
            |_| Ok(Some(json!({"pong": true}))),
        ))
        .connection_middleware(Recorder(Arc::clone(log)))
        .lifecycle(lifecycle)
        .build()
}

async fn get(stream: &mut TcpStream, path: &str) -> String {
    let request = format!("GET {path} HTTP/1.1\r\nhost: localhost\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut received = Vec::new();
    let mut chunk = [0u8; 1024];
    tokio::time::timeout(Duration::from_secs(5), async {
        while !String::from_utf8_lossy(&received).contains("}") {
            let read = stream.read(&mut chunk).await.unwrap();
            assert!(read > 0, "server closed the transport early");
            received.extend_from_slice(&chunk[..read]);
        }
    })
    .await
    .unwrap();
    String::from_utf8(received).unwrap()
}

async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn shutdown_tears_down_connections_before_post_stop() {
    let log: Log = Arc::default();
    let prepared = server(&log).prepare().unwrap();
    let connections = Arc::clone(prepared.connections());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = ShutdownSignal::new();
    let serving = tokio::spawn(prepared.serve(listener, shutdown.clone()));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let first = get(&mut stream, "/api/v1/ping").await;
    assert!(first.starts_with("HTTP/1.1 200"), "{first}");
    assert!(first.contains(r#"{"pong":true}"#));
    assert!(first.to_ascii_lowercase().contains("x-request-id:"));

    let second = get(&mut stream, "/api/v1/ping").await;
    assert!(second.starts_with("HTTP/1.1 200"));
    assert_eq!(connections.len(), 1);

    shutdown.trigger();
    serving.await.unwrap().unwrap();

    assert!(connections.is_empty());
    assert_eq!(
        *log.lock(),
        [
            "post_start",
            "before_create",
            "after_create",
            "before_destroy",
            "after_destroy",
            "post_stop"
        ]
    );
}

#[tokio::test]
async fn closed_transport_evicts_its_connection() {
    let log: Log = Arc::default();
    let prepared = server(&log).prepare().unwrap();
    let connections = Arc::clone(prepared.connections());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = ShutdownSignal::new();
    let serving = tokio::spawn(prepared.serve(listener, shutdown.clone()));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let response = get(&mut stream, "/api/v1/ping").await;
    assert!(response.starts_with("HTTP/1.1 200"));
    assert_eq!(connections.len(), 1);

    drop(stream);
    wait_until(|| connections.is_empty()).await;
    assert!(log.lock().contains(&"after_destroy".to_string()));

    shutdown.trigger();
    serving.await.unwrap().unwrap();
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let log: Log = Arc::default();
    let prepared = server(&log).prepare().unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = ShutdownSignal::new();
    let serving = tokio::spawn(prepared.serve(listener, shutdown.clone()));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let response = get(&mut stream, "/api/v1/missing").await;
    assert!(response.starts_with("HTTP/1.1 404"), "{response}");
    assert!(response.contains("NOT_FOUND"));

    shutdown.trigger();
    serving.await.unwrap().unwrap();
}
