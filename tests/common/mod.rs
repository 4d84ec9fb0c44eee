//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::{body::Bytes, http::HeaderMap, http::Method, http::Uri, routing::any, Router};
use path_proxy::config::{BackendKind, ProxyConfig, RouteConfig};
use path_proxy::{HttpServer, Shutdown};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;

/// Backend side of a proxied WebSocket session.
pub type BackendSocket = WebSocketStream<TcpStream>;

pub fn ws_route(prefix: &str, backend: SocketAddr) -> RouteConfig {
    RouteConfig {
        name: format!("ws{}", prefix.replace('/', "_")),
        path_prefix: prefix.into(),
        kind: BackendKind::WebSocket,
        target: format!("ws://{}", backend),
    }
}

pub fn http_route(prefix: &str, backend: SocketAddr) -> RouteConfig {
    RouteConfig {
        name: format!("http{}", prefix.replace('/', "_")),
        path_prefix: prefix.into(),
        kind: BackendKind::Http,
        target: format!("http://{}", backend),
    }
}

pub fn config_with(routes: Vec<RouteConfig>) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.routes = routes;
    config.timeouts.connect_secs = 2;
    config.timeouts.close_secs = 1;
    config
}

/// Start the proxy on an ephemeral port.
pub async fn start_proxy(config: ProxyConfig) -> (SocketAddr, Shutdown) {
    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, shutdown.clone()).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let _ = server.run(listener).await;
    });

    (addr, shutdown)
}

/// A loopback address with nothing listening on it.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Start a WebSocket backend that echoes every data frame back.
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                use futures_util::{SinkExt, StreamExt};
                let Ok(mut ws) = tokio_tungstenite::accept_async(socket).await else {
                    return;
                };
                while let Some(Ok(msg)) = ws.next().await {
                    if msg.is_text() || msg.is_binary() {
                        if ws.send(msg).await.is_err() {
                            break;
                        }
                    }
                }
            });
        }
    });

    addr
}

/// Start a WebSocket backend that hands every accepted session to the test.
pub async fn start_ws_backend() -> (SocketAddr, mpsc::UnboundedReceiver<BackendSocket>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            if let Ok(ws) = tokio_tungstenite::accept_async(socket).await {
                if tx.send(ws).is_err() {
                    break;
                }
            }
        }
    });

    (addr, rx)
}

/// Wait for the next backend session.
pub async fn next_backend(rx: &mut mpsc::UnboundedReceiver<BackendSocket>) -> BackendSocket {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("backend session within deadline")
        .expect("backend still running")
}

/// Start an HTTP backend that describes each request it receives.
///
/// Response body: `"<METHOD> <path?query> host=<host> body=<body>"`.
pub async fn start_http_backend() -> SocketAddr {
    async fn describe(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> String {
        let host = headers
            .get("host")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-");
        format!(
            "{} {} host={} body={}",
            method,
            uri,
            host,
            String::from_utf8_lossy(&body)
        )
    }

    let app = Router::new()
        .route("/", any(describe))
        .route("/{*path}", any(describe));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    addr
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
