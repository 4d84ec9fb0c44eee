//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the dispatch handler
//! - Wire up middleware (tracing, timeout, request ID)
//! - Bind server to listener
//! - Dispatch requests through the route table
//! - Hand WebSocket routes to the session controller and HTTP routes to the forwarder

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::validation::ValidationError;
use crate::config::{BackendKind, ProxyConfig};
use crate::http::forward::HttpForwarder;
use crate::http::request::X_REQUEST_ID;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::routing::{RouteMatch, Router as ProxyRouter};
use crate::websocket::SessionController;

/// Body of the root greeting.
pub const GREETING: &str = "Hello world";

/// Failure to assemble the server from configuration.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid route: {0}")]
    Route(#[from] ValidationError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<ProxyRouter>,
    pub sessions: SessionController,
    pub forwarder: HttpForwarder,
}

/// HTTP server for the proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    shutdown: Shutdown,
    shutdown_rx: broadcast::Receiver<()>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    ///
    /// Triggering `shutdown` stops the accept loop and cancels live sessions.
    pub fn new(config: ProxyConfig, shutdown: Shutdown) -> Result<Self, ServerError> {
        let proxy_router = Arc::new(ProxyRouter::from_config(&config.routes)?);
        let sessions = SessionController::new(&config.timeouts, shutdown.session_token());
        let forwarder = HttpForwarder::new(&config.timeouts)?;

        let state = AppState {
            router: proxy_router,
            sessions,
            forwarder,
        };

        let router = Self::build_router(&config, state);
        let shutdown_rx = shutdown.subscribe();
        Ok(Self {
            router,
            config,
            shutdown,
            shutdown_rx,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The fully layered Axum router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = self.config.routes.len(),
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let shutdown = self.shutdown;
        let mut shutdown_rx = self.shutdown_rx;

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                if !shutdown.is_triggered() {
                    let _ = shutdown_rx.recv().await;
                }
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

/// Main proxy handler.
/// Looks up the route and hands the request to the matching backend.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let path = request.uri().path().to_string();

    tracing::debug!(
        request_id = %request_id,
        method = %request.method(),
        path = %path,
        "Dispatching request"
    );

    let (route, response) = match state.router.match_path(&path) {
        RouteMatch::Root => ("root", (StatusCode::OK, GREETING).into_response()),
        RouteMatch::NotFound => {
            tracing::debug!(request_id = %request_id, path = %path, "No route matched");
            ("none", (StatusCode::NOT_FOUND, "404 page not found").into_response())
        }
        RouteMatch::Backend(entry) => {
            let response = match entry.target.kind {
                BackendKind::WebSocket => {
                    state
                        .sessions
                        .handle(&entry.name, &entry.target.url, request)
                        .await
                }
                BackendKind::Http => match state.forwarder.forward(&entry.target.url, request).await {
                    Ok(response) => response,
                    Err(e) => {
                        tracing::error!(request_id = %request_id, error = %e, "Upstream error");
                        e.into_response()
                    }
                },
            };
            (entry.name.as_str(), response)
        }
    };

    metrics::record_request(route, response.status().as_u16(), start_time);
    response
}
