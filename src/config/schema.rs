//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits so the effective configuration can be
//! logged at startup and embedders can deserialize it from their own sources.

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Route definitions mapping path prefixes to backends.
    pub routes: Vec<RouteConfig>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            routes: vec![
                RouteConfig {
                    name: "amd06ws".to_string(),
                    path_prefix: "/amd06ws".to_string(),
                    kind: BackendKind::WebSocket,
                    target: "ws://npm2amd06ws.p.dnsabr.com".to_string(),
                },
                RouteConfig {
                    name: "azusxh".to_string(),
                    path_prefix: "/azusxh".to_string(),
                    kind: BackendKind::Http,
                    target: "https://ex01.choreoapps.dev".to_string(),
                },
            ],
            timeouts: TimeoutConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Which kind of backend a route forwards to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Plain HTTP reverse proxying.
    Http,
    /// WebSocket session relay.
    #[serde(rename = "websocket")]
    WebSocket,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Http => write!(f, "http"),
            BackendKind::WebSocket => write!(f, "websocket"),
        }
    }
}

/// Route configuration mapping a path prefix to one backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Path prefix to match.
    pub path_prefix: String,

    /// Backend kind behind this prefix.
    pub kind: BackendKind,

    /// Backend URL (`ws://`/`wss://` for WebSocket, `http://`/`https://` for HTTP).
    pub target: String,
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Backend connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// HTTP request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// WebSocket session idle timeout in seconds.
    /// A frame forwarded in either direction resets it.
    pub idle_secs: u64,

    /// Upper bound for sending a close frame during session teardown, in seconds.
    pub close_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            request_secs: 30,
            idle_secs: 300,
            close_secs: 5,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default filter directive used when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "path_proxy=info,tower_http=info".to_string(),
        }
    }
}
