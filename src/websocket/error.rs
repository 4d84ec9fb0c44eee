//! WebSocket session error taxonomy.

use std::time::Duration;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use tokio_tungstenite::tungstenite;
use url::Url;

/// Transport error reported by the WebSocket codec.
pub type WsError = tungstenite::Error;

/// Direction of travel for a relayed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Loop A: inbound client to backend.
    ClientToBackend,
    /// Loop B: backend to inbound client.
    BackendToClient,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::ClientToBackend => "client_to_backend",
            Direction::BackendToClient => "backend_to_client",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The backend could not be reached.
#[derive(Debug, thiserror::Error)]
pub enum DialError {
    #[error("dialing {url} failed: {source}")]
    Connect {
        url: Url,
        #[source]
        source: WsError,
    },

    #[error("dialing {url} timed out after {timeout:?}")]
    Timeout { url: Url, timeout: Duration },
}

/// The inbound connection could not be upgraded.
#[derive(Debug, thiserror::Error)]
pub enum UpgradeError {
    #[error(transparent)]
    Rejected(#[from] WebSocketUpgradeRejection),

    #[error("origin {0:?} does not match the request host")]
    Origin(String),

    #[error("client connection was never upgraded")]
    Abandoned,

    #[error("client upgrade timed out after {0:?}")]
    Timeout(Duration),
}

/// Any failure that ends a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Dial(#[from] DialError),

    #[error(transparent)]
    Upgrade(#[from] UpgradeError),

    #[error("{direction} read failed: {source}")]
    RelayRead {
        direction: Direction,
        #[source]
        source: WsError,
    },

    #[error("{direction} write failed: {source}")]
    RelayWrite {
        direction: Direction,
        #[source]
        source: WsError,
    },
}

impl SessionError {
    /// Metric label for the session outcome this error produces.
    pub fn outcome(&self) -> &'static str {
        match self {
            SessionError::Dial(_) => "dial_failed",
            SessionError::Upgrade(_) => "upgrade_failed",
            SessionError::RelayRead { .. } => "read_failed",
            SessionError::RelayWrite { .. } => "write_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_direction() {
        let err = SessionError::RelayRead {
            direction: Direction::BackendToClient,
            source: WsError::ConnectionClosed,
        };
        assert!(err.to_string().starts_with("backend_to_client read failed"));
        assert_eq!(Direction::ClientToBackend.to_string(), Direction::ClientToBackend.as_str());
        assert_eq!(err.outcome(), "read_failed");
    }

    #[test]
    fn dial_errors_keep_the_backend_url() {
        let url = Url::parse("ws://127.0.0.1:9").unwrap();
        let err = SessionError::from(DialError::Timeout {
            url,
            timeout: Duration::from_secs(2),
        });
        assert!(err.to_string().contains("ws://127.0.0.1:9"));
        assert_eq!(err.outcome(), "dial_failed");
    }
}
