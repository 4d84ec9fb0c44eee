//! Outbound WebSocket connections to the backend.
//!
//! One dial per inbound session, no retries. The handshake carries only the
//! standard WebSocket headers.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::resilience::timeouts::with_deadline;
use crate::websocket::error::DialError;

/// Connection handle for the backend side of a session.
pub type BackendStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Read buffer size for backend connections.
pub const DIAL_READ_BUFFER_SIZE: usize = 4096;
/// Write buffer size for backend connections.
pub const DIAL_WRITE_BUFFER_SIZE: usize = 4096;

/// Opens backend connections with a connect deadline.
#[derive(Debug, Clone)]
pub struct Dialer {
    connect_timeout: Duration,
}

impl Dialer {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Dial `url` once.
    pub async fn dial(&self, url: &Url) -> Result<BackendStream, DialError> {
        let mut config = WebSocketConfig::default();
        config.read_buffer_size = DIAL_READ_BUFFER_SIZE;
        config.write_buffer_size = DIAL_WRITE_BUFFER_SIZE;

        let connect = connect_async_with_config(url.as_str(), Some(config), false);
        let (stream, response) = with_deadline(self.connect_timeout, connect)
            .await
            .map_err(|_| DialError::Timeout {
                url: url.clone(),
                timeout: self.connect_timeout,
            })?
            .map_err(|source| DialError::Connect {
                url: url.clone(),
                source,
            })?;

        tracing::debug!(
            backend = %url,
            status = %response.status(),
            "Backend connection established"
        );

        Ok(stream)
    }
}
