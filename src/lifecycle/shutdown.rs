//! Shutdown coordination for the proxy.

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Coordinator for shutdown.
///
/// The broadcast side stops the accept loop; the token side tears down
/// WebSocket sessions that outlive their HTTP connection.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    sessions: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            sessions: CancellationToken::new(),
        }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Parent token for all sessions.
    pub fn session_token(&self) -> CancellationToken {
        self.sessions.clone()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
        self.sessions.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.sessions.is_cancelled()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
