//! Session lifecycle controller.
//!
//! # State Machine
//! ```text
//! Init ──dial ok──▶ (upgrade) ──ok──▶ Active ──loop exits──▶ Closing ──▶ Closed
//!   │                   │
//!   └─dial err─▶ Failed └─upgrade err─▶ Failed (backend closed)
//! ```
//!
//! # Design Decisions
//! - Dial before upgrade: an unreachable backend is still reported as a
//!   plain HTTP 500 instead of an upgraded socket with nothing behind it
//! - The session owns both handles and is the only place that closes them
//! - Errors are logged here and never leave the session

use std::fmt;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::SinkExt;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use url::Url;
use uuid::Uuid;

use crate::config::TimeoutConfig;
use crate::observability::metrics;
use crate::resilience::timeouts::with_deadline;
use crate::websocket::dial::{BackendStream, Dialer};
use crate::websocket::error::SessionError;
use crate::websocket::relay::{relay, FrameTransport, RelayEnd};
use crate::websocket::upgrade::{self, ClientSocket, PendingUpgrade};

/// Unique identifier for a session, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Active,
    Closing,
    Closed,
    Failed,
}

/// Timing knobs shared by every session.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// Limit for the client to finish the upgrade after the 101 is sent.
    pub upgrade_timeout: Duration,
    /// Session idle limit.
    pub idle_timeout: Duration,
    /// Limit for sending each close frame during teardown.
    pub close_timeout: Duration,
}

impl From<&TimeoutConfig> for SessionSettings {
    fn from(timeouts: &TimeoutConfig) -> Self {
        Self {
            upgrade_timeout: Duration::from_secs(timeouts.connect_secs),
            idle_timeout: Duration::from_secs(timeouts.idle_secs),
            close_timeout: Duration::from_secs(timeouts.close_secs),
        }
    }
}

/// Entry point the router hands WebSocket requests to.
#[derive(Debug, Clone)]
pub struct SessionController {
    dialer: Dialer,
    settings: SessionSettings,
    shutdown: CancellationToken,
}

impl SessionController {
    /// Cancelling `shutdown` tears down every live session.
    pub fn new(timeouts: &TimeoutConfig, shutdown: CancellationToken) -> Self {
        Self {
            dialer: Dialer::new(Duration::from_secs(timeouts.connect_secs)),
            settings: SessionSettings::from(timeouts),
            shutdown,
        }
    }

    /// Proxy one inbound WebSocket request to `backend`.
    ///
    /// Returns the HTTP response for the inbound request: 500 if the backend
    /// cannot be dialed, a 4xx if the handshake is invalid, otherwise 101.
    /// The relay itself runs on a spawned task.
    pub async fn handle(&self, route: &str, backend: &Url, request: Request<Body>) -> Response {
        let mut session = Session::new();
        let span = tracing::info_span!("ws_session", session_id = %session.id, route = %route);

        async {
            let outbound = match self.dialer.dial(backend).await {
                Ok(stream) => stream,
                Err(e) => {
                    session.fail(e.into());
                    return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to dial backend").into_response();
                }
            };
            session.outbound = Some(outbound);

            let accepted = match upgrade::accept(request).await {
                Ok(accepted) => accepted,
                Err(e) => {
                    let message = e.to_string();
                    let response = e.into_response();
                    session.close_outbound(self.settings.close_timeout).await;
                    tracing::warn!(error = %message, "Upgrade rejected");
                    session.mark_failed("upgrade_failed");
                    return response;
                }
            };

            let (response, pending) = upgrade::commit(accepted);
            let settings = self.settings;
            let cancel = self.shutdown.child_token();
            tokio::spawn(session.run(pending, settings, cancel).in_current_span());

            response
        }
        .instrument(span)
        .await
    }
}

/// One proxied conversation. Single use.
pub struct Session {
    pub id: SessionId,
    state: SessionState,
    inbound: Option<ClientSocket>,
    outbound: Option<BackendStream>,
}

impl Session {
    fn new() -> Self {
        Self {
            id: SessionId::new(),
            state: SessionState::Init,
            inbound: None,
            outbound: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(from = ?self.state, to = ?next, "Session state change");
        self.state = next;
    }

    fn fail(&mut self, error: SessionError) {
        tracing::warn!(error = %error, "Session failed");
        self.mark_failed(error.outcome());
    }

    fn mark_failed(&mut self, outcome: &'static str) {
        self.transition(SessionState::Failed);
        metrics::session_finished(outcome);
    }

    /// Finish the upgrade, relay until either side stops, then tear down.
    async fn run(mut self, pending: PendingUpgrade, settings: SessionSettings, cancel: CancellationToken) {
        match pending.complete(settings.upgrade_timeout).await {
            Ok(stream) => self.inbound = Some(stream),
            Err(e) => {
                // The 101 is already on the wire; all we can do is release the backend.
                self.close_outbound(settings.close_timeout).await;
                self.fail(e.into());
                return;
            }
        }

        let (Some(inbound), Some(outbound)) = (self.inbound.take(), self.outbound.take()) else {
            return;
        };

        self.transition(SessionState::Active);
        metrics::session_opened();
        tracing::info!("Session active");

        let relayed = relay(inbound, outbound, settings.idle_timeout, &cancel).await;
        self.inbound = relayed.inbound;
        self.outbound = relayed.outbound;

        self.transition(SessionState::Closing);
        match &relayed.end {
            RelayEnd::Failed(e) => tracing::info!(error = %e, "Relay stopped"),
            end => tracing::info!(end = ?end, "Relay stopped"),
        }

        if let Some(inbound) = self.inbound.as_mut() {
            close_handle(inbound, settings.close_timeout).await;
        }
        self.close_outbound(settings.close_timeout).await;
        self.inbound = None;

        self.transition(SessionState::Closed);
        metrics::session_closed(relayed.end.outcome());
        tracing::info!("Session closed");
    }

    async fn close_outbound(&mut self, limit: Duration) {
        if let Some(mut outbound) = self.outbound.take() {
            close_handle(&mut outbound, limit).await;
        }
    }
}

/// Send a close frame and flush, tolerating a handle that is already closed.
pub async fn close_handle<T: FrameTransport>(handle: &mut T, limit: Duration) {
    match with_deadline(limit, handle.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(error = %e, "Close on finished connection"),
        Err(e) => tracing::debug!(error = %e, "Close frame not delivered"),
    }
}
