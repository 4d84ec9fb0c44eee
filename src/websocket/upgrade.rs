//! Inbound WebSocket upgrade.
//!
//! The upgrade happens in two steps:
//! 1. [`accept`] runs axum's handshake extractor and the same-origin check.
//!    Nothing has been written yet, so a failure here can still be answered
//!    with a normal HTTP error via [`UpgradeError::into_response`].
//! 2. [`commit`] builds the `101 Switching Protocols` response. Once the server
//!    has written it, [`PendingUpgrade::complete`] yields the upgraded socket.
//!
//! Known constraint: after step 2 the HTTP response is committed. If the
//! connection never upgrades (client hangs up mid-handshake) nothing more can
//! be written to the client; the session is abandoned and the caller only logs.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::extract::ws::{self, WebSocket, WebSocketUpgrade};
use axum::extract::FromRequestParts;
use axum::http::header::{self, HeaderMap};
use axum::http::uri::Authority;
use axum::http::{Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use futures_util::{Sink, Stream};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::resilience::timeouts::with_deadline;
use crate::websocket::error::{UpgradeError, WsError};

/// Read buffer size for upgraded client connections.
pub const READ_BUFFER_SIZE: usize = 1024;
/// Write buffer size for upgraded client connections.
pub const WRITE_BUFFER_SIZE: usize = 1024;

/// Validate the client's handshake without answering it.
pub async fn accept(request: Request<Body>) -> Result<WebSocketUpgrade, UpgradeError> {
    let (mut parts, _body) = request.into_parts();
    let upgrade = WebSocketUpgrade::from_request_parts(&mut parts, &()).await?;
    check_origin(&parts.headers, &parts.uri)?;
    Ok(upgrade)
}

/// Build the 101 response. The socket arrives through the returned handle.
pub fn commit(upgrade: WebSocketUpgrade) -> (Response, PendingUpgrade) {
    let (tx, rx) = oneshot::channel();
    let span = tracing::Span::current();

    let response = upgrade
        .read_buffer_size(READ_BUFFER_SIZE)
        .write_buffer_size(WRITE_BUFFER_SIZE)
        .on_failed_upgrade(move |e: axum::Error| {
            span.in_scope(|| tracing::warn!(error = %e, "Client upgrade failed"));
        })
        .on_upgrade(move |socket| async move {
            let _ = tx.send(ClientSocket(socket));
        });

    (response, PendingUpgrade { rx })
}

/// A committed handshake waiting for the server to hand over the connection.
pub struct PendingUpgrade {
    rx: oneshot::Receiver<ClientSocket>,
}

impl PendingUpgrade {
    /// Wait for the upgraded socket.
    ///
    /// A failed upgrade drops the sender, which reads as [`UpgradeError::Abandoned`].
    pub async fn complete(self, limit: Duration) -> Result<ClientSocket, UpgradeError> {
        with_deadline(limit, self.rx)
            .await
            .map_err(|_| UpgradeError::Timeout(limit))?
            .map_err(|_| UpgradeError::Abandoned)
    }
}

/// Browsers send `Origin`; its host must match the `Host` the request was sent to.
/// Requests without `Origin` are not browser initiated and pass.
fn check_origin(headers: &HeaderMap, uri: &Uri) -> Result<(), UpgradeError> {
    let Some(origin) = headers.get(header::ORIGIN) else {
        return Ok(());
    };
    let origin = origin.to_str().unwrap_or_default();

    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| uri.authority().map(Authority::as_str))
        .and_then(|h| h.parse::<Authority>().ok());

    match (Url::parse(origin).ok(), host) {
        (Some(origin_url), Some(host)) if same_host(&origin_url, &host) => Ok(()),
        _ => Err(UpgradeError::Origin(origin.to_string())),
    }
}

fn same_host(origin: &Url, host: &Authority) -> bool {
    let default_port = match origin.scheme() {
        "https" | "wss" => Some(443),
        "http" | "ws" => Some(80),
        _ => None,
    };
    origin
        .host_str()
        .is_some_and(|h| h.eq_ignore_ascii_case(host.host()))
        && origin.port_or_known_default() == host.port_u16().or(default_port)
}

impl IntoResponse for UpgradeError {
    fn into_response(self) -> Response {
        let status = match self {
            UpgradeError::Rejected(rejection) => return rejection.into_response(),
            UpgradeError::Origin(_) => StatusCode::FORBIDDEN,
            UpgradeError::Abandoned | UpgradeError::Timeout(_) => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string()).into_response()
    }
}

/// Client side of a session, speaking the same frame type as the backend.
#[derive(Debug)]
pub struct ClientSocket(WebSocket);

impl Stream for ClientSocket {
    type Item = Result<Message, WsError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.0)
            .poll_next(cx)
            .map(|item| item.map(|r| r.map(from_client).map_err(transport_error)))
    }
}

impl Sink<Message> for ClientSocket {
    type Error = WsError;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
        Pin::new(&mut self.0).poll_ready(cx).map_err(transport_error)
    }

    fn start_send(mut self: Pin<&mut Self>, item: Message) -> Result<(), WsError> {
        match to_client(item) {
            Some(message) => Pin::new(&mut self.0).start_send(message).map_err(transport_error),
            None => Ok(()),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
        Pin::new(&mut self.0).poll_flush(cx).map_err(transport_error)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
        Pin::new(&mut self.0).poll_close(cx).map_err(transport_error)
    }
}

fn from_client(message: ws::Message) -> Message {
    match message {
        ws::Message::Text(text) => Message::Text(text.as_str().to_owned().into()),
        ws::Message::Binary(data) => Message::Binary(data),
        ws::Message::Ping(data) => Message::Ping(data),
        ws::Message::Pong(data) => Message::Pong(data),
        ws::Message::Close(frame) => Message::Close(frame.map(|f| CloseFrame {
            code: CloseCode::from(f.code),
            reason: f.reason.as_str().to_owned().into(),
        })),
    }
}

/// Raw frames have no client-side equivalent and are never produced by a read.
fn to_client(message: Message) -> Option<ws::Message> {
    Some(match message {
        Message::Text(text) => ws::Message::Text(text.as_str().to_owned().into()),
        Message::Binary(data) => ws::Message::Binary(data),
        Message::Ping(data) => ws::Message::Ping(data),
        Message::Pong(data) => ws::Message::Pong(data),
        Message::Close(frame) => ws::Message::Close(frame.map(|f| ws::CloseFrame {
            code: f.code.into(),
            reason: f.reason.as_str().to_owned().into(),
        })),
        Message::Frame(_) => return None,
    })
}

/// axum wraps the codec's own error; unwrap it so both sides report alike.
fn transport_error(error: axum::Error) -> WsError {
    match error.into_inner().downcast::<WsError>() {
        Ok(inner) => *inner,
        Err(other) => WsError::Io(std::io::Error::other(other)),
    }
}
