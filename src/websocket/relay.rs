//! Bidirectional frame relay.
//!
//! # Data Flow
//! ```text
//!              Loop A (spawned task)
//! inbound  ── read ──────────────────▶ write ──▶ outbound
//! inbound  ◀── write ◀────────────────── read ── outbound
//!              Loop B (caller's task)
//! ```
//!
//! Each handle is split into a read half and a write half. Loop A owns the
//! inbound read half and the outbound write half; Loop B owns the other two.
//! No half is ever shared, so the loops need no locks.
//!
//! The first loop to stop cancels the other through a child token. Both
//! loops also observe the session idle timer. When both have stopped the
//! halves are reunited and handed back to the caller, which closes them.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::task::JoinError;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::observability::metrics;
use crate::resilience::timeouts::IdleTimer;
use crate::websocket::error::{Direction, SessionError, WsError};

/// A full-duplex WebSocket connection the relay can pump frames through.
pub trait FrameTransport:
    Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin + Send + 'static
{
}

impl<T> FrameTransport for T where
    T: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin + Send + 'static
{
}

/// Why a single loop stopped.
#[derive(Debug)]
pub enum LoopExit {
    /// The source sent a close frame (already forwarded) or ended its stream.
    PeerClosed,
    /// A read or write failed.
    Failed(SessionError),
    /// The other loop, the idle timer or the server asked it to stop.
    Cancelled,
}

/// Why the relay as a whole stopped: the reason of whichever loop ended first.
#[derive(Debug)]
pub enum RelayEnd {
    /// One peer closed cleanly.
    Closed(Direction),
    /// A transport error in one direction.
    Failed(SessionError),
    /// No frame moved in either direction for the idle timeout.
    IdleTimeout,
    /// The session was cancelled from outside (server shutdown).
    Cancelled,
}

impl RelayEnd {
    /// Metric label for the session outcome.
    pub fn outcome(&self) -> &'static str {
        match self {
            RelayEnd::Closed(_) => "closed",
            RelayEnd::Failed(e) => e.outcome(),
            RelayEnd::IdleTimeout => "idle_timeout",
            RelayEnd::Cancelled => "cancelled",
        }
    }
}

/// Handles returned by the relay.
///
/// A handle is `None` only if its loop task panicked, in which case its
/// halves were dropped with the task and the connection is already gone.
pub struct Relayed<C, B> {
    pub inbound: Option<C>,
    pub outbound: Option<B>,
    pub end: RelayEnd,
}

struct LoopEnd<R, W> {
    reader: SplitStream<R>,
    writer: SplitSink<W, Message>,
    exit: LoopExit,
}

enum First<A, B> {
    A(A),
    B(B),
    Idle,
}

/// Pump frames between `inbound` and `outbound` until either side stops.
pub async fn relay<C, B>(
    inbound: C,
    outbound: B,
    idle_timeout: Duration,
    cancel: &CancellationToken,
) -> Relayed<C, B>
where
    C: FrameTransport,
    B: FrameTransport,
{
    let stop = cancel.child_token();
    let idle = Arc::new(IdleTimer::new(idle_timeout));

    let (inbound_tx, inbound_rx) = inbound.split();
    let (outbound_tx, outbound_rx) = outbound.split();

    let mut loop_a = tokio::spawn(pump(
        inbound_rx,
        outbound_tx,
        Direction::ClientToBackend,
        idle.clone(),
        stop.clone(),
    ));
    let loop_b = pump(
        outbound_rx,
        inbound_tx,
        Direction::BackendToClient,
        idle.clone(),
        stop.clone(),
    );
    tokio::pin!(loop_b);

    let first = tokio::select! {
        a = &mut loop_a => First::A(a),
        b = &mut loop_b => First::B(b),
        _ = idle.expired() => First::Idle,
    };
    stop.cancel();

    let (a, b, end) = match first {
        First::A(a) => {
            let (a, exit) = settle(a, Direction::ClientToBackend);
            let (b, _) = settle(Ok(loop_b.await), Direction::BackendToClient);
            (a, b, end_from(exit, Direction::ClientToBackend, cancel))
        }
        First::B(b) => {
            let (b, exit) = settle(Ok(b), Direction::BackendToClient);
            let (a, _) = settle(loop_a.await, Direction::ClientToBackend);
            (a, b, end_from(exit, Direction::BackendToClient, cancel))
        }
        First::Idle => {
            tracing::info!(idle_for = ?idle.idle_for(), "Session idle timeout");
            let (a, _) = settle(loop_a.await, Direction::ClientToBackend);
            let (b, _) = settle(Ok(loop_b.await), Direction::BackendToClient);
            (a, b, RelayEnd::IdleTimeout)
        }
    };

    let (inbound, outbound) = match (a, b) {
        (Some((a_reader, a_writer)), Some((b_reader, b_writer))) => {
            (a_reader.reunite(b_writer).ok(), b_reader.reunite(a_writer).ok())
        }
        _ => (None, None),
    };

    Relayed {
        inbound,
        outbound,
        end,
    }
}

type Halves<R, W> = (SplitStream<R>, SplitSink<W, Message>);

fn settle<R, W>(
    joined: Result<LoopEnd<R, W>, JoinError>,
    direction: Direction,
) -> (Option<Halves<R, W>>, LoopExit) {
    match joined {
        Ok(done) => (Some((done.reader, done.writer)), done.exit),
        Err(e) => {
            tracing::error!(%direction, error = %e, "Relay loop task failed");
            (None, LoopExit::Cancelled)
        }
    }
}

fn end_from(exit: LoopExit, direction: Direction, cancel: &CancellationToken) -> RelayEnd {
    match exit {
        LoopExit::PeerClosed => RelayEnd::Closed(direction),
        LoopExit::Failed(e) => RelayEnd::Failed(e),
        LoopExit::Cancelled if cancel.is_cancelled() => RelayEnd::Cancelled,
        // Only reachable when a loop task died.
        LoopExit::Cancelled => RelayEnd::Closed(direction),
    }
}

/// Copy frames from `reader` to `writer` one at a time, unmodified.
async fn pump<R, W>(
    mut reader: SplitStream<R>,
    mut writer: SplitSink<W, Message>,
    direction: Direction,
    idle: Arc<IdleTimer>,
    stop: CancellationToken,
) -> LoopEnd<R, W>
where
    R: FrameTransport,
    W: FrameTransport,
{
    let exit = loop {
        let next = tokio::select! {
            biased;
            _ = stop.cancelled() => break LoopExit::Cancelled,
            next = reader.next() => next,
        };

        let message = match next {
            Some(Ok(message)) => message,
            Some(Err(source)) => break LoopExit::Failed(SessionError::RelayRead { direction, source }),
            None => break LoopExit::PeerClosed,
        };
        // Each hop's codec answers pings itself; relaying them would double the pongs.
        if message.is_ping() || message.is_pong() {
            idle.touch();
            continue;
        }
        let is_close = message.is_close();

        let sent = tokio::select! {
            biased;
            _ = stop.cancelled() => break LoopExit::Cancelled,
            sent = writer.send(message) => sent,
        };
        if let Err(source) = sent {
            break LoopExit::Failed(SessionError::RelayWrite { direction, source });
        }

        idle.touch();
        metrics::record_frame(direction.as_str());

        if is_close {
            break LoopExit::PeerClosed;
        }
    };

    tracing::debug!(%direction, exit = ?exit, "Relay loop stopped");
    LoopEnd {
        reader,
        writer,
        exit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::DuplexStream;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Role};
    use tokio_tungstenite::WebSocketStream;

    type Ws = WebSocketStream<DuplexStream>;

    /// Returns (peer, proxy side) of an in-memory WebSocket connection.
    async fn pair(peer_role: Role) -> (Ws, Ws) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let proxy_role = match peer_role {
            Role::Client => Role::Server,
            Role::Server => Role::Client,
        };
        let peer = WebSocketStream::from_raw_socket(a, peer_role, None).await;
        let proxy = WebSocketStream::from_raw_socket(b, proxy_role, None).await;
        (peer, proxy)
    }

    struct Harness {
        client: Ws,
        backend: Ws,
        relay: tokio::task::JoinHandle<Relayed<Ws, Ws>>,
        cancel: CancellationToken,
    }

    async fn start(idle: Duration) -> Harness {
        let (client, inbound) = pair(Role::Client).await;
        let (backend, outbound) = pair(Role::Server).await;
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let relay = tokio::spawn(async move { relay(inbound, outbound, idle, &token).await });
        Harness {
            client,
            backend,
            relay,
            cancel,
        }
    }

    async fn recv(ws: &mut Ws) -> Message {
        tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("frame within deadline")
            .expect("stream open")
            .expect("frame ok")
    }

    #[tokio::test]
    async fn client_frames_reach_backend_in_order() {
        let mut h = start(Duration::from_secs(30)).await;

        let sent = vec![
            Message::text("one"),
            Message::binary(vec![0u8, 159, 146, 150, 255]),
            Message::text(""),
            Message::binary(Vec::<u8>::new()),
            Message::text("two"),
        ];
        for m in &sent {
            h.client.send(m.clone()).await.unwrap();
        }
        for expected in &sent {
            assert_eq!(&recv(&mut h.backend).await, expected);
        }
        h.cancel.cancel();
    }

    #[tokio::test]
    async fn backend_frames_reach_client_in_order() {
        let mut h = start(Duration::from_secs(30)).await;

        for i in 0..100u32 {
            h.backend.send(Message::binary(i.to_be_bytes().to_vec())).await.unwrap();
        }
        for i in 0..100u32 {
            assert_eq!(recv(&mut h.client).await, Message::binary(i.to_be_bytes().to_vec()));
        }
        h.cancel.cancel();
    }

    #[tokio::test]
    async fn ping_is_answered_once_and_not_relayed() {
        let mut h = start(Duration::from_secs(30)).await;

        h.client.send(Message::Ping("p1".into())).await.unwrap();
        assert_eq!(recv(&mut h.client).await, Message::Pong("p1".into()));

        // A second pong would arrive ahead of this frame.
        h.backend.send(Message::text("after")).await.unwrap();
        assert_eq!(recv(&mut h.client).await, Message::text("after"));

        // The backend never sees the ping.
        h.client.send(Message::text("next")).await.unwrap();
        assert_eq!(recv(&mut h.backend).await, Message::text("next"));

        h.backend.send(Message::Ping("p2".into())).await.unwrap();
        assert_eq!(recv(&mut h.backend).await, Message::Pong("p2".into()));
        h.client.send(Message::text("last")).await.unwrap();
        assert_eq!(recv(&mut h.backend).await, Message::text("last"));

        h.cancel.cancel();
    }

    #[tokio::test]
    async fn pings_keep_the_session_alive() {
        let mut h = start(Duration::from_millis(150)).await;

        for _ in 0..6 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            h.client.send(Message::Ping("k".into())).await.unwrap();
            assert_eq!(recv(&mut h.client).await, Message::Pong("k".into()));
        }

        assert!(!h.relay.is_finished());
        h.cancel.cancel();
    }

    #[tokio::test]
    async fn backend_close_is_forwarded_and_ends_the_relay() {
        let mut h = start(Duration::from_secs(30)).await;

        h.backend
            .close(Some(CloseFrame {
                code: CloseCode::Away,
                reason: "bye".into(),
            }))
            .await
            .unwrap();

        match recv(&mut h.client).await {
            Message::Close(Some(frame)) => {
                assert_eq!(frame.code, CloseCode::Away);
                assert_eq!(frame.reason.as_str(), "bye");
            }
            other => panic!("expected close frame, got {other:?}"),
        }

        let relayed = tokio::time::timeout(Duration::from_secs(2), h.relay)
            .await
            .unwrap()
            .unwrap();
        // The close echoes back through the other loop, so either may report first.
        assert!(matches!(relayed.end, RelayEnd::Closed(_)));
        assert!(relayed.inbound.is_some());
        assert!(relayed.outbound.is_some());
    }

    #[tokio::test]
    async fn client_close_ends_the_relay() {
        let mut h = start(Duration::from_secs(30)).await;

        h.client.close(None).await.unwrap();
        assert!(matches!(recv(&mut h.backend).await, Message::Close(_)));

        let relayed = tokio::time::timeout(Duration::from_secs(2), h.relay)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(relayed.end, RelayEnd::Closed(_)));
    }

    #[tokio::test]
    async fn dropped_client_fails_the_relay() {
        let h = start(Duration::from_secs(30)).await;
        drop(h.client);

        let relayed = tokio::time::timeout(Duration::from_secs(2), h.relay)
            .await
            .unwrap()
            .unwrap();
        // An abrupt hangup either reads as end-of-stream or as a read error.
        assert!(matches!(
            relayed.end,
            RelayEnd::Closed(Direction::ClientToBackend)
                | RelayEnd::Failed(SessionError::RelayRead {
                    direction: Direction::ClientToBackend,
                    ..
                })
        ));
    }

    #[tokio::test]
    async fn idle_session_times_out() {
        let h = start(Duration::from_millis(100)).await;
        let relayed = tokio::time::timeout(Duration::from_secs(2), h.relay)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(relayed.end, RelayEnd::IdleTimeout));
        assert_eq!(relayed.end.outcome(), "idle_timeout");
        drop(h.client);
        drop(h.backend);
    }

    #[tokio::test]
    async fn external_cancel_stops_both_loops() {
        let h = start(Duration::from_secs(30)).await;
        h.cancel.cancel();
        let relayed = tokio::time::timeout(Duration::from_secs(2), h.relay)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(relayed.end, RelayEnd::Cancelled));
        assert!(relayed.inbound.is_some() && relayed.outbound.is_some());
    }
}
