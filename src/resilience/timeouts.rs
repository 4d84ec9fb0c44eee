//! Timeout enforcement.
//!
//! # Responsibilities
//! - Bound backend dials and teardown close frames with a deadline
//! - Track WebSocket session activity for the idle timeout
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors
//! - One idle deadline per session, refreshed by traffic in either direction

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

/// An operation did not finish before its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation timed out after {0:?}")]
pub struct Elapsed(pub Duration);

/// Run `fut` with a deadline.
pub async fn with_deadline<F: Future>(limit: Duration, fut: F) -> Result<F::Output, Elapsed> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| Elapsed(limit))
}

/// Shared last-activity clock for one session.
///
/// Both relay loops call [`IdleTimer::touch`] after forwarding a frame; the
/// session controller awaits [`IdleTimer::expired`].
#[derive(Debug)]
pub struct IdleTimer {
    started: Instant,
    /// Milliseconds since `started` at the last recorded activity.
    last_activity_ms: AtomicU64,
    limit: Duration,
}

impl IdleTimer {
    pub fn new(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            last_activity_ms: AtomicU64::new(0),
            limit,
        }
    }

    /// Record activity now.
    pub fn touch(&self) {
        let elapsed = self.started.elapsed().as_millis() as u64;
        self.last_activity_ms.fetch_max(elapsed, Ordering::Relaxed);
    }

    /// Time since the last recorded activity.
    pub fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_activity_ms.load(Ordering::Relaxed));
        self.started.elapsed().saturating_sub(last)
    }

    /// Resolves once no activity has been recorded for the configured limit.
    pub async fn expired(&self) {
        loop {
            let last = Duration::from_millis(self.last_activity_ms.load(Ordering::Relaxed));
            let deadline = self.started + last + self.limit;
            tokio::time::sleep_until(deadline).await;
            if self.idle_for() >= self.limit {
                return;
            }
        }
    }
}
