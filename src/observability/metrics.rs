//! Metrics collection.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by route, status
//! - `proxy_request_duration_seconds` (histogram): latency by route
//! - `proxy_ws_sessions_active` (gauge): sessions currently relaying
//! - `proxy_ws_sessions_total` (counter): finished sessions by outcome
//! - `proxy_ws_frames_total` (counter): relayed frames by direction
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; without an installed recorder
//!   every call is a no-op
//! - Labels for route, status code, direction and outcome

use std::time::Instant;

/// Record an HTTP request that got a response from the proxy.
pub fn record_request(route: &str, status: u16, start: Instant) {
    metrics::counter!(
        "proxy_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("proxy_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// A session reached Active.
pub fn session_opened() {
    metrics::gauge!("proxy_ws_sessions_active").increment(1.0);
}

/// An Active session reached Closed.
pub fn session_closed(outcome: &'static str) {
    metrics::gauge!("proxy_ws_sessions_active").decrement(1.0);
    session_finished(outcome);
}

/// A session ended, successfully or not.
pub fn session_finished(outcome: &'static str) {
    metrics::counter!("proxy_ws_sessions_total", "outcome" => outcome).increment(1);
}

/// One frame was relayed.
pub fn record_frame(direction: &'static str) {
    metrics::counter!("proxy_ws_frames_total", "direction" => direction).increment(1);
}
