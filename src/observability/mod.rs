//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//! ```
//!
//! # Design Decisions
//! - Structured logging for machine parsing
//! - Request ID flows through HTTP spans, session ID through WebSocket spans
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
