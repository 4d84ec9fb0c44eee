//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Backend dial:
//!     → timeouts.rs (connect deadline)
//! Active WebSocket session:
//!     → timeouts.rs (shared idle deadline for both directions)
//! Session teardown:
//!     → timeouts.rs (bounded close)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external wait has a deadline
//! - No retries: a backend dial is attempted once per session

pub mod timeouts;
