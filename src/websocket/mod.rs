//! WebSocket proxy handling.
//!
//! # Responsibilities
//! - Establish a WebSocket connection to the backend (dial.rs)
//! - Complete the upgrade handshake with the client (upgrade.rs)
//! - Bidirectional frame forwarding (relay.rs)
//! - Sequence and tear down each session (session.rs)
//!
//! # Data Flow
//! ```text
//! Client ←──── WebSocket frames ────→ Proxy ←──── WebSocket frames ────→ Backend
//! ```
//!
//! # Design Decisions
//! - Backend dialed before the client is upgraded
//! - Frame-level forwarding, one message in flight per direction
//! - Close frames propagated in both directions
//! - Ping/pong answered by each hop's codec, never relayed

pub mod dial;
pub mod error;
pub mod relay;
pub mod session;
pub mod upgrade;

pub use error::{DialError, Direction, SessionError, UpgradeError};
pub use session::{SessionController, SessionState};
