//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path)
//!     → router.rs (route lookup)
//!     → matcher.rs (evaluate match conditions)
//!     → Return: Root, matched Route, or NotFound
//!
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → Parse backend URLs
//!     → Sort by prefix length
//!     → Freeze as immutable Router
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route

pub mod matcher;
pub mod router;

pub use router::{BackendTarget, RouteEntry, RouteMatch, Router};
