//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, dispatch)
//!     → routing (path prefix → backend)
//!     → WebSocket route: crate::websocket session controller
//!     → HTTP route: forward.rs
//!         → request.rs (URL rewrite, header filtering)
//!         → response.rs (header filtering, streaming body)
//!     → Send to client
//! ```

pub mod forward;
pub mod request;
pub mod response;
pub mod server;

pub use forward::{ForwardError, HttpForwarder};
pub use request::X_REQUEST_ID;
pub use server::{HttpServer, ServerError};
