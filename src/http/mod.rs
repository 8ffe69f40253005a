//! HTTP control API.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum router, request id, tracing, timeout, body limit)
//!     → handlers.rs (JSON endpoints under /api)
//!       or websocket.rs (/ws upgrade → observers::BroadcastHub)
//!     → response.rs (ControlError → status + {error, details})
//! ```

pub mod handlers;
pub mod response;
pub mod server;
pub mod websocket;

pub use response::ApiError;
pub use server::{AppState, ControlServer, ServerHandle};
