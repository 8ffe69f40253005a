//! Network layer.
//!
//! # Data Flow
//! ```text
//! listener.rs   bind the control API address (loopback by default)
//!     → http::server (axum serve loop)
//!     → /ws upgrades get a connection.rs ConnectionId in the observer hub
//! ```

pub mod connection;
pub mod listener;

pub use connection::ConnectionId;
pub use listener::{bind, ListenerError};
