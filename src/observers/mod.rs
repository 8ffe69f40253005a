//! Live observers over WebSocket.
//!
//! # Data Flow
//! ```text
//! LogBuffer ── subscribe ──→ hub.rs log forwarder ──→ {"type":"log","data":entry}
//! TrafficSource ── snapshot.rs poll (only when newer) ──→ {"type":"update","data":[...]}
//!                                     │
//!                                     ▼
//!                     hub.rs: per connection outbound queue → writer task → socket
//! ```
//!
//! # Design Decisions
//! - Each connection has its own heartbeat ping and pong deadline
//! - Broadcasts go only to connections still marked open
//! - Slow observers never block publishers (unbounded per-connection queue)

pub mod hub;
pub mod snapshot;
pub mod traffic;

pub use hub::{spawn_log_forwarder, BroadcastHub, HubEvent, ObserverConfig};
pub use snapshot::SnapshotPoller;
pub use traffic::{NullTrafficSource, TrafficSource};
