//! Gateway log capture.
//!
//! # Data Flow
//! ```text
//! gateway stdout/stderr, supervisor events, orchestrator errors
//!     → buffer.rs (bounded ring, oldest evicted first)
//!     → broadcast channel
//!     → observers::hub (pushes `{type: "log"}` events)
//! ```

pub mod buffer;

pub use buffer::{LogBuffer, LogEntry, LogKind, DEFAULT_CAPACITY};
