//! Gateway readiness checking.
//!
//! # Data Flow
//! ```text
//! gateway spawned
//!     → readiness.rs: TCP connect to host:port every interval
//!     → first successful connect = ready
//!     → deadline passed          = ReadinessError::PortTimeout
//! ```
//!
//! # Design Decisions
//! - Probes are plain TCP connects: the gateway is ready once it accepts
//! - Fixed interval, no backoff; each probe is bounded by the remaining time

pub mod readiness;

pub use readiness::{ReadinessError, ReadinessPoller, DEFAULT_POLL_INTERVAL};
