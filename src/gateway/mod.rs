//! Supervision of the traffic-capturing gateway.
//!
//! # Data Flow
//! ```text
//! start(spec):
//!     supervisor.rs  stop previous instance, pick launch mode
//!     → process.rs   spawn child, stream stdout/stderr into the log buffer
//!       or embedded.rs run an in-process future until told to stop
//!     → exit report  → supervisor exit watcher (log, on_error, clear slot)
//!
//! stop():
//!     supervisor.rs  take instance from slot
//!     → shutdown.rs  SIGTERM, grace period, SIGKILL, reap
//! ```
//!
//! # Design Decisions
//! - At most one instance; every start first stops the previous one
//! - Every launch mode is driven through the `GatewayHandle` trait
//! - Exits requested through `stop` are never reported as crashes

pub mod embedded;
pub mod path;
pub mod process;
pub mod shutdown;
pub mod supervisor;

pub use embedded::{EmbeddedLauncher, EmbeddedResult, EmbeddedRun};
pub use path::{InheritedSearchPath, SearchPathResolver};
pub use process::ProcessLaunch;
pub use supervisor::{
    ErrorCallback, ExitReport, GatewayError, GatewayHandle, GatewayState, GatewayStatus,
    GatewaySupervisor, InstanceInfo, LaunchMode, LaunchSpec,
};
