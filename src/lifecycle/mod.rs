//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → logs, hub, supervisor, orchestrator → listener → background tasks
//!
//! Sessions (orchestrator.rs):
//!     setup → gateway running, client config rewritten
//!     stop  → gateway stopped, client config restored
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     SIGTERM/SIGINT or POST /api/shutdown
//!     → CleanupCoordinator (once) under a watchdog
//!     → ExitGuard blocking restore as the last resort
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listener
//! - Cleanup runs at most once; concurrent triggers share one report
//! - Shutdown has a deadline: forced exit after a blocking restore

pub mod orchestrator;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use orchestrator::{LifecycleOrchestrator, SetupOutcome, SetupRequest, StopOutcome};
pub use shutdown::{run_with_watchdog, CleanupCoordinator, CleanupReport, ExitGuard, Shutdown};
pub use signals::wait_for_termination;
pub use startup::{bootstrap, App, BootstrapOptions, Running, StartupError};
