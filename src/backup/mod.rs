//! Backups of client configuration files and the record of the file currently patched.
//!
//! # Data Flow
//! ```text
//! setup:
//!     store.rs create_or_skip (dedupe against latest backup)
//!     → registry.rs store (path, original bytes, backup path)
//!
//! stop / shutdown / process exit:
//!     registry.rs restore_and_clear
//!     → store.rs restore (write original bytes back)
//! ```
//!
//! # Design Decisions
//! - Backups live next to the file they protect, hidden (dot-prefixed)
//! - A backup is skipped when its content matches the latest one
//! - Restore never fails loudly: it runs on best-effort shutdown paths

pub mod atomic;
pub mod registry;
pub mod store;

pub use registry::{OriginalConfigRecord, OriginalConfigRegistry};
pub use store::{BackupError, BackupRecord, BackupStore, BackupView};
