//! Client MCP configuration handling.
//!
//! # Data Flow
//! ```text
//! client config text (mcp.json, claude_desktop_config.json, ...)
//!     → document.rs (parse once, classify entries by transport)
//!     → transform.rs (merge `servers` + `mcpServers` into the gateway's list)
//!     → rewrite.rs (point the client's entries at the gateway)
//! ```
//!
//! # Design Decisions
//! - `servers` wins over `mcpServers` on name collisions
//! - Entries are kept as raw JSON so unknown fields survive the round trip
//! - Transport kind is decided once, at the parse boundary

pub mod document;
pub mod rewrite;
pub mod transform;

pub use document::{ConfigDocument, ServerEntry, TransformError, TransportKind};
pub use rewrite::{gateway_endpoint, rewrite_document};
pub use transform::{transform, ConvertedConfig};
