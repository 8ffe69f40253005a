//! Local control plane for a traffic-capturing MCP gateway.

pub mod backup;
pub mod config;
pub mod error;
pub mod gateway;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod logs;
pub mod mcp;
pub mod net;
pub mod observability;
pub mod observers;

pub use config::ControlConfig;
pub use error::ControlError;
pub use lifecycle::{bootstrap, App, BootstrapOptions, LifecycleOrchestrator, Shutdown};
