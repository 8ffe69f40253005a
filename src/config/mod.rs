//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize, env overrides)
//!     → validation.rs (semantic checks)
//!     → ControlConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults so no file is required
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError, GATEWAY_PORT_ENV};
pub use schema::{
    BackupConfig, ControlConfig, GatewayConfig, GatewayMode, ListenerConfig, LogConfig,
    ObservabilityConfig, ObserverSettings, ShutdownConfig,
};
pub use validation::{validate_config, ValidationError};
