//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ControlConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::{ControlConfig, GatewayMode};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &ControlConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.request_timeout_secs", "must be > 0"));
    }
    let setup_budget_ms = config
        .gateway
        .readiness_timeout_ms
        .saturating_add(config.gateway.stop_grace_ms);
    if config.listener.request_timeout_secs.saturating_mul(1000) <= setup_budget_ms {
        errors.push(ValidationError::new(
            "listener.request_timeout_secs",
            "must exceed gateway.readiness_timeout_ms + gateway.stop_grace_ms",
        ));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::new("listener.max_body_bytes", "must be > 0"));
    }

    let gateway = &config.gateway;
    if gateway.mode == GatewayMode::Process && gateway.command.trim().is_empty() {
        errors.push(ValidationError::new("gateway.command", "required in process mode"));
    }
    if gateway.port == 0 {
        errors.push(ValidationError::new("gateway.port", "must be > 0"));
    }
    if gateway.host.trim().is_empty() {
        errors.push(ValidationError::new("gateway.host", "must not be empty"));
    }
    if gateway.config_path.trim().is_empty() {
        errors.push(ValidationError::new("gateway.config_path", "must not be empty"));
    }
    if gateway.readiness_timeout_ms == 0 {
        errors.push(ValidationError::new("gateway.readiness_timeout_ms", "must be > 0"));
    }
    if gateway.readiness_interval_ms == 0 {
        errors.push(ValidationError::new("gateway.readiness_interval_ms", "must be > 0"));
    }

    if config.backups.product_suffix.trim().is_empty() {
        errors.push(ValidationError::new("backups.product_suffix", "must not be empty"));
    }
    if config.backups.product_suffix.contains(['/', '\\']) {
        errors.push(ValidationError::new("backups.product_suffix", "must not contain path separators"));
    }

    let observers = &config.observers;
    if observers.heartbeat_interval_ms == 0 {
        errors.push(ValidationError::new("observers.heartbeat_interval_ms", "must be > 0"));
    }
    if observers.pong_timeout_ms <= observers.heartbeat_interval_ms {
        errors.push(ValidationError::new(
            "observers.pong_timeout_ms",
            "must exceed observers.heartbeat_interval_ms",
        ));
    }
    if observers.snapshot_interval_ms == 0 {
        errors.push(ValidationError::new("observers.snapshot_interval_ms", "must be > 0"));
    }
    if observers.queue_capacity == 0 {
        errors.push(ValidationError::new("observers.queue_capacity", "must be > 0"));
    }

    if config.logs.capacity == 0 {
        errors.push(ValidationError::new("logs.capacity", "must be > 0"));
    }
    if config.shutdown.watchdog_ms == 0 {
        errors.push(ValidationError::new("shutdown.watchdog_ms", "must be > 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&ControlConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = ControlConfig::default();
        config.listener.bind_address = "nowhere".to_string();
        config.gateway.port = 0;
        config.logs.capacity = 0;
        config.observers.pong_timeout_ms = 10;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "gateway.port",
                "observers.pong_timeout_ms",
                "logs.capacity"
            ]
        );
    }

    #[test]
    fn request_timeout_covers_readiness_and_stop_grace() {
        let mut config = ControlConfig::default();
        config.listener.request_timeout_secs = 20;
        config.gateway.readiness_timeout_ms = 15_000;
        config.gateway.stop_grace_ms = 5_000;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "listener.request_timeout_secs");

        config.listener.request_timeout_secs = 21;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn embedded_mode_needs_no_command() {
        let mut config = ControlConfig::default();
        config.gateway.mode = GatewayMode::Embedded;
        config.gateway.command.clear();
        assert!(validate_config(&config).is_ok());
    }
}
