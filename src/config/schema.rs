//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for the control plane.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ControlConfig {
    /// Control API listener.
    pub listener: ListenerConfig,

    /// How the gateway is launched and reached.
    pub gateway: GatewayConfig,

    /// Backup naming and discovery.
    pub backups: BackupConfig,

    /// Observer WebSocket liveness and snapshot push.
    pub observers: ObserverSettings,

    pub logs: LogConfig,

    pub shutdown: ShutdownConfig,

    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:9850").
    pub bind_address: String,

    /// Per-request timeout in seconds. Setup waits for gateway readiness,
    /// so this must exceed the readiness timeout.
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:9850".to_string(),
            request_timeout_secs: 60,
            max_body_bytes: 4 * 1024 * 1024,
        }
    }
}

/// Gateway launch mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayMode {
    /// Separate child process.
    Process,
    /// In-process future supplied by the embedding application.
    Embedded,
}

/// Gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub mode: GatewayMode,

    /// Program to run in process mode.
    pub command: String,

    /// Arguments; `{config}` and `{port}` are substituted at launch.
    pub args: Vec<String>,

    /// Host probed for readiness.
    pub host: String,

    pub port: u16,

    /// Where the converted server list is written. `~` is expanded.
    pub config_path: String,

    pub readiness_timeout_ms: u64,

    pub readiness_interval_ms: u64,

    /// Grace period between SIGTERM and SIGKILL.
    pub stop_grace_ms: u64,

    /// Copy gateway output to our own stdout/stderr.
    pub forward_output: bool,

    /// Extra environment for the child process.
    pub env: BTreeMap<String, String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            mode: GatewayMode::Process,
            command: "mcp-gateway".to_string(),
            args: vec![
                "--config".to_string(),
                "{config}".to_string(),
                "--port".to_string(),
                "{port}".to_string(),
            ],
            host: "127.0.0.1".to_string(),
            port: 9851,
            config_path: "~/.mcp-gateway/servers.json".to_string(),
            readiness_timeout_ms: 15_000,
            readiness_interval_ms: 200,
            stop_grace_ms: 5_000,
            forward_output: true,
            env: BTreeMap::new(),
        }
    }
}

impl GatewayConfig {
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }

    pub fn readiness_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_interval_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    /// `config_path` with `~` expanded.
    pub fn resolved_config_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.config_path).into_owned())
    }
}

/// Backup configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Product name embedded in backup file names.
    pub product_suffix: String,

    /// Client config files whose backups are listed. `~` is expanded.
    pub search_paths: Vec<String>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            product_suffix: "mcp-gateway".to_string(),
            search_paths: default_search_paths(),
        }
    }
}

impl BackupConfig {
    pub fn resolved_search_paths(&self) -> Vec<PathBuf> {
        self.search_paths
            .iter()
            .map(|p| PathBuf::from(shellexpand::tilde(p).into_owned()))
            .collect()
    }
}

/// Well-known MCP client configuration files.
fn default_search_paths() -> Vec<String> {
    let mut paths = vec![
        "~/.cursor/mcp.json".to_string(),
        "~/.codeium/windsurf/mcp_config.json".to_string(),
        "~/.claude.json".to_string(),
        "~/.vscode/mcp.json".to_string(),
    ];
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(
            config_dir
                .join("Claude")
                .join("claude_desktop_config.json")
                .display()
                .to_string(),
        );
    }
    paths
}

/// Observer WebSocket settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObserverSettings {
    pub heartbeat_interval_ms: u64,

    /// Connections with no Pong for this long are closed.
    pub pong_timeout_ms: u64,

    pub snapshot_interval_ms: u64,

    /// Requests included in each traffic snapshot.
    pub snapshot_limit: usize,

    /// Outbound frames buffered per connection; overflowing closes it.
    pub queue_capacity: usize,
}

impl Default for ObserverSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 30_000,
            pong_timeout_ms: 60_000,
            snapshot_interval_ms: 2_000,
            snapshot_limit: 100,
            queue_capacity: 256,
        }
    }
}

/// Log buffer settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    pub capacity: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            capacity: crate::logs::DEFAULT_CAPACITY,
        }
    }
}

/// Shutdown settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Cleanup deadline before the process force-exits.
    pub watchdog_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { watchdog_ms: 5_000 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9852".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: ControlConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:9850");
        assert_eq!(config.gateway.port, 9851);
        assert_eq!(config.gateway.mode, GatewayMode::Process);
        assert_eq!(config.gateway.readiness_timeout(), Duration::from_secs(15));
        assert_eq!(config.logs.capacity, 10_000);
        assert_eq!(config.observers.heartbeat_interval_ms, 30_000);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: ControlConfig = toml::from_str(
            r#"
            [gateway]
            mode = "embedded"
            port = 7000

            [backups]
            search_paths = ["~/custom/mcp.json"]
            "#,
        )
        .unwrap();

        assert_eq!(config.gateway.mode, GatewayMode::Embedded);
        assert_eq!(config.gateway.port, 7000);
        assert_eq!(config.gateway.stop_grace_ms, 5_000);
        assert_eq!(config.backups.product_suffix, "mcp-gateway");
        assert!(!config.backups.resolved_search_paths()[0].starts_with("~"));
    }
}
