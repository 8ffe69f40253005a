//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use gateway_control::config::{ControlConfig, GatewayMode};
use gateway_control::gateway::{EmbeddedLauncher, EmbeddedResult, EmbeddedRun, GatewayError, LaunchSpec};
use gateway_control::lifecycle::{bootstrap, App, BootstrapOptions, Running};
use gateway_control::logs::{LogBuffer, LogKind};

pub const CLIENT_CONFIG: &str = r#"{
  "theme": "dark",
  "mcpServers": {
    "files": {
      "command": "npx",
      "args": ["-y", "@modelcontextprotocol/server-filesystem", "/tmp"]
    },
    "search": {
      "url": "https://search.example.com/mcp"
    }
  }
}
"#;

/// Gateway stand-in that accepts TCP connections on the launch port.
pub struct ListeningLauncher;

impl EmbeddedLauncher for ListeningLauncher {
    fn launch(
        &self,
        spec: &LaunchSpec,
        logs: LogBuffer,
        mut shutdown: oneshot::Receiver<()>,
    ) -> Result<EmbeddedRun, GatewayError> {
        let port = spec.port;
        Ok(Box::pin(async move {
            let listener = TcpListener::bind(("127.0.0.1", port)).await?;
            logs.push(LogKind::Stdout, format!("test gateway listening on {port}"));
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        if let Ok((socket, _)) = accepted {
                            drop(socket);
                        }
                    }
                    _ = &mut shutdown => break,
                }
            }
            EmbeddedResult::Ok(())
        }))
    }
}

/// A port nothing is listening on right now.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Write the sample client config into `dir`.
pub fn write_client_config(dir: &Path) -> PathBuf {
    let path = dir.join("mcp.json");
    std::fs::write(&path, CLIENT_CONFIG).unwrap();
    path
}

/// Backups of `original` sitting next to it.
pub fn backups_beside(original: &Path) -> Vec<PathBuf> {
    let prefix = format!(".{}-", original.file_name().unwrap().to_string_lossy());
    let mut found: Vec<PathBuf> = std::fs::read_dir(original.parent().unwrap())
        .unwrap()
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .map(|name| name.to_string_lossy().starts_with(&prefix))
                .unwrap_or(false)
        })
        .collect();
    found.sort();
    found
}

/// Config for a test app whose gateway state lives in `dir`.
pub fn test_config(dir: &Path) -> ControlConfig {
    let mut config = ControlConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.gateway.mode = GatewayMode::Embedded;
    config.gateway.port = free_port();
    config.gateway.config_path = dir.join("gateway").join("servers.json").display().to_string();
    config.gateway.readiness_timeout_ms = 3000;
    config.gateway.readiness_interval_ms = 20;
    config.gateway.stop_grace_ms = 500;
    config.backups.search_paths = Vec::new();
    config
}

pub struct TestApp {
    pub app: App,
    pub running: Running,
}

impl TestApp {
    pub fn addr(&self) -> SocketAddr {
        self.running.local_addr
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr(), path)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr())
    }
}

/// Bootstrap and serve an app with the listening test gateway.
pub async fn spawn_app(config: ControlConfig) -> TestApp {
    spawn_app_with(config, BootstrapOptions::default()).await
}

pub async fn spawn_app_with(config: ControlConfig, options: BootstrapOptions) -> TestApp {
    let options = BootstrapOptions {
        embedded: Some(Arc::new(ListeningLauncher)),
        ..options
    };
    let app = bootstrap(config, options).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let running = app.serve(listener).unwrap();
    TestApp { app, running }
}

/// Poll `check` until it holds or `timeout` elapses.
pub async fn eventually<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
