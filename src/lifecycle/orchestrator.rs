//! Setup and stop of a gateway session.
//!
//! # Data Flow
//! ```text
//! setup(request):
//!     reset logs → resolve input → parse → transform → write gateway config
//!     → supervisor.start → readiness → rewrite client entries
//!     → backup + registry → write client config → outcome
//!
//! stop():
//!     supervisor.stop → registry.restore_and_clear
//! ```
//!
//! # Design Decisions
//! - One lifecycle operation at a time (operation mutex)
//! - A failed readiness check stops the new instance; nothing else is rolled back
//! - A file path always wins over inline content

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;

use crate::backup::atomic::write_atomic;
use crate::backup::{BackupRecord, BackupStore, BackupView, OriginalConfigRecord, OriginalConfigRegistry};
use crate::config::{ControlConfig, GatewayConfig};
use crate::error::ControlError;
use crate::gateway::{ErrorCallback, GatewayError, GatewayStatus, GatewaySupervisor, LaunchSpec};
use crate::health::ReadinessPoller;
use crate::logs::{LogBuffer, LogKind};
use crate::mcp::{rewrite_document, transform, ConfigDocument, ConvertedConfig};
use crate::observability::metrics;

/// Body of a setup call.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupRequest {
    pub file_path: Option<String>,
    pub file_content: Option<String>,
    pub selected_services: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupOutcome {
    pub success: bool,
    pub converted_config: ConvertedConfig,
    pub updated_config: Value,
    pub file_path: Option<PathBuf>,
    pub backup_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopOutcome {
    pub success: bool,
    pub message: String,
    pub restored: bool,
}

/// Drives setup and stop across the gateway, backups and the registry.
pub struct LifecycleOrchestrator {
    gateway: GatewayConfig,
    search_paths: Vec<PathBuf>,
    supervisor: Arc<GatewaySupervisor>,
    registry: Arc<OriginalConfigRegistry>,
    backups: BackupStore,
    logs: LogBuffer,
    readiness: ReadinessPoller,
    operation: Mutex<()>,
}

impl LifecycleOrchestrator {
    pub fn new(
        config: &ControlConfig,
        supervisor: Arc<GatewaySupervisor>,
        registry: Arc<OriginalConfigRegistry>,
        logs: LogBuffer,
    ) -> Self {
        Self {
            gateway: config.gateway.clone(),
            search_paths: config.backups.resolved_search_paths(),
            supervisor,
            registry,
            backups: BackupStore::new(config.backups.product_suffix.clone()),
            logs,
            readiness: ReadinessPoller::new(config.gateway.readiness_interval()),
            operation: Mutex::new(()),
        }
    }

    pub fn supervisor(&self) -> &Arc<GatewaySupervisor> {
        &self.supervisor
    }

    pub fn registry(&self) -> &Arc<OriginalConfigRegistry> {
        &self.registry
    }

    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    pub fn logs(&self) -> &LogBuffer {
        &self.logs
    }

    pub fn gateway_port(&self) -> u16 {
        self.gateway.port
    }

    /// Route a client config through a freshly started gateway.
    pub async fn setup(&self, request: SetupRequest) -> Result<SetupOutcome, ControlError> {
        let _guard = self.operation.lock().await;

        let result = self.run_setup(request).await;
        match &result {
            Ok(outcome) => {
                metrics::record_setup("success");
                tracing::info!(
                    servers = outcome.converted_config.len(),
                    file = ?outcome.file_path,
                    "Setup complete"
                );
            }
            Err(e) => {
                metrics::record_setup(e.code());
                self.logs.push(LogKind::Error, format!("Setup failed: {e}"));
                tracing::warn!(error = %e, "Setup failed");
            }
        }
        result
    }

    async fn run_setup(&self, request: SetupRequest) -> Result<SetupOutcome, ControlError> {
        self.logs.clear();

        let file_path = request
            .file_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(expand_path);
        let selection = request.selected_services.filter(|s| !s.is_empty());

        if let Some(path) = &file_path {
            self.restore_stale_record(path).await;
        }

        let original_text = match &file_path {
            Some(path) => {
                if !fs::try_exists(path).await.unwrap_or(false) {
                    return Err(ControlError::FileNotFound(path.clone()));
                }
                fs::read_to_string(path)
                    .await
                    .map_err(|e| ControlError::io(path, e))?
            }
            None => match request.file_content {
                Some(content) if !content.trim().is_empty() => content,
                _ => {
                    return Err(ControlError::BadRequest(
                        "either filePath or fileContent is required".to_string(),
                    ))
                }
            },
        };

        let mut document = ConfigDocument::parse(&original_text).map_err(ControlError::InvalidJson)?;
        let converted = transform(&document, selection.as_deref())?;
        self.logs.push(
            LogKind::Info,
            format!("Converted {} server(s): {}", converted.len(), converted.names().collect::<Vec<_>>().join(", ")),
        );

        let gateway_config_path = self.gateway.resolved_config_path();
        let body = serde_json::to_vec_pretty(&converted).map_err(|e| ControlError::io(&gateway_config_path, e.into()))?;
        write_atomic(&gateway_config_path, &body)
            .await
            .map_err(|e| ControlError::io(&gateway_config_path, e))?;

        let port = self.gateway.port;
        let spec = LaunchSpec {
            config_path: gateway_config_path,
            port,
        };
        self.supervisor.start(&spec, self.crash_hook()).await?;

        if let Err(e) = self
            .readiness
            .wait_until_ready(&self.gateway.host, port, self.gateway.readiness_timeout())
            .await
        {
            if let Err(stop_err) = self.supervisor.stop().await {
                tracing::warn!(error = %stop_err, "Failed to stop gateway after readiness timeout");
            }
            return Err(e.into());
        }
        self.supervisor.mark_ready();
        self.logs.push(LogKind::Info, format!("Gateway ready on port {port}"));

        let selected = selection.unwrap_or_else(|| document.server_names());
        let rewritten = rewrite_document(&mut document, &selected, port);

        self.restore_replaced_record().await;

        let mut backup_path = None;
        match &file_path {
            Some(path) => {
                backup_path = match self.backups.create_or_skip(path).await? {
                    Some(created) => {
                        self.logs.push(LogKind::Info, format!("Backup created: {}", created.display()));
                        Some(created)
                    }
                    None => {
                        self.logs.push(LogKind::Info, "Backup skipped, no changes since latest backup");
                        self.backups.find_latest(path).await.unwrap_or(None)
                    }
                };

                self.registry.store(OriginalConfigRecord {
                    file_path: path.clone(),
                    original_content: original_text,
                    backup_path: backup_path.clone(),
                });

                let updated = document.to_pretty_string().map_err(|e| ControlError::io(path, e.into()))?;
                write_atomic(path, updated.as_bytes())
                    .await
                    .map_err(|e| ControlError::io(path, e))?;
                self.logs.push(
                    LogKind::Info,
                    format!("Rewrote {} entr(ies) in {}", rewritten.len(), path.display()),
                );
            }
            None => self.registry.clear(),
        }

        self.supervisor.mark_running();

        Ok(SetupOutcome {
            success: true,
            converted_config: converted,
            updated_config: document.into_value(),
            file_path,
            backup_path,
        })
    }

    /// Restore a record left over from a session that was never stopped.
    async fn restore_stale_record(&self, path: &Path) {
        let Some(record) = self.registry.current() else {
            return;
        };
        if record.file_path != path {
            return;
        }
        tracing::info!(path = %path.display(), "Restoring config patched by a previous session");
        self.registry.restore_and_clear(&self.backups).await;
    }

    /// Restore a record about to be replaced by this session's record.
    async fn restore_replaced_record(&self) {
        let Some(record) = self.registry.current() else {
            return;
        };
        tracing::info!(
            path = %record.file_path.display(),
            "Restoring config patched by the previous session before replacing it"
        );
        if self.registry.restore_and_clear(&self.backups).await {
            self.logs.push(
                LogKind::Info,
                format!("Restored previous config {}", record.file_path.display()),
            );
        }
    }

    fn crash_hook(&self) -> ErrorCallback {
        let registry = Arc::clone(&self.registry);
        Arc::new(move |error: &GatewayError| {
            if let Some(record) = registry.current() {
                tracing::warn!(
                    error = %error,
                    path = %record.file_path.display(),
                    "Gateway crashed while a client config points at it"
                );
            }
        })
    }

    /// Stop the gateway and restore the patched client config.
    pub async fn stop(&self) -> StopOutcome {
        let _guard = self.operation.lock().await;

        let stopped = match self.supervisor.stop().await {
            Ok(stopped) => stopped,
            Err(e) => {
                tracing::warn!(error = %e, "Gateway stop reported an error");
                true
            }
        };

        if !stopped {
            return StopOutcome {
                success: true,
                message: "Gateway is not running".to_string(),
                restored: false,
            };
        }

        let restored = self.registry.restore_and_clear(&self.backups).await;
        let message = if restored {
            "Gateway stopped and original config restored"
        } else {
            "Gateway stopped"
        };
        self.logs.push(LogKind::Info, message);

        StopOutcome {
            success: true,
            message: message.to_string(),
            restored,
        }
    }

    pub async fn status(&self) -> GatewayStatus {
        self.supervisor.status().await
    }

    /// Backups of every known client config plus the currently patched file.
    pub async fn list_backups(&self) -> Vec<BackupRecord> {
        let mut paths = self.search_paths.clone();
        if let Some(record) = self.registry.current() {
            if !paths.contains(&record.file_path) {
                paths.push(record.file_path);
            }
        }
        self.backups.list(&paths).await
    }

    pub async fn view_backup(&self, backup_path: &str) -> Result<BackupView, ControlError> {
        Ok(self.backups.view(&expand_path(backup_path)).await?)
    }

    /// Copy a backup over its original file. Returns the path written.
    pub async fn restore_backup(
        &self,
        backup_path: &str,
        original_path: Option<&str>,
    ) -> Result<PathBuf, ControlError> {
        let _guard = self.operation.lock().await;

        let original = original_path.map(str::trim).filter(|p| !p.is_empty()).map(expand_path);
        let target = self
            .backups
            .restore_backup(&expand_path(backup_path), original.as_deref())
            .await?;

        // A later stop must not overwrite the chosen version
        if self.registry.current().is_some_and(|r| r.file_path == target) {
            self.registry.clear();
        }
        self.logs.push(LogKind::Info, format!("Restored backup to {}", target.display()));
        Ok(target)
    }

    pub async fn delete_backup(&self, backup_path: &str) -> Result<(), ControlError> {
        Ok(self.backups.delete(&expand_path(backup_path)).await?)
    }
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}
