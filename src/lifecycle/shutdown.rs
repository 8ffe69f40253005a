//! Shutdown coordination.
//!
//! # Responsibilities
//! - Broadcast the stop signal to interval tasks
//! - Run the ordered cleanup exactly once
//! - Restore the client config even when async cleanup never completes

use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, OnceCell};

use crate::backup::{BackupStore, OriginalConfigRegistry};
use crate::error::ControlError;
use crate::http::ServerHandle;
use crate::lifecycle::orchestrator::LifecycleOrchestrator;
use crate::observers::BroadcastHub;

/// Broadcast channel that all long-running tasks subscribe to.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Number of tasks still listening.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// What the cleanup sequence did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub gateway_stopped: bool,
    pub config_restored: bool,
    pub observers_closed: usize,
    pub server_closed: bool,
}

/// Ordered, run-once teardown of every subsystem.
pub struct CleanupCoordinator {
    shutdown: Arc<Shutdown>,
    orchestrator: Arc<LifecycleOrchestrator>,
    hub: Arc<BroadcastHub>,
    server: Mutex<Option<ServerHandle>>,
    report: OnceCell<CleanupReport>,
}

impl CleanupCoordinator {
    pub fn new(
        shutdown: Arc<Shutdown>,
        orchestrator: Arc<LifecycleOrchestrator>,
        hub: Arc<BroadcastHub>,
    ) -> Self {
        Self {
            shutdown,
            orchestrator,
            hub,
            server: Mutex::new(None),
            report: OnceCell::new(),
        }
    }

    /// Server to close as the final step.
    pub fn attach_server(&self, handle: ServerHandle) {
        *self.server.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);
    }

    pub fn has_run(&self) -> bool {
        self.report.initialized()
    }

    /// Run cleanup, or wait for the run already in progress.
    pub async fn run(&self) -> CleanupReport {
        self.report.get_or_init(|| self.perform()).await.clone()
    }

    async fn perform(&self) -> CleanupReport {
        tracing::info!("Cleanup starting");
        let mut report = CleanupReport::default();

        self.shutdown.trigger();

        let supervisor = self.orchestrator.supervisor();
        if supervisor.is_active().await {
            match supervisor.stop().await {
                Ok(stopped) => report.gateway_stopped = stopped,
                Err(e) => tracing::warn!(error = %e, "Failed to stop gateway during cleanup"),
            }
        }

        report.config_restored = self
            .orchestrator
            .registry()
            .restore_and_clear(self.orchestrator.backups())
            .await;

        supervisor.forget().await;

        report.observers_closed = self.hub.close_all();
        self.hub.shutdown();

        let server = self.server.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(server) = server {
            report.server_closed = server.close().await;
        }

        tracing::info!(?report, "Cleanup finished");
        report
    }
}

/// Run cleanup under a deadline.
pub async fn run_with_watchdog(
    coordinator: &CleanupCoordinator,
    deadline: Duration,
) -> Result<CleanupReport, ControlError> {
    tokio::time::timeout(deadline, coordinator.run())
        .await
        .map_err(|_| ControlError::ShutdownTimeout(deadline))
}

/// Restores the patched client config with blocking I/O when dropped.
pub struct ExitGuard {
    registry: Arc<OriginalConfigRegistry>,
    backups: BackupStore,
}

impl ExitGuard {
    pub fn new(registry: Arc<OriginalConfigRegistry>, backups: BackupStore) -> Self {
        Self { registry, backups }
    }

    /// Restore now. Returns whether a file was written.
    pub fn restore_now(&self) -> bool {
        if self.registry.is_empty() {
            return false;
        }
        tracing::warn!("Restoring client config on exit path");
        self.registry.restore_blocking(&self.backups)
    }
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.restore_now();
    }
}
