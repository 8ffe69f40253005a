//! Single-instance gateway supervisor.
//!
//! # Responsibilities
//! - Launch the gateway in the configured mode, stopping any previous instance
//! - Track the lifecycle state of the current instance
//! - Turn unexpected exits into error log entries and `on_error` callbacks

use async_trait::async_trait;
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};

use crate::gateway::embedded::{EmbeddedGateway, EmbeddedLauncher};
use crate::gateway::process::{ChildGateway, ProcessLaunch};
use crate::logs::{LogBuffer, LogKind};
use crate::observability::metrics;

/// Errors raised while launching or stopping the gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway program '{program}' not found: {source}")]
    Resolve {
        program: String,
        #[source]
        source: which::Error,
    },

    #[error("failed to spawn gateway: {0}")]
    Spawn(#[source] io::Error),

    #[error("embedded gateway failed to launch: {0}")]
    Launch(String),

    #[error("gateway exited unexpectedly ({0})")]
    Exited(String),
}

impl GatewayError {
    /// Whether the error happened before the gateway was running.
    pub fn is_spawn_failure(&self) -> bool {
        matches!(
            self,
            GatewayError::Resolve { .. } | GatewayError::Spawn(_) | GatewayError::Launch(_)
        )
    }
}

/// Callback invoked when the gateway exits on its own with a failure.
pub type ErrorCallback = Arc<dyn Fn(&GatewayError) + Send + Sync>;

/// What the gateway is started with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Converted server list written for the gateway.
    pub config_path: PathBuf,
    pub port: u16,
}

/// How the gateway is run.
#[derive(Clone)]
pub enum LaunchMode {
    Process(ProcessLaunch),
    Embedded(Arc<dyn EmbeddedLauncher>),
}

impl std::fmt::Debug for LaunchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LaunchMode::Process(launch) => f.debug_tuple("Process").field(launch).finish(),
            LaunchMode::Embedded(_) => f.write_str("Embedded"),
        }
    }
}

/// How an instance ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitReport {
    /// Exit code, `None` when terminated by a signal or aborted.
    pub code: Option<i32>,
    pub description: String,
}

impl ExitReport {
    pub fn from_status(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
            description: status.to_string(),
        }
    }

    /// Only a non-zero exit code is a failure; signal terminations are not.
    pub fn is_failure(&self) -> bool {
        matches!(self.code, Some(code) if code != 0)
    }
}

/// A running gateway instance, whatever its launch mode.
#[async_trait]
pub trait GatewayHandle: Send + Sync {
    fn pid(&self) -> Option<u32>;

    fn kind(&self) -> &'static str;

    /// Stop the instance and wait for it to exit. Calling twice is a no-op.
    async fn stop(&mut self, grace: Duration) -> Result<(), GatewayError>;
}

/// Lifecycle state of the supervised gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayState {
    Stopped,
    Starting,
    Ready,
    Running,
    Stopping,
    Crashed,
}

/// Identity of a started instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceInfo {
    pub id: u64,
    pub pid: Option<u32>,
    pub kind: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayStatus {
    pub running: bool,
    pub pid: Option<u32>,
    pub state: GatewayState,
}

struct Active {
    id: u64,
    pid: Option<u32>,
    handle: Box<dyn GatewayHandle>,
    stop_requested: Arc<AtomicBool>,
}

/// Owns at most one gateway instance.
pub struct GatewaySupervisor {
    mode: LaunchMode,
    logs: LogBuffer,
    stop_grace: Duration,
    slot: Arc<Mutex<Option<Active>>>,
    state: Arc<std::sync::Mutex<GatewayState>>,
    next_id: AtomicU64,
}

impl GatewaySupervisor {
    pub fn new(mode: LaunchMode, logs: LogBuffer, stop_grace: Duration) -> Self {
        Self {
            mode,
            logs,
            stop_grace,
            slot: Arc::new(Mutex::new(None)),
            state: Arc::new(std::sync::Mutex::new(GatewayState::Stopped)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Start a new instance, stopping the current one first.
    pub async fn start(
        &self,
        spec: &LaunchSpec,
        on_error: ErrorCallback,
    ) -> Result<InstanceInfo, GatewayError> {
        if let Err(e) = self.stop().await {
            tracing::warn!(error = %e, "Failed to stop previous gateway instance");
        }

        set_state(&self.state, GatewayState::Starting);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (exit_tx, exit_rx) = oneshot::channel();

        let launched: Result<Box<dyn GatewayHandle>, GatewayError> = match &self.mode {
            LaunchMode::Process(launch) => ChildGateway::spawn(launch, spec, self.logs.clone(), exit_tx)
                .map(|h| Box::new(h) as Box<dyn GatewayHandle>),
            LaunchMode::Embedded(launcher) => {
                EmbeddedGateway::spawn(launcher.as_ref(), spec, self.logs.clone(), exit_tx)
                    .map(|h| Box::new(h) as Box<dyn GatewayHandle>)
            }
        };

        let handle = match launched {
            Ok(handle) => handle,
            Err(e) => {
                set_state(&self.state, GatewayState::Stopped);
                self.logs.push(LogKind::Error, format!("Failed to start gateway: {e}"));
                metrics::record_gateway_event("spawn_failed");
                tracing::error!(error = %e, "Gateway failed to start");
                return Err(e);
            }
        };

        let info = InstanceInfo {
            id,
            pid: handle.pid(),
            kind: handle.kind(),
        };
        let stop_requested = Arc::new(AtomicBool::new(false));

        *self.slot.lock().await = Some(Active {
            id,
            pid: info.pid,
            handle,
            stop_requested: Arc::clone(&stop_requested),
        });

        tokio::spawn(watch_exit(
            id,
            exit_rx,
            stop_requested,
            Arc::clone(&self.slot),
            Arc::clone(&self.state),
            self.logs.clone(),
            on_error,
        ));

        self.logs.push(
            LogKind::Info,
            format!("Gateway started ({}, pid {:?}, port {})", info.kind, info.pid, spec.port),
        );
        metrics::record_gateway_event("started");
        Ok(info)
    }

    /// Stop the current instance. Returns `false` when nothing was running.
    pub async fn stop(&self) -> Result<bool, GatewayError> {
        let Some(mut active) = self.slot.lock().await.take() else {
            return Ok(false);
        };

        active.stop_requested.store(true, Ordering::SeqCst);
        set_state(&self.state, GatewayState::Stopping);
        tracing::info!(id = active.id, pid = active.pid, "Stopping gateway");

        let result = active.handle.stop(self.stop_grace).await;
        set_state(&self.state, GatewayState::Stopped);
        metrics::record_gateway_event("stopped");

        result.map(|_| true)
    }

    pub async fn status(&self) -> GatewayStatus {
        let slot = self.slot.lock().await;
        GatewayStatus {
            running: slot.is_some(),
            pid: slot.as_ref().and_then(|a| a.pid),
            state: self.state(),
        }
    }

    pub async fn is_active(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    pub fn state(&self) -> GatewayState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn mark_ready(&self) {
        transition(&self.state, GatewayState::Starting, GatewayState::Ready);
    }

    pub fn mark_running(&self) {
        transition(&self.state, GatewayState::Ready, GatewayState::Running);
    }

    /// Drop the instance pointer without waiting for the instance.
    ///
    /// Dropping a handle still terminates its instance in the background.
    pub async fn forget(&self) {
        if let Some(active) = self.slot.lock().await.take() {
            active.stop_requested.store(true, Ordering::SeqCst);
            tracing::debug!(id = active.id, "Gateway instance forgotten");
        }
        set_state(&self.state, GatewayState::Stopped);
    }
}

fn set_state(state: &std::sync::Mutex<GatewayState>, next: GatewayState) {
    *state.lock().unwrap_or_else(|p| p.into_inner()) = next;
}

fn transition(state: &std::sync::Mutex<GatewayState>, from: GatewayState, to: GatewayState) {
    let mut current = state.lock().unwrap_or_else(|p| p.into_inner());
    if *current == from {
        *current = to;
    }
}

async fn watch_exit(
    id: u64,
    exit_rx: oneshot::Receiver<ExitReport>,
    stop_requested: Arc<AtomicBool>,
    slot: Arc<Mutex<Option<Active>>>,
    state: Arc<std::sync::Mutex<GatewayState>>,
    logs: LogBuffer,
    on_error: ErrorCallback,
) {
    let Ok(report) = exit_rx.await else {
        return;
    };

    logs.push(LogKind::Exit, format!("Gateway exited: {}", report.description));
    if stop_requested.load(Ordering::SeqCst) {
        return;
    }

    if report.is_failure() {
        let error = GatewayError::Exited(report.description.clone());
        logs.push(LogKind::Error, error.to_string());
        tracing::error!(id, status = %report.description, "Gateway exited unexpectedly");
        metrics::record_gateway_event("crashed");
        set_state(&state, GatewayState::Crashed);
        on_error(&error);
    } else {
        tracing::info!(id, "Gateway exited");
        metrics::record_gateway_event("exited");
        set_state(&state, GatewayState::Stopped);
    }

    let mut slot = slot.lock().await;
    if slot.as_ref().map(|a| a.id) == Some(id) {
        *slot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::embedded::{EmbeddedResult, EmbeddedRun};
    use std::sync::atomic::AtomicUsize;

    /// Runs until shut down, or fails right away when `fail` is set.
    struct TestLauncher {
        fail: bool,
    }

    impl EmbeddedLauncher for TestLauncher {
        fn launch(
            &self,
            _spec: &LaunchSpec,
            _logs: LogBuffer,
            shutdown: oneshot::Receiver<()>,
        ) -> Result<EmbeddedRun, GatewayError> {
            let fail = self.fail;
            Ok(Box::pin(async move {
                if fail {
                    return Err("boom".into());
                }
                let _ = shutdown.await;
                EmbeddedResult::Ok(())
            }))
        }
    }

    fn supervisor(fail: bool) -> (GatewaySupervisor, LogBuffer) {
        let logs = LogBuffer::new(100);
        let supervisor = GatewaySupervisor::new(
            LaunchMode::Embedded(Arc::new(TestLauncher { fail })),
            logs.clone(),
            Duration::from_secs(1),
        );
        (supervisor, logs)
    }

    fn spec() -> LaunchSpec {
        LaunchSpec {
            config_path: PathBuf::from("/tmp/gateway.json"),
            port: 9851,
        }
    }

    fn no_op() -> ErrorCallback {
        Arc::new(|_: &GatewayError| {})
    }

    #[tokio::test]
    async fn stop_without_instance_is_noop() {
        let (supervisor, _) = supervisor(false);
        assert!(!supervisor.stop().await.unwrap());
        assert_eq!(supervisor.state(), GatewayState::Stopped);
    }

    #[tokio::test]
    async fn lifecycle_states() {
        let (supervisor, logs) = supervisor(false);

        supervisor.start(&spec(), no_op()).await.unwrap();
        assert_eq!(supervisor.state(), GatewayState::Starting);
        supervisor.mark_ready();
        supervisor.mark_running();

        let status = supervisor.status().await;
        assert!(status.running);
        assert_eq!(status.state, GatewayState::Running);

        assert!(supervisor.stop().await.unwrap());
        assert!(!supervisor.stop().await.unwrap());
        assert!(!supervisor.status().await.running);
        assert_eq!(supervisor.state(), GatewayState::Stopped);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!logs.snapshot().iter().any(|e| e.kind == LogKind::Error));
    }

    #[tokio::test]
    async fn start_replaces_previous_instance() {
        let (supervisor, _) = supervisor(false);
        let first = supervisor.start(&spec(), no_op()).await.unwrap();
        let second = supervisor.start(&spec(), no_op()).await.unwrap();

        assert_ne!(first.id, second.id);
        assert!(supervisor.is_active().await);
        assert!(supervisor.stop().await.unwrap());
    }

    #[tokio::test]
    async fn unexpected_failure_reports_error() {
        let (supervisor, logs) = supervisor(true);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        supervisor
            .start(&spec(), Arc::new(move |_: &GatewayError| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .await
            .unwrap();

        for _ in 0..50 {
            if !supervisor.is_active().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert!(!supervisor.is_active().await);
        assert_eq!(supervisor.state(), GatewayState::Crashed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let entries = logs.snapshot();
        assert!(entries.iter().any(|e| e.kind == LogKind::Exit));
        assert!(entries.iter().any(|e| e.kind == LogKind::Error && e.line.contains("boom")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn signal_exit_is_not_a_crash() {
        let logs = LogBuffer::new(100);
        let supervisor = GatewaySupervisor::new(
            LaunchMode::Process(ProcessLaunch {
                program: "sh".to_string(),
                args: vec!["-c".to_string(), "kill -TERM $$".to_string()],
                env: Default::default(),
                forward_output: false,
                resolver: Arc::new(crate::gateway::path::InheritedSearchPath),
            }),
            logs.clone(),
            Duration::from_secs(1),
        );
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        supervisor
            .start(&spec(), Arc::new(move |_: &GatewayError| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .await
            .unwrap();

        for _ in 0..100 {
            if !supervisor.is_active().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert!(!supervisor.is_active().await);
        assert_eq!(supervisor.state(), GatewayState::Stopped);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let entries = logs.snapshot();
        assert!(entries.iter().any(|e| e.kind == LogKind::Exit));
        assert!(!entries.iter().any(|e| e.kind == LogKind::Error));
    }

    #[test]
    fn only_nonzero_codes_are_failures() {
        let report = |code| ExitReport {
            code,
            description: String::new(),
        };
        assert!(report(Some(3)).is_failure());
        assert!(!report(Some(0)).is_failure());
        assert!(!report(None).is_failure());
    }

    #[tokio::test]
    async fn spawn_failure_is_logged() {
        let logs = LogBuffer::new(10);
        let supervisor = GatewaySupervisor::new(
            LaunchMode::Process(ProcessLaunch {
                program: "definitely-not-a-gateway-binary".to_string(),
                args: Vec::new(),
                env: Default::default(),
                forward_output: false,
                resolver: Arc::new(crate::gateway::path::InheritedSearchPath),
            }),
            logs.clone(),
            Duration::from_secs(1),
        );

        let err = supervisor.start(&spec(), no_op()).await.unwrap_err();
        assert!(err.is_spawn_failure());
        assert_eq!(supervisor.state(), GatewayState::Stopped);
        assert!(logs.snapshot().iter().any(|e| e.kind == LogKind::Error));
    }
}
