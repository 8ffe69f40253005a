//! Startup orchestration.
//!
//! # Responsibilities
//! - Build every subsystem from a validated config, in dependency order
//! - Bind the listener and start background tasks
//! - Hand back the pieces needed to shut down cleanly
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listener starts last (traffic only when ready)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::backup::{BackupStore, OriginalConfigRegistry};
use crate::config::{ControlConfig, GatewayMode};
use crate::gateway::{
    EmbeddedLauncher, GatewaySupervisor, InheritedSearchPath, LaunchMode, ProcessLaunch,
    SearchPathResolver,
};
use crate::http::{AppState, ControlServer};
use crate::lifecycle::orchestrator::LifecycleOrchestrator;
use crate::lifecycle::shutdown::{CleanupCoordinator, ExitGuard, Shutdown};
use crate::logs::LogBuffer;
use crate::observers::{spawn_log_forwarder, BroadcastHub, NullTrafficSource, ObserverConfig, SnapshotPoller, TrafficSource};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("gateway.mode is \"embedded\" but no embedded launcher was provided")]
    MissingEmbeddedLauncher,

    #[error("failed to start control API: {0}")]
    Serve(#[source] std::io::Error),
}

/// Pluggable collaborators; defaults suit the standalone binary.
pub struct BootstrapOptions {
    pub embedded: Option<Arc<dyn EmbeddedLauncher>>,
    pub traffic: Arc<dyn TrafficSource>,
    pub search_path: Arc<dyn SearchPathResolver>,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            embedded: None,
            traffic: Arc::new(NullTrafficSource),
            search_path: Arc::new(InheritedSearchPath),
        }
    }
}

/// Every long-lived subsystem, wired together.
pub struct App {
    pub config: Arc<ControlConfig>,
    pub logs: LogBuffer,
    pub hub: Arc<BroadcastHub>,
    pub orchestrator: Arc<LifecycleOrchestrator>,
    pub shutdown: Arc<Shutdown>,
    pub shutdown_requests: Arc<Notify>,
    traffic: Arc<dyn TrafficSource>,
}

/// A serving [`App`].
pub struct Running {
    pub local_addr: SocketAddr,
    pub coordinator: Arc<CleanupCoordinator>,
    pub exit_guard: ExitGuard,
    pub tasks: Vec<JoinHandle<()>>,
}

/// Build the subsystems described by `config`.
pub fn bootstrap(config: ControlConfig, options: BootstrapOptions) -> Result<App, StartupError> {
    let config = Arc::new(config);
    let logs = LogBuffer::new(config.logs.capacity);

    let mode = match config.gateway.mode {
        GatewayMode::Process => LaunchMode::Process(ProcessLaunch {
            program: config.gateway.command.clone(),
            args: config.gateway.args.clone(),
            env: config.gateway.env.clone(),
            forward_output: config.gateway.forward_output,
            resolver: options.search_path,
        }),
        GatewayMode::Embedded => {
            LaunchMode::Embedded(options.embedded.ok_or(StartupError::MissingEmbeddedLauncher)?)
        }
    };

    let supervisor = Arc::new(GatewaySupervisor::new(mode, logs.clone(), config.gateway.stop_grace()));
    let registry = Arc::new(OriginalConfigRegistry::new());
    let orchestrator = Arc::new(LifecycleOrchestrator::new(&config, supervisor, registry, logs.clone()));

    let hub = Arc::new(BroadcastHub::new(ObserverConfig {
        heartbeat_interval: Duration::from_millis(config.observers.heartbeat_interval_ms),
        pong_timeout: Duration::from_millis(config.observers.pong_timeout_ms),
        queue_capacity: config.observers.queue_capacity,
    }));

    tracing::info!(
        mode = ?config.gateway.mode,
        gateway_port = config.gateway.port,
        "Subsystems initialized"
    );

    Ok(App {
        config,
        logs,
        hub,
        orchestrator,
        shutdown: Arc::new(Shutdown::new()),
        shutdown_requests: Arc::new(Notify::new()),
        traffic: options.traffic,
    })
}

impl App {
    pub fn state(&self) -> AppState {
        AppState {
            orchestrator: Arc::clone(&self.orchestrator),
            hub: Arc::clone(&self.hub),
            logs: self.logs.clone(),
            shutdown_requests: Arc::clone(&self.shutdown_requests),
        }
    }

    /// Start the log forwarder and the snapshot poller.
    pub fn spawn_background(&self) -> Vec<JoinHandle<()>> {
        let forwarder = spawn_log_forwarder(Arc::clone(&self.hub), &self.logs, self.shutdown.subscribe());

        let poller = SnapshotPoller::new(
            Arc::clone(&self.hub),
            Arc::clone(&self.traffic),
            Duration::from_millis(self.config.observers.snapshot_interval_ms),
            self.config.observers.snapshot_limit,
        );
        let snapshots = tokio::spawn(poller.run(self.shutdown.subscribe()));

        vec![forwarder, snapshots]
    }

    /// Serve on `listener` and start background tasks.
    pub fn serve(&self, listener: TcpListener) -> Result<Running, StartupError> {
        let server = ControlServer::new(self.state(), &self.config.listener)
            .spawn(listener)
            .map_err(StartupError::Serve)?;
        let local_addr = server.local_addr();
        let tasks = self.spawn_background();

        let coordinator = Arc::new(CleanupCoordinator::new(
            Arc::clone(&self.shutdown),
            Arc::clone(&self.orchestrator),
            Arc::clone(&self.hub),
        ));
        coordinator.attach_server(server);

        let exit_guard = ExitGuard::new(
            Arc::clone(self.orchestrator.registry()),
            BackupStore::clone(self.orchestrator.backups()),
        );

        Ok(Running {
            local_addr,
            coordinator,
            exit_guard,
            tasks,
        })
    }
}
