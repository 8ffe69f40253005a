//! Gateway running inside the control-plane process.

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::gateway::supervisor::{ExitReport, GatewayError, GatewayHandle, LaunchSpec};
use crate::logs::LogBuffer;

/// Outcome of an embedded gateway run.
pub type EmbeddedResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Future that runs an embedded gateway to completion.
pub type EmbeddedRun = BoxFuture<'static, EmbeddedResult>;

/// Starts an in-process gateway.
///
/// The returned future must resolve soon after `shutdown` fires.
pub trait EmbeddedLauncher: Send + Sync {
    fn launch(
        &self,
        spec: &LaunchSpec,
        logs: LogBuffer,
        shutdown: oneshot::Receiver<()>,
    ) -> Result<EmbeddedRun, GatewayError>;
}

struct StopRequest {
    grace: Duration,
    done: oneshot::Sender<ExitReport>,
}

/// Handle to an in-process gateway task.
pub struct EmbeddedGateway {
    stop_tx: Option<oneshot::Sender<StopRequest>>,
}

impl EmbeddedGateway {
    pub fn spawn(
        launcher: &dyn EmbeddedLauncher,
        spec: &LaunchSpec,
        logs: LogBuffer,
        exit_tx: oneshot::Sender<ExitReport>,
    ) -> Result<Self, GatewayError> {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let run = launcher.launch(spec, logs, shutdown_rx)?;
        let task = tokio::spawn(run);

        tracing::info!(port = spec.port, "Embedded gateway started");

        let (stop_tx, stop_rx) = oneshot::channel();
        tokio::spawn(watch_task(task, shutdown_tx, stop_rx, exit_tx));

        Ok(Self {
            stop_tx: Some(stop_tx),
        })
    }
}

#[async_trait]
impl GatewayHandle for EmbeddedGateway {
    fn pid(&self) -> Option<u32> {
        Some(std::process::id())
    }

    fn kind(&self) -> &'static str {
        "embedded"
    }

    async fn stop(&mut self, grace: Duration) -> Result<(), GatewayError> {
        let Some(stop_tx) = self.stop_tx.take() else {
            return Ok(());
        };
        let (done_tx, done_rx) = oneshot::channel();
        if stop_tx.send(StopRequest { grace, done: done_tx }).is_err() {
            return Ok(());
        }
        let _ = done_rx.await;
        Ok(())
    }
}

type TaskOutput = Result<Result<(), Box<dyn std::error::Error + Send + Sync>>, tokio::task::JoinError>;

enum WatchEvent {
    Finished(TaskOutput),
    Stop(Option<StopRequest>),
}

async fn watch_task(
    mut task: JoinHandle<Result<(), Box<dyn std::error::Error + Send + Sync>>>,
    shutdown_tx: oneshot::Sender<()>,
    mut stop_rx: oneshot::Receiver<StopRequest>,
    exit_tx: oneshot::Sender<ExitReport>,
) {
    let event = tokio::select! {
        output = &mut task => WatchEvent::Finished(output),
        request = &mut stop_rx => WatchEvent::Stop(request.ok()),
    };

    let (output, reply) = match event {
        WatchEvent::Finished(output) => (Some(output), None),
        WatchEvent::Stop(request) => {
            let _ = shutdown_tx.send(());
            let grace = request.as_ref().map_or(Duration::from_secs(5), |r| r.grace);
            let output = match tokio::time::timeout(grace, &mut task).await {
                Ok(output) => Some(output),
                Err(_) => {
                    tracing::warn!("Embedded gateway ignored shutdown, aborting task");
                    task.abort();
                    None
                }
            };
            (output, request.map(|r| r.done))
        }
    };

    let report = match output {
        Some(Ok(Ok(()))) => ExitReport {
            code: Some(0),
            description: "embedded gateway finished".to_string(),
        },
        Some(Ok(Err(e))) => ExitReport {
            code: Some(1),
            description: e.to_string(),
        },
        Some(Err(e)) if e.is_panic() => ExitReport {
            code: Some(101),
            description: format!("embedded gateway panicked: {e}"),
        },
        Some(Err(e)) => ExitReport {
            code: None,
            description: format!("embedded gateway task failed: {e}"),
        },
        None => ExitReport {
            code: None,
            description: "embedded gateway aborted".to_string(),
        },
    };

    let _ = exit_tx.send(report.clone());
    if let Some(done) = reply {
        let _ = done.send(report);
    }
}
