//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the axum Router with all handlers
//! - Wire up middleware (request id, tracing, timeout, body limit)
//! - Serve on a bound listener until closed

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ListenerConfig;
use crate::http::{handlers, websocket};
use crate::lifecycle::LifecycleOrchestrator;
use crate::logs::LogBuffer;
use crate::observers::BroadcastHub;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<LifecycleOrchestrator>,
    pub hub: Arc<BroadcastHub>,
    pub logs: LogBuffer,
    /// Signalled by `POST /api/shutdown`.
    pub shutdown_requests: Arc<Notify>,
}

/// HTTP server for the control API.
pub struct ControlServer {
    router: Router,
}

impl ControlServer {
    pub fn new(state: AppState, config: &ListenerConfig) -> Self {
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// Build the axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ListenerConfig, state: AppState) -> Router {
        let api = Router::new()
            .route("/setup", post(handlers::setup))
            .route("/stop", post(handlers::stop))
            .route("/status", get(handlers::status))
            .route("/shutdown", post(handlers::shutdown))
            .route("/backups", get(handlers::list_backups))
            .route("/backup/view", get(handlers::view_backup))
            .route("/backup/delete", post(handlers::delete_backup))
            .route("/restore", post(handlers::restore_backup))
            .route("/logs", get(handlers::logs))
            .route("/logs/clear", post(handlers::clear_logs));

        Router::new()
            .nest("/api", api)
            .route("/ws", get(websocket::observer_ws))
            .with_state(state)
            .layer(DefaultBodyLimit::max(config.max_body_bytes))
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs))),
            )
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` in a background task.
    pub fn spawn(self, listener: TcpListener) -> std::io::Result<ServerHandle> {
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tracing::info!(address = %local_addr, "Control API listening");
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, self.router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            tracing::info!("Control API stopped");
            result
        });

        Ok(ServerHandle {
            local_addr,
            shutdown: Some(shutdown_tx),
            task,
        })
    }
}

/// Running server. Closing it stops accepting and waits for the serve task.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<std::io::Result<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop the server; resolves once the listener is released.
    pub async fn close(mut self) -> bool {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match (&mut self.task).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Control API exited with error");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Control API task failed");
                false
            }
        }
    }
}
