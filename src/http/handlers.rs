//! JSON handlers for the control API.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use crate::backup::{BackupRecord, BackupView};
use crate::error::ControlError;
use crate::gateway::GatewayStatus;
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::lifecycle::{SetupOutcome, SetupRequest, StopOutcome};
use crate::logs::LogEntry;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupQuery {
    pub backup_path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreRequest {
    pub backup_path: String,
    pub original_path: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreResponse {
    pub success: bool,
    pub original_path: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct BackupList {
    pub backups: Vec<BackupRecord>,
}

#[derive(Debug, Serialize)]
pub struct LogList {
    pub logs: Vec<LogEntry>,
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload.map(|Json(value)| value).map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError(ControlError::PayloadTooLarge(rejection.body_text()))
        } else {
            ApiError::bad_request(rejection.body_text())
        }
    })
}

/// Run a lifecycle operation on its own task.
///
/// The operation finishes even if the client disconnects or the request
/// times out and this handler's future is dropped.
async fn run_detached<F, T>(operation: F) -> Result<T, ApiError>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(operation)
        .await
        .map_err(|e| ApiError(ControlError::TaskFailed(e.to_string())))
}

pub async fn setup(
    State(state): State<AppState>,
    payload: Result<Json<SetupRequest>, JsonRejection>,
) -> Result<Json<SetupOutcome>, ApiError> {
    let request = body(payload)?;
    let orchestrator = Arc::clone(&state.orchestrator);
    let outcome = run_detached(async move { orchestrator.setup(request).await }).await??;
    Ok(Json(outcome))
}

pub async fn stop(State(state): State<AppState>) -> Result<Json<StopOutcome>, ApiError> {
    let orchestrator = Arc::clone(&state.orchestrator);
    let outcome = run_detached(async move { orchestrator.stop().await }).await?;
    Ok(Json(outcome))
}

pub async fn status(State(state): State<AppState>) -> Json<GatewayStatus> {
    Json(state.orchestrator.status().await)
}

/// Acknowledge, then let the main task run cleanup.
pub async fn shutdown(State(state): State<AppState>) -> Json<Value> {
    tracing::info!("Shutdown requested over HTTP");
    state.shutdown_requests.notify_one();
    Json(json!({
        "success": true,
        "message": "Shutting down",
    }))
}

pub async fn list_backups(State(state): State<AppState>) -> Json<BackupList> {
    Json(BackupList {
        backups: state.orchestrator.list_backups().await,
    })
}

pub async fn view_backup(
    State(state): State<AppState>,
    query: Result<Query<BackupQuery>, axum::extract::rejection::QueryRejection>,
) -> Result<Json<BackupView>, ApiError> {
    let Query(query) = query.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    Ok(Json(state.orchestrator.view_backup(&query.backup_path).await?))
}

pub async fn restore_backup(
    State(state): State<AppState>,
    payload: Result<Json<RestoreRequest>, JsonRejection>,
) -> Result<Json<RestoreResponse>, ApiError> {
    let request = body(payload)?;
    let orchestrator = Arc::clone(&state.orchestrator);
    let original_path = run_detached(async move {
        orchestrator
            .restore_backup(&request.backup_path, request.original_path.as_deref())
            .await
    })
    .await??;
    Ok(Json(RestoreResponse {
        success: true,
        original_path,
    }))
}

pub async fn delete_backup(
    State(state): State<AppState>,
    payload: Result<Json<BackupQuery>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let request = body(payload)?;
    state.orchestrator.delete_backup(&request.backup_path).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn logs(State(state): State<AppState>) -> Json<LogList> {
    Json(LogList {
        logs: state.logs.snapshot(),
    })
}

pub async fn clear_logs(State(state): State<AppState>) -> Json<Value> {
    state.logs.clear();
    Json(json!({ "success": true }))
}
