//! Error responses.
//!
//! # Design Decisions
//! - Every failure is `{"error": ..., "details": ...}` with a status from the error kind
//! - Gateway readiness timeouts are 504, like a proxy's upstream timeout

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::backup::BackupError;
use crate::error::ControlError;
use crate::mcp::TransformError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub details: String,
}

/// A [`ControlError`] on its way to the client.
#[derive(Debug)]
pub struct ApiError(pub ControlError);

impl From<ControlError> for ApiError {
    fn from(e: ControlError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(ControlError::BadRequest(message.into()))
    }

    pub fn status(&self) -> StatusCode {
        status_for(&self.0)
    }
}

pub fn status_for(error: &ControlError) -> StatusCode {
    match error {
        ControlError::BadRequest(_)
        | ControlError::InvalidJson(_)
        | ControlError::Transform(TransformError::NoServersFound)
        | ControlError::Transform(TransformError::InvalidServerEntry { .. })
        | ControlError::Backup(BackupError::NotABackup(_)) => StatusCode::BAD_REQUEST,
        ControlError::FileNotFound(_) | ControlError::Backup(BackupError::NotFound(_)) => {
            StatusCode::NOT_FOUND
        }
        ControlError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        ControlError::GatewayNotReady(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn title(error: &ControlError) -> &'static str {
    match error {
        ControlError::BadRequest(_) => "Bad request",
        ControlError::PayloadTooLarge(_) => "Payload too large",
        ControlError::FileNotFound(_) => "File not found",
        ControlError::InvalidJson(_) => "Invalid JSON",
        ControlError::Transform(TransformError::NoServersFound) => "No MCP servers found",
        ControlError::Transform(TransformError::InvalidServerEntry { .. }) => "Invalid server entry",
        ControlError::ProcessSpawn(_) => "Failed to start gateway",
        ControlError::GatewayNotReady(_) => "Gateway not ready",
        ControlError::Backup(_) => "Backup operation failed",
        _ => "Internal error",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, code = self.0.code(), "Request failed");
        }
        let body = ErrorBody {
            error: title(&self.0).to_string(),
            details: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::ReadinessError;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn status_mapping() {
        assert_eq!(ApiError::bad_request("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError(ControlError::FileNotFound(PathBuf::from("/x"))).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError(TransformError::NoServersFound.into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError(
                ReadinessError::PortTimeout {
                    host: "127.0.0.1".to_string(),
                    port: 1,
                    timeout: Duration::from_secs(1),
                }
                .into()
            )
            .status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ApiError(ControlError::ShutdownTimeout(Duration::from_secs(5))).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
