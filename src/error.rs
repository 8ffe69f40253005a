//! Errors surfaced by lifecycle operations.

use std::path::PathBuf;
use std::time::Duration;

use crate::backup::BackupError;
use crate::gateway::GatewayError;
use crate::health::ReadinessError;
use crate::mcp::TransformError;

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error("failed to start gateway: {0}")]
    ProcessSpawn(#[source] GatewayError),

    #[error("gateway did not become ready: {0}")]
    GatewayNotReady(#[from] ReadinessError),

    #[error("cleanup did not finish within {}ms", .0.as_millis())]
    ShutdownTimeout(Duration),

    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Gateway(GatewayError),

    #[error("lifecycle task failed: {0}")]
    TaskFailed(String),
}

impl From<GatewayError> for ControlError {
    fn from(e: GatewayError) -> Self {
        if e.is_spawn_failure() {
            ControlError::ProcessSpawn(e)
        } else {
            ControlError::Gateway(e)
        }
    }
}

impl ControlError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ControlError::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable machine-readable name.
    pub fn code(&self) -> &'static str {
        match self {
            ControlError::BadRequest(_) => "bad_request",
            ControlError::PayloadTooLarge(_) => "payload_too_large",
            ControlError::FileNotFound(_) => "file_not_found",
            ControlError::InvalidJson(_) => "invalid_json",
            ControlError::Transform(TransformError::NoServersFound) => "no_servers_found",
            ControlError::Transform(TransformError::InvalidServerEntry { .. }) => "invalid_server_entry",
            ControlError::ProcessSpawn(_) => "process_spawn",
            ControlError::GatewayNotReady(_) => "gateway_not_ready",
            ControlError::ShutdownTimeout(_) => "shutdown_timeout",
            ControlError::Backup(BackupError::NotFound(_)) => "backup_not_found",
            ControlError::Backup(BackupError::NotABackup(_)) => "not_a_backup",
            ControlError::Backup(_) => "backup",
            ControlError::Io { .. } => "io",
            ControlError::Gateway(_) => "gateway",
            ControlError::TaskFailed(_) => "task_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_failures_map_to_process_spawn() {
        let err: ControlError = GatewayError::Spawn(std::io::Error::other("nope")).into();
        assert_eq!(err.code(), "process_spawn");

        let err: ControlError = GatewayError::Exited("exit status: 1".to_string()).into();
        assert_eq!(err.code(), "gateway");
    }

    #[test]
    fn transform_errors_keep_their_message() {
        let err: ControlError = TransformError::NoServersFound.into();
        assert_eq!(err.code(), "no_servers_found");
        assert_eq!(err.to_string(), TransformError::NoServersFound.to_string());
    }
}
