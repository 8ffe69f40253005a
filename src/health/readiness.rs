//! TCP readiness polling.

use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{self, Instant};

/// Interval between connection attempts.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, thiserror::Error)]
pub enum ReadinessError {
    #[error("{host}:{port} did not accept connections within {}ms", timeout.as_millis())]
    PortTimeout {
        host: String,
        port: u16,
        timeout: Duration,
    },
}

/// Polls a TCP port until it accepts a connection.
#[derive(Debug, Clone)]
pub struct ReadinessPoller {
    interval: Duration,
}

impl ReadinessPoller {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Resolve once `host:port` accepts a connection, or fail after `timeout`.
    pub async fn wait_until_ready(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<(), ReadinessError> {
        let deadline = Instant::now() + timeout;
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            match time::timeout(remaining, TcpStream::connect((host, port))).await {
                Ok(Ok(_stream)) => {
                    tracing::debug!(host, port, attempts, "Port accepting connections");
                    return Ok(());
                }
                Ok(Err(e)) => {
                    tracing::trace!(host, port, attempts, error = %e, "Port not ready yet");
                }
                Err(_) => break,
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            time::sleep(self.interval.min(remaining)).await;
        }

        tracing::warn!(host, port, attempts, timeout_ms = timeout.as_millis() as u64, "Readiness timed out");
        Err(ReadinessError::PortTimeout {
            host: host.to_string(),
            port,
            timeout,
        })
    }
}

impl Default for ReadinessPoller {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}
