//! Read-only view of captured traffic.

use async_trait::async_trait;
use serde_json::Value;

/// Storage of captured gateway requests.
#[async_trait]
pub trait TrafficSource: Send + Sync {
    /// Timestamp (epoch millis) of the newest captured request, if any.
    async fn latest_timestamp(&self) -> Option<i64>;

    /// The `limit` most recent requests, newest first.
    async fn recent(&self, limit: usize) -> Vec<Value>;
}

/// Source with no captured traffic.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTrafficSource;

#[async_trait]
impl TrafficSource for NullTrafficSource {
    async fn latest_timestamp(&self) -> Option<i64> {
        None
    }

    async fn recent(&self, _limit: usize) -> Vec<Value> {
        Vec::new()
    }
}
