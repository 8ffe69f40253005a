//! Observer WebSocket behaviour over a real socket.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;

use gateway_control::config::ControlConfig;
use gateway_control::lifecycle::BootstrapOptions;
use gateway_control::logs::LogKind;
use gateway_control::observers::TrafficSource;

mod common;

type Client = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

fn fast_heartbeat(dir: &std::path::Path) -> ControlConfig {
    let mut config = common::test_config(dir);
    config.observers.heartbeat_interval_ms = 50;
    config.observers.pong_timeout_ms = 250;
    config
}

async fn connect(test: &common::TestApp) -> Client {
    let (socket, _) = tokio_tungstenite::connect_async(test.ws_url()).await.unwrap();
    socket
}

/// Next text frame as JSON, answering pings along the way.
async fn next_event(client: &mut Client) -> Value {
    let read = async {
        loop {
            match client.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(text.as_str()).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("socket ended: {other:?}"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(3), read).await.unwrap()
}

#[tokio::test]
async fn silent_observer_is_dropped_after_pong_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let test = common::spawn_app(fast_heartbeat(dir.path())).await;
    let hub = Arc::clone(&test.app.hub);

    let _client = connect(&test).await;
    assert!(common::eventually(Duration::from_secs(1), || hub.connection_count() == 1).await);

    // Never polled, so no pong is ever sent
    assert!(common::eventually(Duration::from_secs(2), || hub.connection_count() == 0).await);
}

#[tokio::test]
async fn responsive_observer_stays_connected() {
    let dir = tempfile::tempdir().unwrap();
    let test = common::spawn_app(fast_heartbeat(dir.path())).await;
    let hub = Arc::clone(&test.app.hub);

    let mut client = connect(&test).await;
    let reader = tokio::spawn(async move {
        let mut pings = 0;
        while let Some(Ok(message)) = client.next().await {
            if message.is_ping() {
                pings += 1;
            }
        }
        pings
    });

    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(hub.connection_count(), 1);

    hub.close_all();
    let pings = tokio::time::timeout(Duration::from_secs(2), reader).await.unwrap().unwrap();
    assert!(pings >= 3, "only {pings} pings seen");
}

#[tokio::test]
async fn log_entries_are_broadcast() {
    let dir = tempfile::tempdir().unwrap();
    let test = common::spawn_app(common::test_config(dir.path())).await;
    let hub = Arc::clone(&test.app.hub);

    let mut client = connect(&test).await;
    assert!(common::eventually(Duration::from_secs(1), || hub.connection_count() == 1).await);

    test.app.logs.push(LogKind::Stderr, "listening on 9851");

    let event = next_event(&mut client).await;
    assert_eq!(event["type"], "log");
    assert_eq!(event["data"]["kind"], "stderr");
    assert_eq!(event["data"]["line"], "listening on 9851");
}

struct Ticking;

#[async_trait]
impl TrafficSource for Ticking {
    async fn latest_timestamp(&self) -> Option<i64> {
        Some(chrono::Utc::now().timestamp_millis())
    }

    async fn recent(&self, limit: usize) -> Vec<Value> {
        (0..limit.min(2)).map(|i| json!({ "id": i, "method": "tools/list" })).collect()
    }
}

#[tokio::test]
async fn traffic_snapshots_are_pushed() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::test_config(dir.path());
    config.observers.snapshot_interval_ms = 50;
    let test = common::spawn_app_with(
        config,
        BootstrapOptions {
            traffic: Arc::new(Ticking),
            ..Default::default()
        },
    )
    .await;

    let mut client = connect(&test).await;
    let event = next_event(&mut client).await;
    assert_eq!(event["type"], "update");
    assert_eq!(event["data"][0]["method"], "tools/list");
}

#[tokio::test]
async fn cleanup_closes_observers() {
    let dir = tempfile::tempdir().unwrap();
    let test = common::spawn_app(common::test_config(dir.path())).await;
    let hub = Arc::clone(&test.app.hub);

    let mut client = connect(&test).await;
    assert!(common::eventually(Duration::from_secs(1), || hub.connection_count() == 1).await);

    let report = test.running.coordinator.run().await;
    assert_eq!(report.observers_closed, 1);

    let close = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match client.next().await {
                Some(Ok(Message::Close(frame))) => return frame,
                Some(Ok(_)) => continue,
                _ => return None,
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(close.map(|f| f.code), Some(CloseCode::Away));
    assert!(!hub.is_accepting());
}
