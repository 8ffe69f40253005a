//! Control API over HTTP.

use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;

mod common;

async fn post(client: &reqwest::Client, url: String, body: Value) -> (StatusCode, Value) {
    let res = client.post(url).json(&body).send().await.unwrap();
    let status = res.status();
    (status, res.json().await.unwrap())
}

async fn get(client: &reqwest::Client, url: String) -> (StatusCode, Value) {
    let res = client.get(url).send().await.unwrap();
    let status = res.status();
    (status, res.json().await.unwrap())
}

#[tokio::test]
async fn status_reports_stopped_gateway() {
    let dir = tempfile::tempdir().unwrap();
    let test = common::spawn_app(common::test_config(dir.path())).await;
    let client = reqwest::Client::new();

    let (status, body) = get(&client, test.url("/api/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["running"], false);
    assert_eq!(body["state"], "stopped");
    assert!(body["pid"].is_null());
}

#[tokio::test]
async fn setup_rejects_bad_input() {
    let dir = tempfile::tempdir().unwrap();
    let test = common::spawn_app(common::test_config(dir.path())).await;
    let client = reqwest::Client::new();
    let url = test.url("/api/setup");

    let (status, body) = post(&client, url.clone(), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Bad request");

    let missing = dir.path().join("missing.json").display().to_string();
    let (status, body) = post(&client, url.clone(), json!({ "filePath": missing })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["details"].as_str().unwrap().contains("missing.json"));

    let (status, body) = post(&client, url.clone(), json!({ "fileContent": "{ nope" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid JSON");

    let (status, body) = post(&client, url.clone(), json!({ "fileContent": "{\"other\": 1}" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No MCP servers found");

    let res = client
        .post(url)
        .header("content-type", "application/json")
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let (_, body) = get(&client, test.url("/api/status")).await;
    assert_eq!(body["running"], false);
}

#[tokio::test]
async fn setup_stop_and_backup_management() {
    let dir = tempfile::tempdir().unwrap();
    let client_config = common::write_client_config(dir.path());
    let mut config = common::test_config(dir.path());
    config.backups.search_paths = vec![client_config.display().to_string()];
    let test = common::spawn_app(config).await;
    let client = reqwest::Client::new();

    let (status, body) = post(
        &client,
        test.url("/api/setup"),
        json!({ "filePath": client_config.display().to_string(), "selectedServices": [] }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["convertedConfig"]["servers"]["files"].is_object());
    assert!(body["updatedConfig"]["mcpServers"]["search"]["url"]
        .as_str()
        .unwrap()
        .contains("/mcp/search"));
    let backup_path = body["backupPath"].as_str().unwrap().to_string();

    let (_, body) = get(&client, test.url("/api/status")).await;
    assert_eq!(body["running"], true);
    assert_eq!(body["state"], "running");

    let (_, body) = get(&client, test.url("/api/logs")).await;
    let lines: Vec<&str> = body["logs"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|entry| entry["line"].as_str())
        .collect();
    assert!(lines.iter().any(|line| line.starts_with("Backup created")));

    let (status, body) = post(&client, test.url("/api/stop"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["restored"], true);
    assert_eq!(std::fs::read_to_string(&client_config).unwrap(), common::CLIENT_CONFIG);

    let (_, body) = get(&client, test.url("/api/backups")).await;
    let backups = body["backups"].as_array().unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(backups[0]["backupPath"], backup_path.as_str());
    assert_eq!(backups[0]["sourceBasename"], "mcp.json");

    let res = client
        .get(test.url("/api/backup/view"))
        .query(&[("backupPath", backup_path.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let view: Value = res.json().await.unwrap();
    assert_eq!(view["content"], common::CLIENT_CONFIG);
    assert_eq!(view["parsed"]["theme"], "dark");

    std::fs::write(&client_config, "{}").unwrap();
    let (status, body) = post(
        &client,
        test.url("/api/restore"),
        json!({ "backupPath": backup_path }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(std::fs::read_to_string(&client_config).unwrap(), common::CLIENT_CONFIG);

    let (status, _) = post(
        &client,
        test.url("/api/backup/delete"),
        json!({ "backupPath": backup_path }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = get(&client, test.url("/api/backups")).await;
    assert!(body["backups"].as_array().unwrap().is_empty());

    let (status, body) = post(
        &client,
        test.url("/api/backup/delete"),
        json!({ "backupPath": backup_path }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Backup operation failed");
}

#[tokio::test]
async fn non_backup_paths_are_refused() {
    let dir = tempfile::tempdir().unwrap();
    let client_config = common::write_client_config(dir.path());
    let test = common::spawn_app(common::test_config(dir.path())).await;
    let client = reqwest::Client::new();

    let (status, _) = post(
        &client,
        test.url("/api/backup/delete"),
        json!({ "backupPath": client_config.display().to_string() }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(client_config.exists());

    let res = client.get(test.url("/api/backup/view")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn logs_can_be_cleared() {
    let dir = tempfile::tempdir().unwrap();
    let test = common::spawn_app(common::test_config(dir.path())).await;
    let client = reqwest::Client::new();

    test.app.logs.push(gateway_control::logs::LogKind::Stdout, "hello");
    let (_, body) = get(&client, test.url("/api/logs")).await;
    assert_eq!(body["logs"][0]["line"], "hello");
    assert_eq!(body["logs"][0]["kind"], "stdout");

    let (status, _) = post(&client, test.url("/api/logs/clear"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = get(&client, test.url("/api/logs")).await;
    assert!(body["logs"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn shutdown_request_wakes_main_task() {
    let dir = tempfile::tempdir().unwrap();
    let test = common::spawn_app(common::test_config(dir.path())).await;
    let client = reqwest::Client::new();

    let (status, body) = post(&client, test.url("/api/shutdown"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    tokio::time::timeout(Duration::from_secs(1), test.app.shutdown_requests.notified())
        .await
        .unwrap();
}

#[tokio::test]
async fn responses_carry_request_id() {
    let dir = tempfile::tempdir().unwrap();
    let test = common::spawn_app(common::test_config(dir.path())).await;

    let res = reqwest::get(test.url("/api/status")).await.unwrap();
    assert!(res.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn oversized_setup_body_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::test_config(dir.path());
    config.listener.max_body_bytes = 1024;
    let test = common::spawn_app(config).await;
    let client = reqwest::Client::new();

    let content = format!("{{\"mcpServers\": {{}}, \"pad\": \"{}\"}}", "x".repeat(4096));
    let (status, body) = post(&client, test.url("/api/setup"), json!({ "fileContent": content })).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], "Payload too large");

    let (_, body) = get(&client, test.url("/api/status")).await;
    assert_eq!(body["running"], false);
}
