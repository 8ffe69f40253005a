//! Observer WebSocket endpoint.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

use crate::http::server::AppState;

/// `GET /ws`: upgrade and hand the socket to the broadcast hub.
pub async fn observer_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if !state.hub.is_accepting() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }
    let hub = Arc::clone(&state.hub);
    ws.on_upgrade(move |socket| hub.handle_socket(socket))
}
