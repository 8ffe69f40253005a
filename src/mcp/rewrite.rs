//! Redirect a client's server entries through the gateway.
//!
//! Each original server gets its own endpoint (`/mcp/{name}`) so tools from
//! different servers never collide behind a single URL.

use serde_json::{json, Value};

use crate::mcp::document::{ConfigDocument, MCP_SERVERS_KEY, SERVERS_KEY};

/// Gateway URL for one upstream server.
pub fn gateway_endpoint(port: u16, server_name: &str) -> String {
    format!(
        "http://localhost:{}/mcp/{}",
        port,
        urlencoding::encode(server_name)
    )
}

/// Replace every selected entry (in either server map) with an http entry
/// pointing at the gateway. Returns the names actually rewritten.
pub fn rewrite_document(document: &mut ConfigDocument, selected: &[String], port: u16) -> Vec<String> {
    let mut rewritten = Vec::new();

    for key in [MCP_SERVERS_KEY, SERVERS_KEY] {
        let Some(map) = document.server_map_mut(key) else {
            continue;
        };
        for name in selected {
            if let Some(entry) = map.get_mut(name) {
                *entry = redirected_entry(port, name);
                if !rewritten.contains(name) {
                    rewritten.push(name.clone());
                }
            }
        }
    }

    rewritten
}

fn redirected_entry(port: u16, name: &str) -> Value {
    json!({
        "type": "http",
        "url": gateway_endpoint(port, name),
    })
}
