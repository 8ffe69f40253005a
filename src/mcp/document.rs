//! Parsed client configuration documents.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

/// Key used by Claude Desktop, Cursor and most clients.
pub const MCP_SERVERS_KEY: &str = "mcpServers";

/// Key used by VS Code style configs and by the gateway itself.
pub const SERVERS_KEY: &str = "servers";

/// Errors raised while classifying a configuration document.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("no MCP servers found in configuration")]
    NoServersFound,

    #[error("server '{name}' is invalid: {reason}")]
    InvalidServerEntry { name: String, reason: String },
}

/// How the gateway reaches an upstream server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Stdio,
    Http,
    Sse,
    Websocket,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Stdio => "stdio",
            TransportKind::Http => "http",
            TransportKind::Sse => "sse",
            TransportKind::Websocket => "websocket",
        }
    }

    /// Parse an explicit `type` value, accepting common aliases.
    pub fn from_type_field(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "stdio" => Some(TransportKind::Stdio),
            "http" | "streamable-http" | "streamablehttp" | "streamable_http" => {
                Some(TransportKind::Http)
            }
            "sse" => Some(TransportKind::Sse),
            "websocket" | "ws" => Some(TransportKind::Websocket),
            _ => None,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One upstream server definition.
///
/// `fields` holds the entry exactly as it should be serialized; the transport
/// kind is resolved once when the entry is parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerEntry {
    kind: TransportKind,
    fields: Map<String, Value>,
}

impl ServerEntry {
    /// Classify a raw entry without touching its fields.
    ///
    /// Precedence: explicit `type`, then `url` (http), then stdio.
    pub fn parse(name: &str, value: &Value) -> Result<Self, TransformError> {
        let fields = value
            .as_object()
            .ok_or_else(|| TransformError::InvalidServerEntry {
                name: name.to_string(),
                reason: "expected a JSON object".to_string(),
            })?;

        let kind = match fields.get("type") {
            Some(Value::String(declared)) => TransportKind::from_type_field(declared)
                .ok_or_else(|| TransformError::InvalidServerEntry {
                    name: name.to_string(),
                    reason: format!("unknown transport type '{}'", declared),
                })?,
            Some(other) => {
                return Err(TransformError::InvalidServerEntry {
                    name: name.to_string(),
                    reason: format!("'type' must be a string, got {}", other),
                })
            }
            None if fields.contains_key("url") => TransportKind::Http,
            None => TransportKind::Stdio,
        };

        Ok(Self {
            kind,
            fields: fields.clone(),
        })
    }

    /// Like [`ServerEntry::parse`], but records the resolved kind in a `type` field.
    pub fn parse_with_type(name: &str, value: &Value) -> Result<Self, TransformError> {
        let mut entry = Self::parse(name, value)?;
        if !entry.fields.contains_key("type") {
            entry
                .fields
                .insert("type".to_string(), Value::String(entry.kind.as_str().to_string()));
        }
        Ok(entry)
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn command(&self) -> Option<&str> {
        self.fields.get("command").and_then(Value::as_str)
    }

    pub fn url(&self) -> Option<&str> {
        self.fields.get("url").and_then(Value::as_str)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

impl Serialize for ServerEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

/// A client configuration file, parsed once.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigDocument {
    root: Value,
}

impl ConfigDocument {
    /// Parse document text. The error carries the parser's line/column diagnostic.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text).map(|root| Self { root })
    }

    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    /// The `mcpServers` map, if present and an object.
    pub fn mcp_servers(&self) -> Option<&Map<String, Value>> {
        self.server_map(MCP_SERVERS_KEY)
    }

    /// The `servers` map, if present and an object.
    pub fn servers(&self) -> Option<&Map<String, Value>> {
        self.server_map(SERVERS_KEY)
    }

    pub(crate) fn server_map(&self, key: &str) -> Option<&Map<String, Value>> {
        self.root.get(key).and_then(Value::as_object)
    }

    pub(crate) fn server_map_mut(&mut self, key: &str) -> Option<&mut Map<String, Value>> {
        self.root.get_mut(key).and_then(Value::as_object_mut)
    }

    /// Every server name found under either key, in document order, without duplicates.
    pub fn server_names(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        [SERVERS_KEY, MCP_SERVERS_KEY]
            .iter()
            .filter_map(|key| self.server_map(key))
            .flat_map(|map| map.keys())
            .filter(|name| seen.insert(name.as_str()))
            .cloned()
            .collect()
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    pub fn into_value(self) -> Value {
        self.root
    }

    /// Pretty JSON (two-space indent), the form written back to disk.
    pub fn to_pretty_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.root)
    }
}
