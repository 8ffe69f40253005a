//! Conversion of client documents into the gateway's server list.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::mcp::document::{ConfigDocument, ServerEntry, TransformError};

/// The canonical server list handed to the gateway: `{"servers": {name: entry}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConvertedConfig {
    pub servers: BTreeMap<String, ServerEntry>,
}

impl ConvertedConfig {
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.servers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

/// Merge a document's server maps, optionally keeping only `selection`.
///
/// `servers` entries are taken verbatim; `mcpServers` entries fill the gaps
/// with their transport kind written into `type`.
pub fn transform(
    document: &ConfigDocument,
    selection: Option<&[String]>,
) -> Result<ConvertedConfig, TransformError> {
    let mut servers = BTreeMap::new();

    if let Some(map) = document.servers() {
        for (name, value) in map {
            servers.insert(name.clone(), ServerEntry::parse(name, value)?);
        }
    }

    if let Some(map) = document.mcp_servers() {
        for (name, value) in map {
            if servers.contains_key(name) {
                continue;
            }
            servers.insert(name.clone(), ServerEntry::parse_with_type(name, value)?);
        }
    }

    if servers.is_empty() {
        return Err(TransformError::NoServersFound);
    }

    if let Some(selected) = selection {
        servers.retain(|name, _| selected.iter().any(|s| s == name));
        if servers.is_empty() {
            return Err(TransformError::NoServersFound);
        }
    }

    Ok(ConvertedConfig { servers })
}
