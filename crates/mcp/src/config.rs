// Known MCP server bookkeeping (~/.toolmesh/mcp_servers.json)

use crate::client::McpClient;
use crate::error::{McpError, McpResult};
use crate::transport::{SseTransport, StdioTransport, Transport, WebSocketTransport};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use toolmesh_core::SecurityLevel;
use tracing::{debug, info};

const CONFIG_DIR: &str = ".toolmesh";
const SERVERS_FILE: &str = "mcp_servers.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Stdio,
    Sse,
    #[serde(alias = "ws")]
    WebSocket,
}

impl TransportKind {
    /// Transport implied by an entry that names none: commands speak stdio,
    /// http(s) URLs speak SSE and anything else WebSocket.
    fn infer(command: Option<&str>, url: Option<&str>) -> Self {
        match (command, url) {
            (Some(_), _) => Self::Stdio,
            (None, Some(url)) if url.starts_with("http") => Self::Sse,
            _ => Self::WebSocket,
        }
    }
}

/// One known server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_level: Option<SecurityLevel>,
    /// Free-form description of what the server is.
    #[serde(rename = "type", default = "default_server_type")]
    pub server_type: String,
}

fn default_server_type() -> String {
    "custom".to_string()
}

impl ServerEntry {
    pub fn command(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command: Some(command.into()),
            args,
            url: None,
            transport: Some(TransportKind::Stdio),
            security_level: None,
            server_type: default_server_type(),
        }
    }

    pub fn url(name: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            name: name.into(),
            transport: Some(TransportKind::infer(None, Some(&url))),
            command: None,
            args: Vec::new(),
            url: Some(url),
            security_level: None,
            server_type: default_server_type(),
        }
    }

    pub fn with_security_level(mut self, level: SecurityLevel) -> Self {
        self.security_level = Some(level);
        self
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.transport
            .unwrap_or_else(|| TransportKind::infer(self.command.as_deref(), self.url.as_deref()))
    }

    pub fn validate(&self) -> McpResult<()> {
        if self.name.trim().is_empty() {
            return Err(McpError::Config("server name must not be empty".to_string()));
        }
        match (self.transport_kind(), &self.command, &self.url) {
            (TransportKind::Stdio, Some(_), _) => Ok(()),
            (TransportKind::Stdio, None, _) => Err(McpError::Config(format!(
                "server '{}' uses stdio but has no command",
                self.name
            ))),
            (_, _, Some(_)) => Ok(()),
            (kind, _, None) => Err(McpError::Config(format!(
                "server '{}' uses {kind:?} but has no url",
                self.name
            ))),
        }
    }

    /// Open the transport this entry describes.
    pub async fn open_transport(&self) -> McpResult<Arc<dyn Transport>> {
        self.validate()?;
        let transport: Arc<dyn Transport> = match self.transport_kind() {
            TransportKind::Stdio => {
                let command = self.command.as_deref().unwrap_or_default();
                Arc::new(StdioTransport::spawn(command, &self.args)?)
            }
            TransportKind::Sse => {
                Arc::new(SseTransport::connect(self.url.as_deref().unwrap_or_default()).await?)
            }
            TransportKind::WebSocket => Arc::new(
                WebSocketTransport::connect(self.url.as_deref().unwrap_or_default()).await?,
            ),
        };
        Ok(transport)
    }

    /// Open the transport and complete the initialize handshake.
    pub async fn connect(&self) -> McpResult<McpClient> {
        let client = McpClient::new(self.open_transport().await?);
        client.connect().await?;
        info!(server = %self.name, "Connected to known server");
        Ok(client)
    }
}

/// The known-servers file: a JSON array of [`ServerEntry`].
#[derive(Debug, Clone)]
pub struct KnownServers {
    path: PathBuf,
    servers: Vec<ServerEntry>,
}

impl KnownServers {
    /// `~/.toolmesh/mcp_servers.json`
    pub fn default_path() -> McpResult<PathBuf> {
        let dirs = BaseDirs::new()
            .ok_or_else(|| McpError::Config("could not determine home directory".to_string()))?;
        Ok(dirs.home_dir().join(CONFIG_DIR).join(SERVERS_FILE))
    }

    pub fn load_default() -> McpResult<Self> {
        Self::load(Self::default_path()?)
    }

    /// Read `path`; a missing file is an empty list.
    pub fn load(path: impl Into<PathBuf>) -> McpResult<Self> {
        let path = path.into();
        let servers = match std::fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => Vec::new(),
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                McpError::Config(format!("invalid server list {}: {e}", path.display()))
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        debug!(path = %path.display(), count = servers.len(), "Loaded known servers");
        Ok(Self { path, servers })
    }

    pub fn save(&self) -> McpResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(&self.servers)?;
        std::fs::write(&self.path, text)?;
        debug!(path = %self.path.display(), "Saved known servers");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add `entry`, replacing any entry with the same name. Returns the
    /// replaced entry.
    pub fn add(&mut self, entry: ServerEntry) -> McpResult<Option<ServerEntry>> {
        entry.validate()?;
        let replaced = self.take(&entry.name);
        self.servers.push(entry);
        Ok(replaced)
    }

    pub fn remove(&mut self, name: &str) -> Option<ServerEntry> {
        self.take(name)
    }

    fn take(&mut self, name: &str) -> Option<ServerEntry> {
        let index = self.servers.iter().position(|s| s.name == name)?;
        Some(self.servers.remove(index))
    }

    pub fn get(&self, name: &str) -> Option<&ServerEntry> {
        self.servers.iter().find(|s| s.name == name)
    }

    pub fn list(&self) -> &[ServerEntry] {
        &self.servers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let servers = KnownServers::load(dir.path().join("none.json")).unwrap();
        assert!(servers.list().is_empty());
    }

    #[test]
    fn test_add_replace_remove_and_persist() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("mcp_servers.json");

        let mut servers = KnownServers::load(&path).unwrap();
        servers
            .add(ServerEntry::command("local", "toolmesh-mcp", vec![]))
            .unwrap();
        servers
            .add(ServerEntry::url("remote", "http://localhost:8080/sse"))
            .unwrap();
        let replaced = servers
            .add(
                ServerEntry::url("remote", "ws://localhost:8080/ws")
                    .with_security_level(SecurityLevel::Restricted),
            )
            .unwrap();
        assert_eq!(replaced.unwrap().url.as_deref(), Some("http://localhost:8080/sse"));
        servers.save().unwrap();

        let mut reloaded = KnownServers::load(&path).unwrap();
        assert_eq!(reloaded.list().len(), 2);
        let remote = reloaded.get("remote").unwrap();
        assert_eq!(remote.transport_kind(), TransportKind::WebSocket);
        assert_eq!(remote.security_level, Some(SecurityLevel::Restricted));

        assert!(reloaded.remove("local").is_some());
        assert!(reloaded.remove("local").is_none());
        assert_eq!(reloaded.list().len(), 1);
    }

    #[test]
    fn test_wire_format_and_inference() {
        let entries: Vec<ServerEntry> = serde_json::from_value(json!([
            {"name": "a", "command": "server-a", "args": ["--quiet"]},
            {"name": "b", "url": "https://example.com/sse", "securityLevel": "sandboxed"},
            {"name": "c", "url": "wss://example.com/ws", "transport": "websocket", "type": "demo"}
        ]))
        .unwrap();

        assert_eq!(entries[0].transport_kind(), TransportKind::Stdio);
        assert_eq!(entries[1].transport_kind(), TransportKind::Sse);
        assert_eq!(entries[1].security_level, Some(SecurityLevel::Sandboxed));
        assert_eq!(entries[2].transport_kind(), TransportKind::WebSocket);
        assert_eq!(entries[2].server_type, "demo");

        let encoded = serde_json::to_value(&entries[1]).unwrap();
        assert_eq!(encoded["securityLevel"], json!("sandboxed"));
        assert_eq!(encoded["type"], json!("custom"));
    }

    #[test]
    fn test_rejects_incomplete_entries() {
        let mut servers = KnownServers::load(TempDir::new().unwrap().path().join("x.json")).unwrap();
        let mut entry = ServerEntry::url("broken", "http://localhost/sse");
        entry.url = None;
        assert!(matches!(servers.add(entry), Err(McpError::Config(_))));

        let mut entry = ServerEntry::command("broken", "x", vec![]);
        entry.command = None;
        assert!(matches!(servers.add(entry), Err(McpError::Config(_))));
    }
}
