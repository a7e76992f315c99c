// MCP (Model Context Protocol) server, client and transports for Toolmesh
//
// The server exposes a toolmesh-core registry to MCP clients; the client
// consumes remote MCP servers and can import their tools into a local
// registry.

pub mod client;
pub mod config;
pub mod convert;
pub mod error;
pub mod protocol;
pub mod providers;
pub mod server;
pub mod transport;

pub use client::{ClientState, McpClient, NotificationHandler};
pub use config::{KnownServers, ServerEntry, TransportKind};
pub use convert::{result_from_mcp, result_to_mcp, tool_from_mcp, tool_to_mcp};
pub use error::{McpError, McpResult};
pub use providers::{PromptProvider, ResourceProvider, StaticPrompts, StaticResources};
pub use server::{McpServer, McpServerBuilder, SessionState};
pub use transport::{MemoryTransport, SseTransport, StdioTransport, Transport, WebSocketTransport};
