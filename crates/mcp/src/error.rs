//! Error types for the MCP client, server and transports.

use crate::protocol::{error_codes, JsonRpcError};
use serde_json::Value;
use toolmesh_core::ToolError;

/// Result type for MCP operations.
pub type McpResult<T> = Result<T, McpError>;

/// Error types that can occur while speaking MCP.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// Transport-level I/O or framing failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Unexpected or malformed JSON-RPC shape.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A single inbound frame could not be decoded.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The peer answered with a JSON-RPC error.
    #[error("RPC error {code}: {message}")]
    Rpc {
        code: i32,
        message: String,
        data: Option<Value>,
    },

    /// No response arrived before the request deadline.
    #[error("Request timed out")]
    Timeout,

    /// The connection closed before the operation completed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The session has not completed the initialize handshake.
    #[error("Not initialized")]
    NotInitialized,

    /// The peer did not advertise the capability this call needs.
    #[error("Unsupported by server: {0}")]
    Unsupported(String),

    /// Serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Local tool registry error.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl McpError {
    /// Whether a read loop may skip this error and keep going.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Parse(_) | Self::Protocol(_) | Self::Json(_))
    }

    /// The JSON-RPC error code carried by an `Rpc` error.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Convert to a wire error for responses.
    pub fn to_rpc_error(&self) -> JsonRpcError {
        match self {
            Self::Rpc {
                code,
                message,
                data,
            } => JsonRpcError {
                code: *code,
                message: message.clone(),
                data: data.clone(),
            },
            Self::Parse(msg) => JsonRpcError::parse_error(msg.clone()),
            Self::Protocol(msg) => JsonRpcError::invalid_request(msg.clone()),
            Self::NotInitialized => JsonRpcError::invalid_request("Server not initialized"),
            Self::Json(err) => JsonRpcError::invalid_params(err.to_string()),
            Self::Tool(err) => tool_error_to_rpc(err),
            other => JsonRpcError::internal_error(other.to_string()),
        }
    }
}

impl From<JsonRpcError> for McpError {
    fn from(err: JsonRpcError) -> Self {
        Self::Rpc {
            code: err.code,
            message: err.message,
            data: err.data,
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for McpError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(err.to_string())
    }
}

/// Map registry errors raised before execution onto JSON-RPC codes.
pub fn tool_error_to_rpc(err: &ToolError) -> JsonRpcError {
    let code = match err {
        ToolError::Validation { .. } | ToolError::InvalidSpec { .. } => error_codes::INVALID_PARAMS,
        ToolError::NotFound(_) => error_codes::TOOL_NOT_FOUND,
        ToolError::SecurityDenied { .. } => error_codes::UNAUTHORIZED,
        ToolError::AlreadyRegistered(_)
        | ToolError::Execution { .. }
        | ToolError::Timeout { .. } => error_codes::INTERNAL_ERROR,
    };
    JsonRpcError::custom(code, err.to_string())
}
