//! Message transports for MCP sessions.
//!
//! A transport moves whole JSON-RPC messages. Every implementation feeds a
//! dedicated reader task into an [`Inbound`] queue, so a malformed frame
//! surfaces as a recoverable `McpError::Parse` from `receive` while later
//! frames keep flowing.

pub mod memory;
pub mod sse;
pub mod stdio;
pub mod websocket;

pub use memory::MemoryTransport;
pub use sse::SseTransport;
pub use stdio::StdioTransport;
pub use websocket::WebSocketTransport;

use crate::error::{McpError, McpResult};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Queue depth between a transport's reader task and `receive`.
const INBOUND_CAPACITY: usize = 256;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one message.
    async fn send(&self, message: Value) -> McpResult<()>;

    /// Next inbound message.
    ///
    /// `Ok(None)` means the peer closed the connection or `close` was called.
    /// Errors for which [`McpError::is_recoverable`] holds may be skipped.
    async fn receive(&self) -> McpResult<Option<Value>>;

    /// Close the transport. Idempotent.
    async fn close(&self) -> McpResult<()>;

    fn is_closed(&self) -> bool;
}

pub(crate) type InboundSender = mpsc::Sender<McpResult<Value>>;

/// Receiving half shared by the transport implementations.
pub(crate) struct Inbound {
    rx: Mutex<mpsc::Receiver<McpResult<Value>>>,
    shutdown: CancellationToken,
}

impl Inbound {
    pub(crate) fn channel() -> (InboundSender, Self) {
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        (
            tx,
            Self {
                rx: Mutex::new(rx),
                shutdown: CancellationToken::new(),
            },
        )
    }

    pub(crate) async fn next(&self) -> McpResult<Option<Value>> {
        if self.shutdown.is_cancelled() {
            return Ok(None);
        }
        let mut rx = self.rx.lock().await;
        tokio::select! {
            _ = self.shutdown.cancelled() => Ok(None),
            item = rx.recv() => match item {
                Some(Ok(value)) => Ok(Some(value)),
                Some(Err(err)) => Err(err),
                None => Ok(None),
            },
        }
    }

    /// Token cancelled when the owning transport closes.
    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub(crate) fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

/// Decode a single text frame.
pub(crate) fn decode_frame(text: &str) -> McpResult<Value> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| McpError::Parse(format!("{e}: {}", truncate(text, 120))))?;
    if !value.is_object() {
        return Err(McpError::Parse(format!(
            "expected a JSON object, got: {}",
            truncate(text, 120)
        )));
    }
    Ok(value)
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
