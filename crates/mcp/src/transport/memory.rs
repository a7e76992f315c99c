//! In-process transport: two connected endpoints backed by channels.
//!
//! Used by the HTTP gateway to bridge sessions onto a server and by tests
//! to wire a client directly to a server.

use super::{Inbound, InboundSender, Transport};
use crate::error::{McpError, McpResult};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

pub struct MemoryTransport {
    outbound: Mutex<Option<InboundSender>>,
    inbound: Inbound,
    closed: AtomicBool,
}

impl MemoryTransport {
    /// Two transports where each one's `send` feeds the other's `receive`.
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_inbound) = Inbound::channel();
        let (b_tx, b_inbound) = Inbound::channel();
        (Self::new(b_tx, a_inbound), Self::new(a_tx, b_inbound))
    }

    fn new(outbound: InboundSender, inbound: Inbound) -> Self {
        Self {
            outbound: Mutex::new(Some(outbound)),
            inbound,
            closed: AtomicBool::new(false),
        }
    }

    fn sender(&self) -> Option<InboundSender> {
        self.outbound
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, message: Value) -> McpResult<()> {
        if self.is_closed() {
            return Err(McpError::ConnectionClosed);
        }
        let tx = self.sender().ok_or(McpError::ConnectionClosed)?;
        tx.send(Ok(message))
            .await
            .map_err(|_| McpError::ConnectionClosed)
    }

    async fn receive(&self) -> McpResult<Option<Value>> {
        self.inbound.next().await
    }

    async fn close(&self) -> McpResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inbound.shutdown();
        // Dropping our sender ends the peer's stream.
        self.outbound
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_pair_is_bidirectional() {
        let (left, right) = MemoryTransport::pair();
        left.send(json!({"from": "left"})).await.unwrap();
        right.send(json!({"from": "right"})).await.unwrap();

        assert_eq!(right.receive().await.unwrap(), Some(json!({"from": "left"})));
        assert_eq!(left.receive().await.unwrap(), Some(json!({"from": "right"})));
    }

    #[tokio::test]
    async fn test_close_ends_peer_stream() {
        let (left, right) = MemoryTransport::pair();
        left.close().await.unwrap();
        assert_eq!(right.receive().await.unwrap(), None);
        assert!(right.send(json!({})).await.is_err());
    }
}
