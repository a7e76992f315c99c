//! WebSocket transport: one JSON-RPC message per text frame.

use super::{decode_frame, Inbound, Transport};
use crate::error::{McpError, McpResult};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;

const OUTBOUND_CAPACITY: usize = 64;

pub struct WebSocketTransport {
    sender: mpsc::Sender<Message>,
    inbound: Inbound,
    closed: AtomicBool,
}

impl WebSocketTransport {
    pub async fn connect(url: &str) -> McpResult<Self> {
        let url = Url::parse(url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(McpError::Config(format!(
                "WebSocket URL must use ws:// or wss://, got {}",
                url.scheme()
            )));
        }

        debug!(url = %url, "Connecting to WebSocket");
        let (ws_stream, _) = connect_async(url.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();

        let (sender, mut outbound) = mpsc::channel::<Message>(OUTBOUND_CAPACITY);
        let (tx, inbound) = Inbound::channel();
        let shutdown = inbound.shutdown_token();

        // Outgoing frames; a Close frame ends the task.
        tokio::spawn(async move {
            while let Some(message) = outbound.recv().await {
                let closing = matches!(message, Message::Close(_));
                if let Err(e) = write.send(message).await {
                    error!(error = %e, "Failed to send WebSocket message");
                    break;
                }
                if closing {
                    break;
                }
            }
            let _ = write.close().await;
        });

        // Incoming frames
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    frame = read.next() => frame,
                };
                let Some(frame) = frame else { break };

                let decoded = match frame {
                    Ok(Message::Text(text)) => decode_frame(&text),
                    Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                        Ok(text) => decode_frame(text),
                        Err(e) => Err(McpError::Parse(format!("binary frame is not UTF-8: {e}"))),
                    },
                    Ok(Message::Close(_)) => {
                        info!("WebSocket connection closed by peer");
                        break;
                    }
                    // Pongs are answered by the library.
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = tx.send(Err(e.into())).await;
                        break;
                    }
                };

                if let Err(err) = &decoded {
                    warn!(error = %err, "Skipping malformed WebSocket frame");
                }
                if tx.send(decoded).await.is_err() {
                    break;
                }
            }
        });

        info!(url = %url, "WebSocket connected");
        Ok(Self {
            sender,
            inbound,
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&self, message: Value) -> McpResult<()> {
        if self.is_closed() {
            return Err(McpError::ConnectionClosed);
        }
        let text = serde_json::to_string(&message)?;
        self.sender
            .send(Message::Text(text))
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
        // The writer may already be gone if the peer hung up.
        let _ = self.sender.send(Message::Close(None)).await;
        debug!("WebSocket transport closed");
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
    use tokio::net::TcpListener;

    /// Echo server that answers every text frame with `{"echo": <frame>}`.
    async fn spawn_echo_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Text("garbage".to_string())).await.unwrap();
            while let Some(Ok(message)) = ws.next().await {
                match message {
                    Message::Text(text) => {
                        let value: Value = serde_json::from_str(&text).unwrap();
                        let reply = json!({"echo": value}).to_string();
                        ws.send(Message::Text(reply)).await.unwrap();
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        });
        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn test_exchanges_text_frames() {
        let url = spawn_echo_server().await;
        let transport = WebSocketTransport::connect(&url).await.unwrap();

        assert!(transport.receive().await.unwrap_err().is_recoverable());

        transport.send(json!({"jsonrpc": "2.0", "method": "ping", "id": 1})).await.unwrap();
        let reply = transport.receive().await.unwrap().unwrap();
        assert_eq!(reply["echo"]["id"], json!(1));

        transport.close().await.unwrap();
        assert!(transport.is_closed());
        assert_eq!(transport.receive().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rejects_http_scheme() {
        let result = WebSocketTransport::connect("http://localhost:1").await;
        assert!(matches!(result, Err(McpError::Config(_))));
    }
}
