//! Server-Sent Events transport.
//!
//! Inbound messages arrive on a long-lived `GET` event stream; each outbound
//! message is a separate `POST`. The server names the POST target with an
//! `endpoint` event. Servers that never send one are posted to at the
//! stream URL itself once `endpoint_wait` has elapsed.

use super::{decode_frame, Inbound, InboundSender, Transport};
use crate::error::{McpError, McpResult};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::Client;
use serde_json::Value;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio_util::io::StreamReader;
use tracing::{debug, info, warn};
use url::Url;

const DEFAULT_ENDPOINT_WAIT: Duration = Duration::from_secs(1);

pub struct SseTransport {
    client: Client,
    stream_url: Url,
    endpoint: watch::Receiver<Option<Url>>,
    endpoint_wait: Duration,
    endpoint_waited: AtomicBool,
    inbound: Inbound,
    closed: AtomicBool,
}

impl SseTransport {
    pub async fn connect(url: &str) -> McpResult<Self> {
        Self::connect_with(Client::new(), url, DEFAULT_ENDPOINT_WAIT).await
    }

    /// Open the event stream with a caller-supplied HTTP client.
    pub async fn connect_with(
        client: Client,
        url: &str,
        endpoint_wait: Duration,
    ) -> McpResult<Self> {
        let stream_url = Url::parse(url)?;
        let response = client
            .get(stream_url.clone())
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?
            .error_for_status()?;

        info!(url = %stream_url, "Connected to SSE stream");

        let (tx, inbound) = Inbound::channel();
        let (endpoint_tx, endpoint) = watch::channel(None);
        let shutdown = inbound.shutdown_token();
        let base = stream_url.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = read_events(response, base, tx, endpoint_tx) => {}
            }
        });

        Ok(Self {
            client,
            stream_url,
            endpoint,
            endpoint_wait,
            endpoint_waited: AtomicBool::new(false),
            inbound,
            closed: AtomicBool::new(false),
        })
    }

    /// Where outbound messages are posted. Only the first send waits for the
    /// `endpoint` event; later sends use whatever is known at that point.
    async fn post_url(&self) -> Url {
        let current = self.endpoint.borrow().clone();
        if let Some(url) = current {
            return url;
        }

        if !self.endpoint_waited.swap(true, Ordering::AcqRel) {
            let mut endpoint = self.endpoint.clone();
            let announced =
                tokio::time::timeout(self.endpoint_wait, endpoint.wait_for(Option::is_some))
                    .await
                    .ok()
                    .and_then(Result::ok)
                    .and_then(|url| (*url).clone());
            if let Some(url) = announced {
                return url;
            }
            debug!(url = %self.stream_url, "No SSE endpoint announced, posting to the stream URL");
        }

        // Stream ended or the server never announced an endpoint.
        let current = self.endpoint.borrow().clone();
        current.unwrap_or_else(|| self.stream_url.clone())
    }
}

async fn read_events(
    response: reqwest::Response,
    base: Url,
    tx: InboundSender,
    endpoint_tx: watch::Sender<Option<Url>>,
) {
    let stream = response
        .bytes_stream()
        .map(|result| result.map_err(io::Error::other));
    let mut reader = BufReader::new(StreamReader::new(stream));

    let mut raw = Vec::new();
    let mut event_name = String::new();
    let mut data = String::new();
    // Set when a line of the current event was not UTF-8; the event is dropped.
    let mut discarding = false;

    loop {
        raw.clear();
        match reader.read_until(b'\n', &mut raw).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                let _ = tx.send(Err(McpError::Io(err))).await;
                return;
            }
        }

        let line = match std::str::from_utf8(&raw) {
            Ok(line) => line.trim_end_matches(['\r', '\n']),
            Err(err) => {
                if !discarding {
                    discarding = true;
                    let err = McpError::Parse(format!("SSE line is not valid UTF-8: {err}"));
                    warn!(error = %err, "Skipping malformed SSE event");
                    if tx.send(Err(err)).await.is_err() {
                        return;
                    }
                }
                continue;
            }
        };

        if line.is_empty() {
            // Blank line dispatches the accumulated event.
            let name = std::mem::take(&mut event_name);
            let payload = std::mem::take(&mut data);
            if std::mem::take(&mut discarding) || payload.is_empty() {
                continue;
            }
            if name == "endpoint" {
                match base.join(payload.trim()) {
                    Ok(url) => {
                        debug!(endpoint = %url, "SSE endpoint announced");
                        endpoint_tx.send_replace(Some(url));
                    }
                    Err(err) => warn!(error = %err, "Ignoring malformed SSE endpoint"),
                }
                continue;
            }

            let frame = decode_frame(&payload);
            if let Err(err) = &frame {
                warn!(error = %err, "Skipping malformed SSE event");
            }
            if tx.send(frame).await.is_err() {
                return;
            }
        } else if discarding {
            continue;
        } else if let Some(value) = line.strip_prefix("event:") {
            event_name = value.trim().to_string();
        } else if let Some(value) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(value.strip_prefix(' ').unwrap_or(value));
        }
        // Comments (`:`) and id:/retry: fields are ignored.
    }
    debug!("SSE stream ended");
}

#[async_trait]
impl Transport for SseTransport {
    async fn send(&self, message: Value) -> McpResult<()> {
        if self.is_closed() {
            return Err(McpError::ConnectionClosed);
        }
        let url = self.post_url().await;
        self.client
            .post(url)
            .json(&message)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn receive(&self) -> McpResult<Option<Value>> {
        self.inbound.next().await
    }

    async fn close(&self) -> McpResult<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.inbound.shutdown();
            debug!(url = %self.stream_url, "SSE transport closed");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
