//! Newline-delimited JSON over a pair of byte streams.

use super::{decode_frame, Inbound, InboundSender, Transport};
use crate::error::{McpError, McpResult};
use async_trait::async_trait;
use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::io;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio_util::codec::{Decoder, FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, info, warn};

/// Longest accepted line; longer lines are reported and discarded.
const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

type LineWriter = FramedWrite<Box<dyn AsyncWrite + Send + Unpin>, LinesCodec>;

pub struct StdioTransport {
    writer: Mutex<Option<LineWriter>>,
    inbound: Inbound,
    child: Mutex<Option<Child>>,
    closed: AtomicBool,
}

impl StdioTransport {
    /// Speak over arbitrary streams (pipes, sockets, in-memory duplexes).
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (tx, inbound) = Inbound::channel();
        let shutdown = inbound.shutdown_token();
        let lines = FramedRead::new(reader, JsonLines::new());

        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = read_lines(lines, tx) => {}
            }
        });

        let writer: Box<dyn AsyncWrite + Send + Unpin> = Box::new(writer);
        Self {
            writer: Mutex::new(Some(FramedWrite::new(writer, LinesCodec::new()))),
            inbound,
            child: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Speak over this process's stdin/stdout.
    pub fn process() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }

    /// Spawn `command` and speak over its stdin/stdout. Its stderr is
    /// inherited.
    pub fn spawn(command: &str, args: &[String]) -> McpResult<Self> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| McpError::Transport(format!("failed to spawn '{command}': {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Transport("child stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Transport("child stdout unavailable".to_string()))?;

        info!(command, pid = ?child.id(), "Spawned MCP server process");
        let mut transport = Self::new(stdout, stdin);
        transport.child = Mutex::new(Some(child));
        Ok(transport)
    }
}

/// Line framing that yields one decoded message per line.
///
/// Undecodable lines (too long, not UTF-8, not JSON) come out as `Err` items
/// rather than codec errors, because `FramedRead` stops at the first codec
/// error. Only I/O failures of the underlying reader end the stream.
struct JsonLines {
    lines: LinesCodec,
}

impl JsonLines {
    fn new() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(MAX_LINE_BYTES),
        }
    }

    fn frame(
        decoded: Result<Option<String>, LinesCodecError>,
    ) -> Option<Option<McpResult<Value>>> {
        match decoded {
            Ok(Some(line)) if line.trim().is_empty() => None,
            Ok(Some(line)) => Some(Some(decode_frame(line.trim()))),
            Ok(None) => Some(None),
            Err(LinesCodecError::MaxLineLengthExceeded) => Some(Some(Err(McpError::Parse(
                "line exceeds maximum length".to_string(),
            )))),
            // The lines codec only reports undecodable UTF-8 this way; the
            // offending line has already been consumed.
            Err(LinesCodecError::Io(err)) => Some(Some(Err(McpError::Parse(format!(
                "line is not valid UTF-8: {err}"
            ))))),
        }
    }
}

impl Decoder for JsonLines {
    type Item = McpResult<Value>;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if let Some(item) = Self::frame(self.lines.decode(buf)) {
                return Ok(item);
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if let Some(item) = Self::frame(self.lines.decode_eof(buf)) {
                return Ok(item);
            }
        }
    }
}

async fn read_lines<R>(mut lines: FramedRead<R, JsonLines>, tx: InboundSender)
where
    R: AsyncRead + Unpin,
{
    while let Some(item) = lines.next().await {
        let frame = match item {
            Ok(frame) => frame,
            Err(err) => {
                let _ = tx.send(Err(McpError::Io(err))).await;
                return;
            }
        };

        if let Err(err) = &frame {
            warn!(error = %err, "Skipping malformed stdio frame");
        }
        if tx.send(frame).await.is_err() {
            return;
        }
    }
    debug!("stdio reader reached end of stream");
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&self, message: Value) -> McpResult<()> {
        if self.is_closed() {
            return Err(McpError::ConnectionClosed);
        }
        let line = serde_json::to_string(&message)?;

        // Single writer: the lock spans the whole frame.
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(McpError::ConnectionClosed)?;
        writer.send(line).await.map_err(|e| match e {
            LinesCodecError::Io(err) => McpError::Io(err),
            other => McpError::Transport(other.to_string()),
        })
    }

    async fn receive(&self) -> McpResult<Option<Value>> {
        self.inbound.next().await
    }

    async fn close(&self) -> McpResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inbound.shutdown();

        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(err) = SinkExt::<String>::close(&mut writer).await {
                debug!(error = %err, "Error closing stdio writer");
            }
        }

        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(err) = child.start_kill() {
                debug!(error = %err, "MCP server process already exited");
            }
            let _ = child.wait().await;
        }

        debug!("stdio transport closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
