//! MCP client engine.
//!
//! Requests are correlated strictly by id: each outgoing request parks a
//! oneshot completion in the pending map and the read loop resolves exactly
//! that completion when the matching response arrives. `disconnect` (or a
//! fatal transport error) rejects every completion still pending, so no
//! caller is left waiting forever.

use crate::convert::{result_from_mcp, tool_from_mcp};
use crate::error::{McpError, McpResult};
use crate::protocol::*;
use crate::transport::Transport;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use toolmesh_core::{
    Arguments, RegisterOptions, Tool, ToolContext, ToolHandler, ToolOutput, ToolRegistry,
};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Ready,
}

/// Callback for server notifications. Errors are logged and never stop the
/// read loop.
pub type NotificationHandler = Arc<dyn Fn(&Value) -> anyhow::Result<()> + Send + Sync>;

type Completion = oneshot::Sender<McpResult<Value>>;
type PendingMap = Mutex<HashMap<i64, Completion>>;
type HandlerMap = RwLock<HashMap<String, Vec<NotificationHandler>>>;

/// A connection to one MCP server. Cheap to clone; clones share the
/// connection.
#[derive(Clone)]
pub struct McpClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    transport: Arc<dyn Transport>,
    info: Implementation,
    request_timeout: Option<Duration>,
    next_id: AtomicI64,
    pending: PendingMap,
    handlers: HandlerMap,
    state: Mutex<ClientState>,
    server: Mutex<Option<InitializeResult>>,
    shutdown: CancellationToken,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl McpClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_options(transport, default_client_info(), None)
    }

    /// Client with its own identity and an optional per-request deadline.
    pub fn with_options(
        transport: Arc<dyn Transport>,
        info: Implementation,
        request_timeout: Option<Duration>,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                transport,
                info,
                request_timeout,
                next_id: AtomicI64::new(1),
                pending: Mutex::new(HashMap::new()),
                handlers: RwLock::new(HashMap::new()),
                state: Mutex::new(ClientState::Disconnected),
                server: Mutex::new(None),
                shutdown: CancellationToken::new(),
                reader: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> ClientState {
        *self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ClientState) {
        *self.inner.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Register a handler for notifications named `method`.
    pub fn on_notification<F>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(method.into())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Start the read loop and perform the initialize handshake.
    pub async fn connect(&self) -> McpResult<InitializeResult> {
        {
            let mut state = self.inner.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != ClientState::Disconnected {
                return Err(McpError::Protocol("client is already connected".to_string()));
            }
            if self.inner.shutdown.is_cancelled() {
                return Err(McpError::ConnectionClosed);
            }
            *state = ClientState::Connecting;
        }

        let reader = tokio::spawn(read_loop(self.inner.clone()));
        *self.inner.reader.lock().unwrap_or_else(PoisonError::into_inner) = Some(reader);

        match self.handshake().await {
            Ok(result) => {
                info!(
                    server = %result.server_info.name,
                    version = %result.server_info.version,
                    "Connected to MCP server"
                );
                *self.inner.server.lock().unwrap_or_else(PoisonError::into_inner) =
                    Some(result.clone());
                self.set_state(ClientState::Ready);
                Ok(result)
            }
            Err(err) => {
                warn!(error = %err, "MCP handshake failed");
                self.disconnect().await;
                Err(err)
            }
        }
    }

    async fn handshake(&self) -> McpResult<InitializeResult> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities {
                experimental: None,
                roots: Some(RootsCapability { list_changed: true }),
                sampling: Some(json!({})),
            },
            client_info: self.inner.info.clone(),
        };
        let result: InitializeResult = self
            .send_request(methods::INITIALIZE, Some(serde_json::to_value(params)?))
            .await
            .and_then(decode)?;

        if result.protocol_version != PROTOCOL_VERSION {
            return Err(McpError::Protocol(format!(
                "server negotiated unsupported protocol version {}",
                result.protocol_version
            )));
        }

        self.notify(methods::INITIALIZED, None).await?;
        Ok(result)
    }

    /// Stop the read loop, reject every pending request and close the
    /// transport. Idempotent.
    pub async fn disconnect(&self) {
        self.set_state(ClientState::Disconnected);
        self.inner.shutdown.cancel();
        reject_pending(&self.inner);

        if let Err(err) = self.inner.transport.close().await {
            debug!(error = %err, "Error closing transport");
        }
        let reader = self.inner.reader.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(reader) = reader {
            let _ = reader.await;
        }
    }

    pub fn server_info(&self) -> Option<Implementation> {
        self.initialize_result().map(|r| r.server_info)
    }

    pub fn server_capabilities(&self) -> Option<ServerCapabilities> {
        self.initialize_result().map(|r| r.capabilities)
    }

    fn initialize_result(&self) -> Option<InitializeResult> {
        self.inner
            .server
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Send a request and wait for its correlated response.
    pub async fn request(&self, method: &str, params: Option<Value>) -> McpResult<Value> {
        if self.state() != ClientState::Ready {
            return Err(McpError::NotInitialized);
        }
        self.send_request(method, params).await
    }

    /// Send a notification.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> McpResult<()> {
        let note = JsonRpcNotification::new(method, params);
        self.inner
            .transport
            .send(JsonRpcMessage::from(note).to_value())
            .await
    }

    async fn send_request(&self, method: &str, params: Option<Value>) -> McpResult<Value> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.inner.pending().insert(id, tx);

        let message = JsonRpcMessage::from(JsonRpcRequest::new(id, method, params)).to_value();
        debug!(id, method, "Sending request");
        if let Err(err) = self.inner.transport.send(message).await {
            self.inner.pending().remove(&id);
            return Err(err);
        }

        let outcome = match self.inner.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    // A late reply will find no completion and be dropped.
                    self.inner.pending().remove(&id);
                    warn!(id, method, "Request timed out");
                    return Err(McpError::Timeout);
                }
            },
            None => rx.await,
        };
        outcome.unwrap_or(Err(McpError::ConnectionClosed))
    }

    fn require(&self, capability: &str, present: impl Fn(&ServerCapabilities) -> bool) -> McpResult<()> {
        if self.state() != ClientState::Ready {
            return Err(McpError::NotInitialized);
        }
        match self.server_capabilities() {
            Some(caps) if present(&caps) => Ok(()),
            _ => Err(McpError::Unsupported(capability.to_string())),
        }
    }

    /// Every tool the server lists, following pagination cursors.
    pub async fn list_tools(&self) -> McpResult<Vec<McpTool>> {
        self.require("tools", |c| c.tools.is_some())?;
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let page: ListToolsResult = decode(self.request(methods::TOOLS_LIST, params).await?)?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(tools),
            }
        }
    }

    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> McpResult<CallToolResult> {
        self.require("tools", |c| c.tools.is_some())?;
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        decode(
            self.request(methods::TOOLS_CALL, Some(serde_json::to_value(params)?))
                .await?,
        )
    }

    pub async fn list_resources(&self) -> McpResult<Vec<Resource>> {
        self.require("resources", |c| c.resources.is_some())?;
        let result: ListResourcesResult =
            decode(self.request(methods::RESOURCES_LIST, None).await?)?;
        Ok(result.resources)
    }

    pub async fn read_resource(&self, uri: &str) -> McpResult<ReadResourceResult> {
        self.require("resources", |c| c.resources.is_some())?;
        decode(
            self.request(methods::RESOURCES_READ, Some(json!({ "uri": uri })))
                .await?,
        )
    }

    pub async fn list_prompts(&self) -> McpResult<Vec<Prompt>> {
        self.require("prompts", |c| c.prompts.is_some())?;
        let result: ListPromptsResult = decode(self.request(methods::PROMPTS_LIST, None).await?)?;
        Ok(result.prompts)
    }

    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: HashMap<String, String>,
    ) -> McpResult<GetPromptResult> {
        self.require("prompts", |c| c.prompts.is_some())?;
        let params = GetPromptParams {
            name: name.to_string(),
            arguments,
        };
        decode(
            self.request(methods::PROMPTS_GET, Some(serde_json::to_value(params)?))
                .await?,
        )
    }

    pub async fn set_logging_level(&self, level: LoggingLevel) -> McpResult<()> {
        self.require("logging", |c| c.logging.is_some())?;
        let params = SetLevelParams { level };
        self.request(methods::LOGGING_SET_LEVEL, Some(serde_json::to_value(params)?))
            .await?;
        Ok(())
    }

    pub async fn ping(&self) -> McpResult<()> {
        self.request(methods::PING, None).await?;
        Ok(())
    }

    /// Import the server's tools into `registry`.
    ///
    /// Each tool is registered as `<prefix>_<name>` (or its bare name without
    /// a prefix), tagged `remote`, and proxies execution through
    /// `tools/call`. Existing entries with the same name are replaced.
    /// Tools the registry refuses (invalid spec, name clash with an alias)
    /// are logged and skipped; the names actually registered are returned.
    pub async fn register_remote_tools(
        &self,
        registry: &ToolRegistry,
        prefix: Option<&str>,
    ) -> McpResult<Vec<String>> {
        let tools = self.list_tools().await?;
        let mut registered = Vec::with_capacity(tools.len());

        for tool in tools {
            let mut spec = tool_from_mcp(&tool);
            if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
                spec.name = format!("{prefix}_{}", tool.name);
            }
            let spec = spec.tag("remote");
            let local_name = spec.name.clone();

            let handler = ToolHandler::from_tool(RemoteTool {
                client: self.clone(),
                remote_name: tool.name.clone(),
            });
            match registry.register_with(spec, handler, RegisterOptions::new().replace()) {
                Ok(()) => {
                    info!(tool = %local_name, remote = %tool.name, "Registered remote tool");
                    registered.push(local_name);
                }
                Err(err) => {
                    warn!(tool = %local_name, remote = %tool.name, error = %err, "Skipping remote tool");
                }
            }
        }
        Ok(registered)
    }
}

impl ClientInner {
    fn pending(&self) -> std::sync::MutexGuard<'_, HashMap<i64, Completion>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn default_client_info() -> Implementation {
    Implementation {
        name: "toolmesh-client".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> McpResult<T> {
    serde_json::from_value(value)
        .map_err(|e| McpError::Protocol(format!("unexpected result shape: {e}")))
}

fn reject_pending(inner: &ClientInner) {
    let drained: Vec<(i64, Completion)> = inner.pending().drain().collect();
    if !drained.is_empty() {
        debug!(count = drained.len(), "Rejecting pending requests");
    }
    for (_, completion) in drained {
        let _ = completion.send(Err(McpError::ConnectionClosed));
    }
}

/// Marks the client disconnected and rejects pending requests when the read
/// loop ends, including by panic.
struct ReaderExit(Arc<ClientInner>);

impl Drop for ReaderExit {
    fn drop(&mut self) {
        *self.0.state.lock().unwrap_or_else(PoisonError::into_inner) = ClientState::Disconnected;
        reject_pending(&self.0);
    }
}

async fn read_loop(inner: Arc<ClientInner>) {
    let _exit = ReaderExit(inner.clone());
    loop {
        let incoming = tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            incoming = inner.transport.receive() => incoming,
        };

        match incoming {
            Ok(Some(message)) => route(&inner, message).await,
            Ok(None) => {
                info!("MCP server closed the connection");
                break;
            }
            Err(err) if err.is_recoverable() => {
                warn!(error = %err, "Skipping unreadable message");
            }
            Err(err) => {
                error!(error = %err, "MCP transport failed");
                break;
            }
        }
    }
}

async fn route(inner: &ClientInner, message: Value) {
    let parsed = match JsonRpcMessage::parse(message) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!(error = %err.message, "Dropping malformed message");
            return;
        }
    };

    match parsed {
        JsonRpcMessage::Response(response) => {
            let completion = response.id.as_i64().and_then(|id| inner.pending().remove(&id));
            let Some(completion) = completion else {
                debug!(id = %response.id, "Dropping unmatched response");
                return;
            };
            let outcome = match response.error {
                Some(err) => Err(McpError::from(err)),
                None => Ok(response.result.unwrap_or(Value::Null)),
            };
            let _ = completion.send(outcome);
        }
        JsonRpcMessage::Notification(note) => {
            let handlers = inner
                .handlers
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&note.method)
                .cloned()
                .unwrap_or_default();
            if handlers.is_empty() {
                debug!(method = %note.method, "Unhandled notification");
            }
            let params = note.params.unwrap_or(Value::Null);
            for handler in handlers {
                match panic::catch_unwind(AssertUnwindSafe(|| handler(&params))) {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        warn!(method = %note.method, error = %err, "Notification handler failed");
                    }
                    Err(_) => {
                        error!(method = %note.method, "Notification handler panicked");
                    }
                }
            }
        }
        JsonRpcMessage::Request(request) => {
            let id = Value::from(request.id);
            let reply = if request.method == methods::PING {
                JsonRpcResponse::success(id, json!({}))
            } else {
                JsonRpcResponse::error(id, JsonRpcError::method_not_found(&request.method))
            };
            if let Err(err) = inner.transport.send(JsonRpcMessage::from(reply).to_value()).await {
                warn!(error = %err, "Failed to answer server request");
            }
        }
    }
}

/// Registry tool that forwards to a server via `tools/call`.
struct RemoteTool {
    client: McpClient,
    remote_name: String,
}

#[async_trait]
impl Tool for RemoteTool {
    async fn call(&self, _ctx: ToolContext, args: Arguments) -> anyhow::Result<ToolOutput> {
        let result = self.client.call_tool(&self.remote_name, args).await?;
        let result = result_from_mcp(&result);
        if let Some(error) = result.error() {
            anyhow::bail!("{error}");
        }
        Ok(result.into_data().unwrap_or_else(|| ToolOutput::text("")))
    }
}
