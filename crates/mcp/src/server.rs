//! MCP server engine.
//!
//! [`McpServer`] exposes a [`ToolRegistry`] (and optionally resources and
//! prompts) to MCP clients. Each call to [`McpServer::serve`] runs one
//! session over one transport:
//!
//! ```text
//! New --initialize(ok)--> Initialized --transport closed--> Closed
//!  ^          |
//!  +--(bad protocol version: error, state unchanged)
//! ```
//!
//! Every inbound message is handled on its own task, so a slow tool call
//! never blocks the read loop. Replies are correlated by request id only.

use crate::convert::{result_to_mcp, tool_to_mcp};
use crate::error::{tool_error_to_rpc, McpResult};
use crate::protocol::*;
use crate::providers::{PromptProvider, ResourceProvider};
use crate::transport::Transport;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use toolmesh_core::{ToolFilter, ToolRegistry};
use tracing::{debug, error, info, warn};

const DEFAULT_NAME: &str = "toolmesh-mcp";

/// Lifecycle of one server session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    New,
    Initialized,
    Closed,
}

/// Serves a tool registry over MCP. Cheap to clone; clones share the
/// registry, providers and change notifications.
#[derive(Clone)]
pub struct McpServer {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    registry: Arc<ToolRegistry>,
    info: Implementation,
    instructions: Option<String>,
    exposed: ToolFilter,
    resources: Option<Arc<dyn ResourceProvider>>,
    prompts: Option<Arc<dyn PromptProvider>>,
    tools_changed: broadcast::Sender<()>,
}

pub struct McpServerBuilder {
    registry: Arc<ToolRegistry>,
    info: Implementation,
    instructions: Option<String>,
    exposed: ToolFilter,
    resources: Option<Arc<dyn ResourceProvider>>,
    prompts: Option<Arc<dyn PromptProvider>>,
}

impl McpServerBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.info.name = name.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.info.version = version.into();
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Only expose registry tools matching `filter`.
    pub fn expose(mut self, filter: ToolFilter) -> Self {
        self.exposed = filter;
        self
    }

    pub fn resources(mut self, provider: Arc<dyn ResourceProvider>) -> Self {
        self.resources = Some(provider);
        self
    }

    pub fn prompts(mut self, provider: Arc<dyn PromptProvider>) -> Self {
        self.prompts = Some(provider);
        self
    }

    pub fn build(self) -> McpServer {
        let (tools_changed, _) = broadcast::channel(16);
        McpServer {
            inner: Arc::new(ServerInner {
                registry: self.registry,
                info: self.info,
                instructions: self.instructions,
                exposed: self.exposed,
                resources: self.resources,
                prompts: self.prompts,
                tools_changed,
            }),
        }
    }
}

impl McpServer {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self::builder(registry).build()
    }

    pub fn builder(registry: Arc<ToolRegistry>) -> McpServerBuilder {
        McpServerBuilder {
            registry,
            info: Implementation {
                name: DEFAULT_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: None,
            exposed: ToolFilter::default(),
            resources: None,
            prompts: None,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.inner.registry
    }

    pub fn info(&self) -> &Implementation {
        &self.inner.info
    }

    /// Push `notifications/tools/listChanged` to every initialized session.
    pub fn notify_tools_changed(&self) {
        // No receivers simply means no live sessions.
        let _ = self.inner.tools_changed.send(());
    }

    /// Run one session until the transport closes.
    ///
    /// On return the session is `Closed`, in-flight dispatch tasks have been
    /// cancelled and the transport is closed.
    pub async fn serve(&self, transport: Arc<dyn Transport>) -> McpResult<()> {
        let session = Arc::new(Session::new(self.inner.clone(), transport.clone()));
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();
        let mut changes = self.inner.tools_changed.subscribe();

        info!(server = %self.inner.info.name, "MCP session started");

        let outcome = loop {
            tokio::select! {
                incoming = transport.receive() => match incoming {
                    Ok(Some(message)) => {
                        let session = session.clone();
                        let cancel = cancel.clone();
                        tasks.spawn(async move {
                            tokio::select! {
                                _ = cancel.cancelled() => {}
                                _ = session.handle(message) => {}
                            }
                        });
                    }
                    Ok(None) => break Ok(()),
                    Err(err) if err.is_recoverable() => {
                        warn!(error = %err, "Discarding unreadable message");
                        session
                            .send(JsonRpcResponse::error(Value::Null, err.to_rpc_error()))
                            .await;
                    }
                    Err(err) => {
                        error!(error = %err, "Transport failed");
                        break Err(err);
                    }
                },
                changed = changes.recv() => match changed {
                    Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        if session.state() == SessionState::Initialized {
                            session.notify(methods::TOOLS_LIST_CHANGED, None).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {}
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(err) = joined {
                        error!(error = %err, "Dispatch task failed");
                    }
                }
            }
        };

        session.set_state(SessionState::Closed);
        cancel.cancel();
        tasks.shutdown().await;
        if let Err(err) = transport.close().await {
            debug!(error = %err, "Error closing transport");
        }
        let (client, roots) = {
            let info = session.lock();
            let client = info.client.as_ref().map(|c| c.name.clone()).unwrap_or_default();
            (client, info.capabilities.roots.is_some())
        };
        info!(server = %self.inner.info.name, client = %client, roots, "MCP session closed");
        outcome
    }
}

struct SessionInfo {
    state: SessionState,
    client: Option<Implementation>,
    capabilities: ClientCapabilities,
    log_level: LoggingLevel,
}

struct Session {
    server: Arc<ServerInner>,
    transport: Arc<dyn Transport>,
    info: Mutex<SessionInfo>,
}

type DispatchResult = Result<Value, JsonRpcError>;

impl Session {
    fn new(server: Arc<ServerInner>, transport: Arc<dyn Transport>) -> Self {
        Self {
            server,
            transport,
            info: Mutex::new(SessionInfo {
                state: SessionState::New,
                client: None,
                capabilities: ClientCapabilities::default(),
                log_level: LoggingLevel::Info,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionInfo> {
        self.info.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> SessionState {
        self.lock().state
    }

    fn set_state(&self, state: SessionState) {
        self.lock().state = state;
    }

    async fn handle(&self, message: Value) {
        let id = message.get("id").cloned().unwrap_or(Value::Null);
        let parsed = match JsonRpcMessage::parse(message) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(error = %err.message, "Rejecting malformed message");
                self.send(JsonRpcResponse::error(id, err)).await;
                return;
            }
        };

        match parsed {
            JsonRpcMessage::Request(request) => {
                debug!(id = %request.id, method = %request.method, "Request received");
                let id = Value::from(request.id);
                let reply = match self.dispatch(&request.method, request.params).await {
                    Ok(result) => JsonRpcResponse::success(id, result),
                    Err(err) => JsonRpcResponse::error(id, err),
                };
                self.send(reply).await;
            }
            JsonRpcMessage::Notification(note) => self.on_notification(&note.method).await,
            JsonRpcMessage::Response(response) => {
                debug!(id = %response.id, "Ignoring response from client");
            }
        }
    }

    async fn dispatch(&self, method: &str, params: Option<Value>) -> DispatchResult {
        match method {
            methods::INITIALIZE => return self.initialize(params),
            methods::PING => return Ok(json!({})),
            _ => {}
        }

        if self.state() != SessionState::Initialized {
            return Err(JsonRpcError::invalid_request("Server not initialized"));
        }

        match method {
            methods::TOOLS_LIST => self.list_tools(),
            methods::TOOLS_CALL => self.call_tool(params).await,
            methods::RESOURCES_LIST => {
                let provider = self.resources(method)?;
                let resources = provider.list().await.map_err(|e| e.to_rpc_error())?;
                to_result(ListResourcesResult { resources })
            }
            methods::RESOURCES_READ => {
                let provider = self.resources(method)?;
                let params: ReadResourceParams = parse_params(params)?;
                let contents = provider
                    .read(&params.uri)
                    .await
                    .map_err(|e| e.to_rpc_error())?;
                to_result(ReadResourceResult { contents })
            }
            methods::PROMPTS_LIST => {
                let provider = self.prompts(method)?;
                let prompts = provider.list().await.map_err(|e| e.to_rpc_error())?;
                to_result(ListPromptsResult { prompts })
            }
            methods::PROMPTS_GET => {
                let provider = self.prompts(method)?;
                let params: GetPromptParams = parse_params(params)?;
                let prompt = provider
                    .get(&params.name, &params.arguments)
                    .await
                    .map_err(|e| e.to_rpc_error())?;
                to_result(prompt)
            }
            methods::LOGGING_SET_LEVEL => {
                let params: SetLevelParams = parse_params(params)?;
                self.lock().log_level = params.level;
                debug!(level = ?params.level, "Client log level changed");
                Ok(json!({}))
            }
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }

    fn initialize(&self, params: Option<Value>) -> DispatchResult {
        let params: InitializeParams = parse_params(params)?;

        if params.protocol_version != PROTOCOL_VERSION {
            warn!(
                requested = %params.protocol_version,
                supported = PROTOCOL_VERSION,
                "Rejecting unsupported protocol version"
            );
            return Err(JsonRpcError::invalid_params(format!(
                "Unsupported protocol version: {}",
                params.protocol_version
            )));
        }

        {
            let mut info = self.lock();
            if info.state != SessionState::New {
                return Err(JsonRpcError::invalid_request("Session already initialized"));
            }
            info.state = SessionState::Initialized;
            info.capabilities = params.capabilities;
            info.client = Some(params.client_info.clone());
        }

        info!(
            client = %params.client_info.name,
            version = %params.client_info.version,
            "Client initialized session"
        );

        to_result(InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: self.capabilities(),
            server_info: self.server.info.clone(),
            instructions: self.server.instructions.clone(),
        })
    }

    fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: Some(ToolsCapability { list_changed: true }),
            resources: self
                .server
                .resources
                .as_ref()
                .map(|_| ResourcesCapability::default()),
            prompts: self
                .server
                .prompts
                .as_ref()
                .map(|_| PromptsCapability::default()),
            logging: Some(json!({})),
            experimental: None,
        }
    }

    async fn on_notification(&self, method: &str) {
        match method {
            methods::INITIALIZED | methods::NOTIFICATIONS_INITIALIZED => {
                if self.state() == SessionState::Initialized {
                    self.notify(methods::TOOLS_LIST_CHANGED, None).await;
                } else {
                    warn!("Received initialized before initialize");
                }
            }
            other => debug!(method = other, "Ignoring notification"),
        }
    }

    fn list_tools(&self) -> DispatchResult {
        let tools = self
            .server
            .registry
            .list_allowed(&self.server.exposed)
            .iter()
            .map(tool_to_mcp)
            .collect();
        to_result(ListToolsResult {
            tools,
            next_cursor: None,
        })
    }

    async fn call_tool(&self, params: Option<Value>) -> DispatchResult {
        let params: CallToolParams = parse_params(params)?;
        let registry = &self.server.registry;

        // Deprecated tools are hidden from listings but stay callable.
        let visible = self.server.exposed.clone().include_deprecated();
        let entry = registry
            .get(&params.name)
            .filter(|entry| visible.matches(entry.spec()))
            .ok_or_else(|| {
                JsonRpcError::custom(
                    error_codes::TOOL_NOT_FOUND,
                    format!("Tool not found: {}", params.name),
                )
            })?;

        // The level may have changed since the tool was listed.
        registry
            .policy()
            .check(entry.spec())
            .map_err(|err| tool_error_to_rpc(&err))?;

        info!(tool = %params.name, "Calling tool");
        self.log(
            LoggingLevel::Info,
            "tools",
            Value::from(format!("Executing tool: {}", params.name)),
        )
        .await;

        let result = registry
            .execute(&params.name, params.arguments)
            .await
            .map_err(|err| tool_error_to_rpc(&err))?;

        if result.success() {
            info!(tool = %params.name, "Tool completed");
        } else {
            warn!(tool = %params.name, error = result.error().unwrap_or_default(), "Tool failed");
        }
        to_result(result_to_mcp(&result))
    }

    fn resources(&self, method: &str) -> Result<Arc<dyn ResourceProvider>, JsonRpcError> {
        self.server
            .resources
            .clone()
            .ok_or_else(|| JsonRpcError::method_not_found(method))
    }

    fn prompts(&self, method: &str) -> Result<Arc<dyn PromptProvider>, JsonRpcError> {
        self.server
            .prompts
            .clone()
            .ok_or_else(|| JsonRpcError::method_not_found(method))
    }

    /// Push a `notifications/message` if `level` passes the client's filter.
    async fn log(&self, level: LoggingLevel, logger: &str, data: Value) {
        if level < self.lock().log_level {
            return;
        }
        let params = LoggingMessageParams {
            level,
            logger: Some(logger.to_string()),
            data,
        };
        self.notify(methods::MESSAGE, serde_json::to_value(params).ok())
            .await;
    }

    async fn notify(&self, method: &str, params: Option<Value>) {
        let note = JsonRpcNotification::new(method, params);
        self.send_message(note.into()).await;
    }

    async fn send(&self, response: JsonRpcResponse) {
        self.send_message(response.into()).await;
    }

    async fn send_message(&self, message: JsonRpcMessage) {
        if self.state() == SessionState::Closed {
            return;
        }
        if let Err(err) = self.transport.send(message.to_value()).await {
            warn!(error = %err, "Failed to send message");
        }
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, JsonRpcError> {
    let params = params.unwrap_or_else(|| Value::Object(Default::default()));
    serde_json::from_value(params)
        .map_err(|e| JsonRpcError::invalid_params(format!("Invalid params: {e}")))
}

fn to_result<T: Serialize>(value: T) -> DispatchResult {
    serde_json::to_value(value).map_err(|e| JsonRpcError::internal_error(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::StaticResources;
    use crate::transport::MemoryTransport;
    use std::time::Duration;
    use toolmesh_core::builtin::{echo_handler, echo_spec};
    use toolmesh_core::{SecurityLevel, ToolHandler, ToolOutput, ToolSpec};

    struct Harness {
        peer: MemoryTransport,
        server: McpServer,
        task: tokio::task::JoinHandle<McpResult<()>>,
    }

    impl Harness {
        fn start(server: McpServer) -> Self {
            let (local, peer) = MemoryTransport::pair();
            let serving = server.clone();
            let task = tokio::spawn(async move { serving.serve(Arc::new(local)).await });
            Self { peer, server, task }
        }

        async fn request(&self, id: i64, method: &str, params: Value) -> Value {
            self.peer
                .send(json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
                .await
                .unwrap();
            self.response(id).await
        }

        /// Next response with `id`, skipping notifications.
        async fn response(&self, id: i64) -> Value {
            loop {
                let message = self.peer.receive().await.unwrap().unwrap();
                if message.get("id") == Some(&json!(id)) {
                    return message;
                }
            }
        }

        async fn initialize(&self) {
            let reply = self
                .request(
                    0,
                    "initialize",
                    json!({
                        "protocolVersion": PROTOCOL_VERSION,
                        "capabilities": {},
                        "clientInfo": {"name": "test", "version": "0"}
                    }),
                )
                .await;
            assert!(reply.get("result").is_some(), "{reply}");
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let registry = ToolRegistry::new(SecurityLevel::Safe);
        registry.register(echo_spec(), echo_handler()).unwrap();
        registry
            .register(
                ToolSpec::new("wipe", "Erase everything").tag("dangerous"),
                ToolHandler::blocking(|_, _| Ok(ToolOutput::text("gone"))),
            )
            .unwrap();
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_rejects_unsupported_protocol_version() {
        let harness = Harness::start(McpServer::new(registry()));

        let reply = harness
            .request(
                1,
                "initialize",
                json!({
                    "protocolVersion": "1999-01-01",
                    "capabilities": {},
                    "clientInfo": {"name": "old", "version": "0"}
                }),
            )
            .await;
        assert_eq!(reply["error"]["code"], json!(error_codes::INVALID_PARAMS));

        // Still un-initialized.
        let reply = harness.request(2, "tools/list", json!({})).await;
        assert_eq!(reply["error"]["code"], json!(error_codes::INVALID_REQUEST));
        assert_eq!(reply["error"]["message"], json!("Server not initialized"));
    }

    #[tokio::test]
    async fn test_handshake_and_tool_listing() {
        let harness = Harness::start(McpServer::new(registry()));

        let reply = harness
            .request(
                1,
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {"roots": {"listChanged": true}},
                    "clientInfo": {"name": "test", "version": "0"}
                }),
            )
            .await;
        let result = &reply["result"];
        assert_eq!(result["protocolVersion"], json!(PROTOCOL_VERSION));
        assert_eq!(result["capabilities"]["tools"]["listChanged"], json!(true));
        assert!(result["capabilities"].get("resources").is_none());

        harness
            .peer
            .send(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .await
            .unwrap();
        let note = harness.peer.receive().await.unwrap().unwrap();
        assert_eq!(note["method"], json!(methods::TOOLS_LIST_CHANGED));

        let reply = harness.request(2, "tools/list", json!({})).await;
        let names: Vec<&str> = reply["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["echo"]);
    }

    #[tokio::test]
    async fn test_call_tool() {
        let harness = Harness::start(McpServer::new(registry()));
        harness.initialize().await;

        harness
            .peer
            .send(json!({
                "jsonrpc": "2.0", "id": 5, "method": "tools/call",
                "params": {"name": "echo", "arguments": {"message": "hi"}}
            }))
            .await
            .unwrap();

        let note = harness.peer.receive().await.unwrap().unwrap();
        assert_eq!(note["method"], json!(methods::MESSAGE));
        assert_eq!(note["params"]["data"], json!("Executing tool: echo"));
        assert_eq!(note["params"]["logger"], json!("tools"));

        let reply = harness.response(5).await;
        assert_eq!(reply["result"]["content"][0]["text"], json!("Echo: hi"));
        assert_eq!(reply["result"]["isError"], json!(false));
    }

    #[tokio::test]
    async fn test_call_errors() {
        let harness = Harness::start(McpServer::new(registry()));
        harness.initialize().await;

        let reply = harness
            .request(1, "tools/call", json!({"name": "ghost", "arguments": {}}))
            .await;
        assert_eq!(reply["error"]["code"], json!(error_codes::TOOL_NOT_FOUND));

        let reply = harness
            .request(2, "tools/call", json!({"name": "wipe", "arguments": {}}))
            .await;
        assert_eq!(reply["error"]["code"], json!(error_codes::UNAUTHORIZED));

        let reply = harness
            .request(3, "tools/call", json!({"name": "echo", "arguments": {}}))
            .await;
        assert_eq!(reply["error"]["code"], json!(error_codes::INVALID_PARAMS));

        let reply = harness.request(4, "tools/call", json!({"arguments": {}})).await;
        assert_eq!(reply["error"]["code"], json!(error_codes::INVALID_PARAMS));
    }

    #[tokio::test]
    async fn test_policy_is_rechecked_at_call_time() {
        let harness = Harness::start(McpServer::new(registry()));
        harness.initialize().await;

        harness.server.registry().set_security_level(SecurityLevel::Unrestricted);
        let reply = harness
            .request(1, "tools/call", json!({"name": "wipe", "arguments": {}}))
            .await;
        assert_eq!(reply["result"]["content"][0]["text"], json!("gone"));

        harness.server.registry().set_security_level(SecurityLevel::Safe);
        let reply = harness
            .request(2, "tools/call", json!({"name": "wipe", "arguments": {}}))
            .await;
        assert_eq!(reply["error"]["code"], json!(error_codes::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn test_set_level_filters_log_messages() {
        let harness = Harness::start(McpServer::new(registry()));
        harness.initialize().await;

        let reply = harness
            .request(1, "logging/setLevel", json!({"level": "warning"}))
            .await;
        assert_eq!(reply["result"], json!({}));

        harness
            .peer
            .send(json!({
                "jsonrpc": "2.0", "id": 2, "method": "tools/call",
                "params": {"name": "echo", "arguments": {"message": "quiet"}}
            }))
            .await
            .unwrap();
        // The reply is the very next message: no info-level notification.
        let next = harness.peer.receive().await.unwrap().unwrap();
        assert_eq!(next["id"], json!(2));
    }

    #[tokio::test]
    async fn test_unknown_method_and_missing_providers() {
        let harness = Harness::start(McpServer::new(registry()));
        harness.initialize().await;

        let reply = harness.request(1, "tools/frobnicate", json!({})).await;
        assert_eq!(reply["error"]["code"], json!(error_codes::METHOD_NOT_FOUND));

        let reply = harness.request(2, "resources/list", json!({})).await;
        assert_eq!(reply["error"]["code"], json!(error_codes::METHOD_NOT_FOUND));

        let reply = harness.request(3, "ping", json!({})).await;
        assert_eq!(reply["result"], json!({}));
    }

    #[tokio::test]
    async fn test_resources_served_from_provider() {
        let resources = StaticResources::new().text("memo://a", "a", None, "alpha");
        let server = McpServer::builder(registry())
            .resources(Arc::new(resources))
            .build();
        let harness = Harness::start(server);
        harness.initialize().await;

        let reply = harness.request(1, "resources/list", json!({})).await;
        assert_eq!(reply["result"]["resources"][0]["uri"], json!("memo://a"));

        let reply = harness
            .request(2, "resources/read", json!({"uri": "memo://a"}))
            .await;
        assert_eq!(reply["result"]["contents"][0]["text"], json!("alpha"));

        let reply = harness
            .request(3, "resources/read", json!({"uri": "memo://zzz"}))
            .await;
        assert_eq!(reply["error"]["code"], json!(error_codes::RESOURCE_NOT_FOUND));
    }

    #[tokio::test]
    async fn test_malformed_message_gets_error_reply() {
        let harness = Harness::start(McpServer::new(registry()));
        harness.peer.send(json!({"hello": "world"})).await.unwrap();

        let reply = harness.peer.receive().await.unwrap().unwrap();
        assert_eq!(reply["id"], Value::Null);
        assert_eq!(reply["error"]["code"], json!(error_codes::INVALID_REQUEST));
    }

    #[tokio::test]
    async fn test_slow_call_does_not_block_other_requests() {
        let registry = registry();
        registry
            .register(
                ToolSpec::new("slow", "Sleeps for a while"),
                ToolHandler::from_fn(|_, _| async {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    Ok(ToolOutput::text("done"))
                }),
            )
            .unwrap();
        let harness = Harness::start(McpServer::new(registry));
        harness.initialize().await;
        harness.request(1, "logging/setLevel", json!({"level": "error"})).await;

        harness
            .peer
            .send(json!({
                "jsonrpc": "2.0", "id": 10, "method": "tools/call",
                "params": {"name": "slow", "arguments": {}}
            }))
            .await
            .unwrap();
        harness
            .peer
            .send(json!({"jsonrpc": "2.0", "id": 11, "method": "ping"}))
            .await
            .unwrap();

        let first = harness.peer.receive().await.unwrap().unwrap();
        assert_eq!(first["id"], json!(11));
        let second = harness.peer.receive().await.unwrap().unwrap();
        assert_eq!(second["id"], json!(10));
        assert_eq!(second["result"]["content"][0]["text"], json!("done"));
    }

    #[tokio::test]
    async fn test_notify_tools_changed_reaches_session() {
        let harness = Harness::start(McpServer::new(registry()));
        harness.initialize().await;

        harness.server.notify_tools_changed();
        let note = harness.peer.receive().await.unwrap().unwrap();
        assert_eq!(note["method"], json!(methods::TOOLS_LIST_CHANGED));
    }

    #[tokio::test]
    async fn test_serve_returns_when_peer_closes() {
        let harness = Harness::start(McpServer::new(registry()));
        harness.initialize().await;
        harness.peer.close().await.unwrap();
        harness.task.await.unwrap().unwrap();
    }
}
