// End-to-end tests against a gateway bound to an ephemeral port

use serde_json::{json, Map, Value};
use std::sync::Arc;
use tempfile::TempDir;
use toolmesh_core::builtin::register_builtin_tools;
use toolmesh_core::{SecurityLevel, ToolOutput, ToolRegistry};
use toolmesh_gateway::{create_router, AppState};
use toolmesh_mcp::protocol::{error_codes, ToolContent};
use toolmesh_mcp::{McpClient, McpServer, SseTransport, WebSocketTransport};

struct Gateway {
    base: String,
    state: AppState,
    _root: TempDir,
}

async fn spawn_gateway(level: SecurityLevel) -> Gateway {
    let root = TempDir::new().unwrap();
    std::fs::write(root.path().join("notes.txt"), "remember the milk").unwrap();

    let registry = ToolRegistry::new(level);
    register_builtin_tools(&registry, root.path()).unwrap();
    let state = AppState::new(McpServer::new(Arc::new(registry)));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Gateway {
        base: format!("127.0.0.1:{}", addr.port()),
        state,
        _root: root,
    }
}

fn args(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[tokio::test]
async fn test_health_reports_registry() {
    let gateway = spawn_gateway(SecurityLevel::Safe).await;

    let body: Value = reqwest::get(format!("http://{}/health", gateway.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "ok");
    assert_eq!(body["security_level"], "safe");
    assert_eq!(body["tools"], 8);
}

#[tokio::test]
async fn test_sse_session_round_trip() {
    let gateway = spawn_gateway(SecurityLevel::Safe).await;
    let transport = SseTransport::connect(&format!("http://{}/sse", gateway.base))
        .await
        .unwrap();
    let client = McpClient::new(Arc::new(transport));

    let init = client.connect().await.unwrap();
    assert_eq!(init.server_info.name, "toolmesh-mcp");
    assert_eq!(gateway.state.sessions.len(), 1);

    let mut names: Vec<String> = client
        .list_tools()
        .await
        .unwrap()
        .into_iter()
        .map(|tool| tool.name)
        .collect();
    names.sort();
    // Safe hides delete_file, which is tagged dangerous.
    assert_eq!(
        names,
        vec![
            "create_directory",
            "echo",
            "file_exists",
            "file_info",
            "list_directory",
            "read_file",
            "write_file",
        ]
    );

    let result = client
        .call_tool("echo", args(json!({"message": "over sse"})))
        .await
        .unwrap();
    assert!(!result.is_error);
    assert_eq!(result.content, vec![ToolContent::text("Echo: over sse")]);

    let result = client
        .call_tool("read_file", args(json!({"path": "notes.txt"})))
        .await
        .unwrap();
    assert_eq!(result.content, vec![ToolContent::text("remember the milk")]);

    client.disconnect().await;
}

#[tokio::test]
async fn test_websocket_session_round_trip() {
    let gateway = spawn_gateway(SecurityLevel::Sandboxed).await;
    let transport = WebSocketTransport::connect(&format!("ws://{}/ws", gateway.base))
        .await
        .unwrap();
    let client = McpClient::new(Arc::new(transport));
    client.connect().await.unwrap();

    client.ping().await.unwrap();

    let err = client.call_tool("ghost", Map::new()).await.unwrap_err();
    assert_eq!(err.code(), Some(error_codes::TOOL_NOT_FOUND));

    // Sandboxed denies file writes.
    let err = client
        .call_tool("write_file", args(json!({"path": "x.txt", "content": "x"})))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(error_codes::UNAUTHORIZED));

    client.disconnect().await;
}

#[tokio::test]
async fn test_remote_tools_run_through_local_registry() {
    let gateway = spawn_gateway(SecurityLevel::Safe).await;
    let transport = WebSocketTransport::connect(&format!("ws://{}/ws", gateway.base))
        .await
        .unwrap();
    let client = McpClient::new(Arc::new(transport));
    client.connect().await.unwrap();

    let local = ToolRegistry::new(SecurityLevel::Safe);
    let imported = client
        .register_remote_tools(&local, Some("gw"))
        .await
        .unwrap();
    assert_eq!(imported.len(), 7);
    assert!(local.exists("gw_read_file"));
    assert!(!local.exists("gw_delete_file"));

    let result = local
        .invoke("gw_echo", args(json!({"message": "proxied"})))
        .await;
    assert!(result.success(), "{:?}", result.error());
    assert_eq!(result.data(), Some(&ToolOutput::text("Echo: proxied")));

    client.disconnect().await;
}

#[tokio::test]
async fn test_message_endpoint_validates_body() {
    let gateway = spawn_gateway(SecurityLevel::Safe).await;
    let http = reqwest::Client::new();

    let mut stream = http
        .get(format!("http://{}/sse", gateway.base))
        .header("Accept", "text/event-stream")
        .send()
        .await
        .unwrap();

    // Read until the endpoint event has arrived.
    let mut buffer = String::new();
    while !buffer.contains("\n\n") {
        let chunk = stream.chunk().await.unwrap().unwrap();
        buffer.push_str(&String::from_utf8_lossy(&chunk));
    }
    assert!(buffer.contains("event: endpoint"));
    let path = buffer
        .lines()
        .find_map(|line| line.strip_prefix("data: "))
        .unwrap()
        .to_string();
    assert!(path.starts_with("/message?sessionId="));

    let url = format!("http://{}{}", gateway.base, path);
    let response = http.post(&url).body("{oops").send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    let response = http.post(&url).body("[1, 2]").send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    let response = http
        .post(&url)
        .json(&json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);
}
