use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use toolmesh_core::SecurityLevel;
use toolmesh_gateway::{AppState, GatewayConfig};
use toolmesh_mcp::McpServer;

#[derive(Parser, Debug)]
#[command(name = "toolmesh-gateway")]
#[command(about = "Serve a Toolmesh tool registry to MCP clients over SSE and WebSocket", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "toolmesh.toml")]
    config: PathBuf,

    /// Host to bind to (overrides the config file)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Security level: unrestricted, safe, sandboxed or restricted
    #[arg(short, long)]
    security: Option<SecurityLevel>,

    /// Directory the file system tools are confined to
    #[arg(short, long)]
    root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    let args = Args::parse();

    tracing::info!("Starting Toolmesh gateway");

    let mut config = GatewayConfig::load(&args.config)?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(level) = args.security {
        config.tools.security_level = level;
    }
    if let Some(root) = args.root {
        config.tools.root = Some(root);
    }

    let registry = config
        .build_registry()
        .context("Failed to build tool registry")?;
    tracing::info!(
        security = %registry.security_level(),
        tools = registry.len(),
        "Registry ready"
    );

    let server = McpServer::builder(Arc::new(registry))
        .name(config.server.name.clone())
        .build();

    toolmesh_gateway::serve(&config.addr(), AppState::new(server)).await?;

    Ok(())
}
