// Standalone MCP server binary speaking over stdio

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use toolmesh_core::builtin::register_builtin_tools;
use toolmesh_core::{SecurityLevel, ToolRegistry};
use toolmesh_mcp::{McpServer, StdioTransport};

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Toolmesh MCP server starting...");

    let level: SecurityLevel = std::env::var("TOOLMESH_SECURITY_LEVEL")
        .unwrap_or_else(|_| "safe".to_string())
        .parse()
        .map_err(anyhow::Error::msg)
        .context("Invalid TOOLMESH_SECURITY_LEVEL")?;

    let root = match std::env::var("TOOLMESH_ROOT") {
        Ok(root) => PathBuf::from(root),
        Err(_) => std::env::current_dir().context("Failed to determine working directory")?,
    };

    let registry = ToolRegistry::new(level);
    register_builtin_tools(&registry, &root)
        .with_context(|| format!("Failed to register tools under {}", root.display()))?;

    tracing::info!(
        security = %level,
        tools = registry.len(),
        root = %root.display(),
        "Registry ready"
    );

    let server = McpServer::new(Arc::new(registry));
    server.serve(Arc::new(StdioTransport::process())).await?;

    tracing::info!("Toolmesh MCP server stopped");
    Ok(())
}
