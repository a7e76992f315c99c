use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use toolmesh_core::builtin::register_builtin_tools;
use toolmesh_core::{ExecutionLimits, SecurityLevel, ToolRegistry};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ListenConfig,

    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Name reported to MCP clients in `serverInfo`.
    #[serde(default = "default_name")]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub security_level: SecurityLevel,

    /// Directory the file system tools are confined to; defaults to the
    /// working directory.
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Register echo and the file system tools.
    #[serde(default = "default_true")]
    pub builtin: bool,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_name() -> String {
    "toolmesh-gateway".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            name: default_name(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            security_level: SecurityLevel::default(),
            root: None,
            builtin: default_true(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl GatewayConfig {
    pub fn load(config_path: &Path) -> Result<Self> {
        // Load config file if it exists, otherwise use defaults
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .context("Failed to read configuration file")?;
            toml::from_str(&content).context("Failed to parse configuration file")
        } else {
            tracing::info!("Configuration file not found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Build the registry this gateway serves.
    pub fn build_registry(&self) -> Result<ToolRegistry> {
        let limits = ExecutionLimits::default()
            .with_timeout(Duration::from_secs(self.tools.timeout_secs));
        let registry = ToolRegistry::new(self.tools.security_level).with_limits(limits);

        if self.tools.builtin {
            let root = match &self.tools.root {
                Some(root) => root.clone(),
                None => std::env::current_dir().context("Failed to determine working directory")?,
            };
            register_builtin_tools(&registry, &root)
                .with_context(|| format!("Failed to register tools under {}", root.display()))?;
        }

        Ok(registry)
    }
}
