//! Thin CLI overlay (§3.3's ambient-stack note: `clap` derive + `env`
//! feature) on top of [`mcpmesh_core::config::Config`]'s environment-variable
//! defaults. Flags always win over the corresponding env var.

use std::path::PathBuf;

use clap::Parser;

use mcpmesh_core::config::{BridgeConfigPath, Config};

#[derive(Debug, Parser)]
#[command(name = "mcpmesh", about = "Convention-driven REST/MCP application server")]
pub struct Cli {
    /// HTTP listen port.
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// HTTP listen host.
    #[arg(long, env = "HOST")]
    pub host: Option<String>,

    /// MCP listen port (ignored in `--stdio`).
    #[arg(long, env = "MCP_PORT")]
    pub mcp_port: Option<u16>,

    /// MCP listen host.
    #[arg(long, env = "MCP_HOST")]
    pub mcp_host: Option<String>,

    /// Discovery root directory for handler files.
    #[arg(long, env = "API_PATH")]
    pub api_path: Option<PathBuf>,

    /// Root directory for the prompts/resources cache manager.
    #[arg(long, env = "MCP_BASE_PATH")]
    pub mcp_base_path: Option<PathBuf>,

    /// Path to the bridge manifest; pass an empty string to disable
    /// bridging outright.
    #[arg(long, env = "BRIDGE_CONFIG_PATH")]
    pub bridge_config_path: Option<String>,

    /// Run the MCP surface over stdio instead of a TCP listener.
    #[arg(long, env = "STDIO_MODE")]
    pub stdio: bool,
}

impl Cli {
    /// Load env-sourced defaults, then overlay whatever was passed on
    /// the command line.
    pub fn resolve(self) -> mcpmesh_core::Result<Config> {
        let mut config = Config::from_env()?;

        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(mcp_port) = self.mcp_port {
            config.mcp_port = mcp_port;
        }
        if let Some(mcp_host) = self.mcp_host {
            config.mcp_host = mcp_host;
        }
        if let Some(api_path) = self.api_path {
            config.api_path = api_path;
        }
        if let Some(mcp_base_path) = self.mcp_base_path {
            config.mcp_base_path = mcp_base_path;
        }
        if let Some(raw) = self.bridge_config_path {
            config.bridge_config_path = if raw.is_empty() {
                BridgeConfigPath::Disabled
            } else {
                BridgeConfigPath::Explicit(PathBuf::from(raw))
            };
        }
        if self.stdio {
            config.stdio_mode = true;
        }

        Ok(config)
    }
}
