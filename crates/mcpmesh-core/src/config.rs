//! Runtime configuration, loaded from environment variables.
//!
//! Mirrors the CLI-facing environment variables named in the external
//! interfaces section: `PORT`/`MCP_PORT`, `HOST`/`MCP_HOST`, `API_PATH`,
//! `MCP_BASE_PATH`, `BRIDGE_CONFIG_PATH`, `STDIO_MODE`, plus the
//! out-of-core-scope static-file and CORS knobs, which are parsed but
//! otherwise inert.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{MeshError, Result};

/// Default HTTP listen port for the REST+OpenAPI surface.
pub const DEFAULT_PORT: u16 = 8887;
/// Default listen port for the MCP JSON-RPC surface (when not `STDIO_MODE`).
pub const DEFAULT_MCP_PORT: u16 = 8888;
/// Default discovery root, relative to the process working directory.
pub const DEFAULT_API_PATH: &str = "./api";
/// Default prompts/resources root for the MCP cache manager.
pub const DEFAULT_MCP_BASE_PATH: &str = "./mcp";
/// Default bridge manifest file name, searched for per the lookup order.
pub const DEFAULT_BRIDGE_MANIFEST_NAME: &str = "mcp-bridges.json";

/// Full runtime configuration for one mcpmesh process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP listen port.
    pub port: u16,
    /// HTTP listen host.
    pub host: String,
    /// MCP listen port (ignored when `stdio_mode` is set).
    pub mcp_port: u16,
    /// MCP listen host.
    pub mcp_host: String,
    /// Discovery root directory for handler files.
    pub api_path: PathBuf,
    /// Root directory for the prompts/resources cache manager.
    pub mcp_base_path: PathBuf,
    /// Path to the bridge manifest. `None` when bridging is disabled
    /// (an explicitly empty env var), distinct from "unset" which
    /// triggers the manifest lookup search order.
    pub bridge_config_path: BridgeConfigPath,
    /// Run the MCP surface over stdio instead of a TCP listener.
    pub stdio_mode: bool,
    /// Out-of-core-scope static file serving; recognized but inert.
    pub static_directory: Option<PathBuf>,
    /// Out-of-core-scope static file serving; recognized but inert.
    pub serve_index: bool,
    /// Out-of-core-scope static file serving; recognized but inert.
    pub default_file: Option<String>,
}

/// Resolved state of the `BRIDGE_CONFIG_PATH` environment variable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum BridgeConfigPath {
    /// Not set — fall back to the manifest lookup search order.
    Unset,
    /// Explicitly set to an empty string — bridging is disabled entirely.
    Disabled,
    /// Set to a path — use it directly.
    Explicit(PathBuf),
}

impl Config {
    /// Load configuration from process environment variables, falling
    /// back to documented defaults for anything unset.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::Config`] if a numeric env var fails to parse.
    pub fn from_env() -> Result<Self> {
        Self::from_env_source(&std::env::vars().collect())
    }

    /// Same as [`Config::from_env`] but reading from an explicit map,
    /// so tests don't need to mutate the real process environment.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::Config`] if a numeric env var fails to parse.
    pub fn from_env_source(
        vars: &std::collections::HashMap<String, String>,
    ) -> Result<Self> {
        let port = parse_opt_u16(vars.get("PORT"))?.unwrap_or(DEFAULT_PORT);
        let mcp_port = parse_opt_u16(vars.get("MCP_PORT"))?.unwrap_or(DEFAULT_MCP_PORT);
        let host = vars
            .get("HOST")
            .cloned()
            .unwrap_or_else(|| "0.0.0.0".to_string());
        let mcp_host = vars
            .get("MCP_HOST")
            .cloned()
            .unwrap_or_else(|| host.clone());
        let api_path = vars
            .get("API_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_API_PATH));
        let mcp_base_path = vars
            .get("MCP_BASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MCP_BASE_PATH));

        let bridge_config_path = match vars.get("BRIDGE_CONFIG_PATH") {
            None => BridgeConfigPath::Unset,
            Some(s) if s.is_empty() => {
                tracing::info!("BRIDGE_CONFIG_PATH is empty; bridging disabled");
                BridgeConfigPath::Disabled
            }
            Some(s) => BridgeConfigPath::Explicit(PathBuf::from(s)),
        };

        let stdio_mode = parse_bool(vars.get("STDIO_MODE"));
        let static_directory = vars.get("STATIC_DIRECTORY").map(PathBuf::from);
        let serve_index = parse_bool(vars.get("SERVE_INDEX"));
        let default_file = vars.get("DEFAULT_FILE").cloned();

        Ok(Self {
            port,
            host,
            mcp_port,
            mcp_host,
            api_path,
            mcp_base_path,
            bridge_config_path,
            stdio_mode,
            static_directory,
            serve_index,
            default_file,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            host: "0.0.0.0".to_string(),
            mcp_port: DEFAULT_MCP_PORT,
            mcp_host: "0.0.0.0".to_string(),
            api_path: PathBuf::from(DEFAULT_API_PATH),
            mcp_base_path: PathBuf::from(DEFAULT_MCP_BASE_PATH),
            bridge_config_path: BridgeConfigPath::Unset,
            stdio_mode: false,
            static_directory: None,
            serve_index: false,
            default_file: None,
        }
    }
}

fn parse_opt_u16(raw: Option<&String>) -> Result<Option<u16>> {
    match raw {
        None => Ok(None),
        Some(s) => s
            .parse::<u16>()
            .map(Some)
            .map_err(|e| MeshError::config(format!("invalid port {s:?}: {e}"))),
    }
}

fn parse_bool(raw: Option<&String>) -> bool {
    matches!(
        raw.map(String::as_str),
        Some("1") | Some("true") | Some("TRUE") | Some("yes")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_when_unset() {
        let cfg = Config::from_env_source(&HashMap::new()).unwrap();
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.mcp_port, DEFAULT_MCP_PORT);
        assert_eq!(cfg.bridge_config_path, BridgeConfigPath::Unset);
        assert!(!cfg.stdio_mode);
    }

    #[test]
    fn empty_bridge_path_disables_bridging() {
        let mut vars = HashMap::new();
        vars.insert("BRIDGE_CONFIG_PATH".to_string(), String::new());
        let cfg = Config::from_env_source(&vars).unwrap();
        assert_eq!(cfg.bridge_config_path, BridgeConfigPath::Disabled);
    }

    #[test]
    fn explicit_bridge_path() {
        let mut vars = HashMap::new();
        vars.insert("BRIDGE_CONFIG_PATH".to_string(), "/tmp/b.json".to_string());
        let cfg = Config::from_env_source(&vars).unwrap();
        assert_eq!(
            cfg.bridge_config_path,
            BridgeConfigPath::Explicit(PathBuf::from("/tmp/b.json"))
        );
    }

    #[test]
    fn invalid_port_is_config_error() {
        let mut vars = HashMap::new();
        vars.insert("PORT".to_string(), "notanumber".to_string());
        assert!(Config::from_env_source(&vars).is_err());
    }

    #[test]
    fn mcp_host_falls_back_to_host() {
        let mut vars = HashMap::new();
        vars.insert("HOST".to_string(), "127.0.0.1".to_string());
        let cfg = Config::from_env_source(&vars).unwrap();
        assert_eq!(cfg.mcp_host, "127.0.0.1");
    }
}
