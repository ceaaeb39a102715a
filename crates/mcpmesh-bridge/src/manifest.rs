//! Bridge manifest parsing and lookup (§4.7 "Manifest lookup", §6).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use mcpmesh_core::config::BridgeConfigPath;

use crate::error::{BridgeError, Result};

pub const DEFAULT_PROJECT_MANIFEST: &str = "Cargo.toml";
/// Marker used to recognize a project manifest that declares this system
/// as a dependency, when walking ancestor directories in search of one.
pub const DEPENDENCY_MARKER: &str = "mcpmesh";

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeManifest {
    #[serde(rename = "mcpServers")]
    pub mcp_servers: HashMap<String, BridgeManifestEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BridgeManifestEntry {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        cwd: Option<String>,
        #[serde(default)]
        env: HashMap<String, String>,
        #[serde(default)]
        disabled: bool,
    },
    Http {
        url: String,
        #[serde(default)]
        env: HashMap<String, String>,
        #[serde(default)]
        disabled: bool,
    },
}

impl BridgeManifestEntry {
    pub fn is_disabled(&self) -> bool {
        match self {
            Self::Stdio { disabled, .. } | Self::Http { disabled, .. } => *disabled,
        }
    }
}

pub fn parse_manifest(contents: &str) -> Result<BridgeManifest> {
    serde_json::from_str(contents).map_err(|e| BridgeError::Manifest(e.to_string()))
}

/// Resolve the manifest path per §4.7's search order: explicit path env
/// var (handled upstream by [`BridgeConfigPath::Explicit`]); a manifest
/// of the default name in `cwd`; the nearest ancestor directory whose
/// project manifest declares this system as a dependency. An empty
/// explicit path ([`BridgeConfigPath::Disabled`]) disables bridging
/// outright.
pub fn resolve_manifest_path(
    config: &BridgeConfigPath,
    cwd: &Path,
    default_name: &str,
) -> Option<PathBuf> {
    match config {
        BridgeConfigPath::Disabled => None,
        BridgeConfigPath::Explicit(path) => Some(path.clone()),
        BridgeConfigPath::Unset => {
            let candidate = cwd.join(default_name);
            if candidate.exists() {
                return Some(candidate);
            }
            find_ancestor_with_dependency(cwd, default_name)
        }
    }
}

fn find_ancestor_with_dependency(start: &Path, default_name: &str) -> Option<PathBuf> {
    let mut dir = start;
    loop {
        let project_manifest = dir.join(DEFAULT_PROJECT_MANIFEST);
        if project_manifest.exists() {
            if let Ok(contents) = std::fs::read_to_string(&project_manifest) {
                if contents.contains(DEPENDENCY_MARKER) {
                    let candidate = dir.join(default_name);
                    if candidate.exists() {
                        return Some(candidate);
                    }
                }
            }
        }
        dir = dir.parent()?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_stdio_and_http_entries() {
        let json = r#"{
            "mcpServers": {
                "good": { "url": "https://example.com/mcp" },
                "bad": { "command": "missing-thing", "args": [] }
            }
        }"#;
        let manifest = parse_manifest(json).unwrap();
        assert_eq!(manifest.mcp_servers.len(), 2);
        match &manifest.mcp_servers["good"] {
            BridgeManifestEntry::Http { url, .. } => assert_eq!(url, "https://example.com/mcp"),
            _ => panic!("expected http entry"),
        }
        match &manifest.mcp_servers["bad"] {
            BridgeManifestEntry::Stdio { command, .. } => assert_eq!(command, "missing-thing"),
            _ => panic!("expected stdio entry"),
        }
    }

    #[test]
    fn disabled_flag_is_read() {
        let json = r#"{"mcpServers": {"x": {"url": "https://x", "disabled": true}}}"#;
        let manifest = parse_manifest(json).unwrap();
        assert!(manifest.mcp_servers["x"].is_disabled());
    }

    #[test]
    fn explicit_path_disables_search() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_manifest_path(
            &BridgeConfigPath::Disabled,
            dir.path(),
            "mcp-bridges.json",
        );
        assert!(resolved.is_none());
    }

    #[test]
    fn cwd_file_found_when_unset() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("mcp-bridges.json"), "{}").unwrap();
        let resolved =
            resolve_manifest_path(&BridgeConfigPath::Unset, dir.path(), "mcp-bridges.json");
        assert_eq!(resolved, Some(dir.path().join("mcp-bridges.json")));
    }
}
