//! Shared introspection projection types (§4.12).
//!
//! `GET /api-info`, MCP `tools/list`, and the health surface all build
//! from the same `ServerSpec`-shaped view rather than duplicating
//! assembly logic.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerSpec {
    pub server_info: ServerInfo,
    pub tools: Vec<ToolSpec>,
    pub resources: Vec<ResourceSpec>,
    pub prompts: Vec<PromptSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub input_schema: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<serde_json::Value>,
    /// Which bridge exposed this tool, `None` for locally-derived tools.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_bridge: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub uri: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptSpec {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub arguments: Vec<PromptArgument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptArgument {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

impl ServerSpec {
    pub fn summary(&self) -> String {
        format!(
            "{}: {} tools, {} resources, {} prompts",
            self.server_info.name,
            self.tools.len(),
            self.resources.len(),
            self.prompts.len()
        )
    }
}

/// Per-bridge status surfaced alongside an aggregated list (§4.10,
/// testable property 9: "the reply contains an error entry for each
/// failure").
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BridgeStatusMap {
    pub servers: HashMap<String, BridgeStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeStatus {
    pub tool_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_format() {
        let spec = ServerSpec {
            server_info: ServerInfo {
                name: "mesh".into(),
                version: "0.1.0".into(),
            },
            tools: vec![],
            resources: vec![],
            prompts: vec![],
        };
        assert_eq!(spec.summary(), "mesh: 0 tools, 0 resources, 0 prompts");
    }
}
