//! MCP request multiplexer (C10, §4.10): one JSON-RPC surface aggregating
//! locally-derived tools (C6) with every ready bridge's tools (C7/C8),
//! plus prompts/resources delegated to the cache manager (C11).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};

use mcpmesh_bridge::{BridgeSupervisor, SchemaAdapterTable};
use mcpmesh_core::route::{path_placeholders, RequestCtx, Route};
use mcpmesh_core::spec::{
    BridgeStatus, BridgeStatusMap, PromptArgument, PromptSpec, ResourceSpec, ServerInfo, ToolSpec,
};
use mcpmesh_discovery::RouteRegistry;
use mcpmesh_schema::route_mapping::RouteMapping;
use mcpmesh_schema::tool::synthesize_tools_indexed;

use crate::cache::{CacheKind, CacheManager};
use crate::error::{McpError, Result};

pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
const DEFAULT_BRIDGE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Multiplexer {
    registry: Arc<RouteRegistry>,
    bridges: Arc<BridgeSupervisor>,
    adapters: SchemaAdapterTable,
    cache: Arc<CacheManager>,
    route_mapping: Option<RouteMapping>,
    server_info: ServerInfo,
    bridge_timeout: Duration,
}

/// Result of aggregating `tools/list`: the merged tool set plus a
/// per-bridge status section (§4.10: "per-bridge failures ... never fail
/// the aggregate").
pub struct ToolListResult {
    pub tools: Vec<ToolSpec>,
    pub bridge_status: BridgeStatusMap,
}

impl Multiplexer {
    pub fn new(
        registry: Arc<RouteRegistry>,
        bridges: Arc<BridgeSupervisor>,
        adapters: SchemaAdapterTable,
        cache: Arc<CacheManager>,
        route_mapping: Option<RouteMapping>,
        server_info: ServerInfo,
    ) -> Self {
        Self {
            registry,
            bridges,
            adapters,
            cache,
            route_mapping,
            server_info,
            bridge_timeout: DEFAULT_BRIDGE_TIMEOUT,
        }
    }

    pub fn with_bridge_timeout(mut self, timeout: Duration) -> Self {
        self.bridge_timeout = timeout;
        self
    }

    /// Subscribe to registry publishes, one tick per snapshot swap —
    /// transports use this to emit `notifications/tools/list_changed`
    /// (§4.4 step 4, §8 S2).
    pub fn subscribe_tool_changes(&self) -> tokio::sync::broadcast::Receiver<()> {
        self.registry.subscribe()
    }

    /// `initialize`.
    pub fn initialize(&self) -> Value {
        json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "serverInfo": { "name": self.server_info.name, "version": self.server_info.version },
            "capabilities": {
                "tools": {},
                "prompts": {},
                "resources": {},
            },
        })
    }

    /// `tools/list`: local tools from the current registry snapshot, plus
    /// every ready bridge's tools fetched in parallel.
    pub async fn list_tools(&self) -> ToolListResult {
        let table = self.registry.snapshot();
        let indexed = synthesize_tools_indexed(&table, self.route_mapping.as_ref());
        let mut tools: Vec<ToolSpec> = indexed.into_iter().map(|(spec, _)| spec).collect();

        let mut bridge_status = BridgeStatusMap::default();
        let ready = self.bridges.ready_bridges();

        let fetches = ready.into_iter().map(|bridge| {
            let timeout = self.bridge_timeout;
            async move {
                let result = bridge
                    .client
                    .request("tools/list", json!({}), timeout)
                    .await;
                (bridge, result)
            }
        });
        let results = futures::future::join_all(fetches).await;

        for (bridge, result) in results {
            match result {
                Ok(value) => {
                    let bridge_tools = parse_bridge_tools(&value, &bridge.name);
                    *bridge.tools.write() = Some(bridge_tools.clone());
                    bridge_status.servers.insert(
                        bridge.name.clone(),
                        BridgeStatus {
                            tool_count: bridge_tools.len(),
                            error: None,
                        },
                    );
                    tools.extend(bridge_tools);
                }
                Err(e) => {
                    bridge_status.servers.insert(
                        bridge.name.clone(),
                        BridgeStatus {
                            tool_count: 0,
                            error: Some(e.to_string()),
                        },
                    );
                }
            }
        }

        ToolListResult {
            tools,
            bridge_status,
        }
    }

    /// `tools/call`: dispatch to a local handler or the owning bridge.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        let table = self.registry.snapshot();
        let indexed = synthesize_tools_indexed(&table, self.route_mapping.as_ref());
        if let Some((_, route)) = indexed.into_iter().find(|(spec, _)| spec.name == name) {
            return Ok(self.call_local(&route, &arguments).await);
        }

        for bridge in self.bridges.ready_bridges() {
            let known = bridge.tools.read().clone();
            let Some(known) = known else { continue };
            if known.iter().any(|t| t.name == name) {
                let adapted = self.adapters.adapt(name, &arguments);
                let params = json!({ "name": name, "arguments": adapted });
                let result = bridge
                    .client
                    .request("tools/call", params, self.bridge_timeout)
                    .await
                    .map_err(|e| McpError::Io(std::io::Error::other(e.to_string())))?;
                return Ok(result);
            }
        }

        Err(McpError::UnknownTool(name.to_string()))
    }

    async fn call_local(&self, route: &Route, arguments: &Value) -> Value {
        let ctx = build_request_ctx(route, arguments);
        let response = route.handler.invoke(ctx).await;
        json!({
            "content": [{ "type": "text", "text": response.body.to_string() }],
            "isError": response.status >= 400,
        })
    }

    /// `prompts/list`.
    pub fn list_prompts(&self) -> Result<Vec<PromptSpec>> {
        let entries = self.cache.list(CacheKind::Prompt)?;
        Ok(entries
            .into_iter()
            .map(|entry| PromptSpec {
                name: entry.name,
                description: None,
                arguments: entry
                    .parameters
                    .into_iter()
                    .map(|name| PromptArgument {
                        name,
                        description: None,
                        required: true,
                    })
                    .collect(),
            })
            .collect())
    }

    /// `prompts/get`.
    pub fn get_prompt(&self, relative_path: &std::path::Path) -> Result<Option<Value>> {
        let Some(entry) = self.cache.get(CacheKind::Prompt, relative_path)? else {
            return Ok(None);
        };
        Ok(Some(json!({
            "description": entry.name,
            "messages": [{
                "role": "user",
                "content": { "type": "text", "text": entry.content },
            }],
        })))
    }

    /// `resources/list`.
    pub fn list_resources(&self) -> Result<Vec<ResourceSpec>> {
        let entries = self.cache.list(CacheKind::Resource)?;
        Ok(entries
            .into_iter()
            .map(|entry| ResourceSpec {
                uri: format!("resource://{}", entry.relative_path.display()),
                name: entry.name,
                description: None,
                mime_type: mime_type_for(entry.format),
            })
            .collect())
    }

    /// `resources/read`.
    pub fn read_resource(&self, relative_path: &std::path::Path) -> Result<Option<Value>> {
        let Some(entry) = self.cache.get(CacheKind::Resource, relative_path)? else {
            return Ok(None);
        };
        Ok(Some(json!({
            "contents": [{
                "uri": format!("resource://{}", entry.relative_path.display()),
                "mimeType": mime_type_for(entry.format),
                "text": entry.content,
            }],
        })))
    }
}

fn mime_type_for(format: crate::cache::ContentFormat) -> Option<String> {
    use crate::cache::ContentFormat::*;
    Some(
        match format {
            Markdown => "text/markdown",
            Text => "text/plain",
            JavaScript => "application/javascript",
            TypeScript => "application/typescript",
            Json => "application/json",
            Yaml => "application/yaml",
        }
        .to_string(),
    )
}

/// Reconstruct a minimal request context from a flat `tools/call`
/// argument object, reversing the flattening `mcpmesh_core::schema`
/// applies when building the tool's `inputSchema`.
fn build_request_ctx(route: &Route, arguments: &Value) -> RequestCtx {
    let mut ctx = RequestCtx::default();
    let Some(args) = arguments.as_object() else {
        return ctx;
    };

    let placeholders: HashSet<String> = path_placeholders(&route.url_template).into_iter().collect();
    let query_keys: HashSet<String> = route
        .schema
        .query
        .as_ref()
        .and_then(|q| q.get("properties"))
        .and_then(Value::as_object)
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default();

    let mut body_obj = Map::new();

    for (key, value) in args {
        if placeholders.contains(key) {
            ctx.path.insert(key.clone(), value.clone());
            continue;
        }
        if query_keys.contains(key) {
            ctx.query.insert(key.clone(), value.clone());
            continue;
        }
        if let Some((parent, child)) = key.split_once('.') {
            let entry = body_obj
                .entry(parent.to_string())
                .or_insert_with(|| json!({}));
            if let Some(obj) = entry.as_object_mut() {
                obj.insert(child.to_string(), value.clone());
            }
        } else {
            body_obj.insert(key.clone(), value.clone());
        }
    }

    if !body_obj.is_empty() {
        ctx.body = Some(Value::Object(body_obj));
    }
    ctx
}

fn parse_bridge_tools(value: &Value, bridge_name: &str) -> Vec<ToolSpec> {
    let Some(tools) = value.get("tools").and_then(Value::as_array) else {
        return Vec::new();
    };
    tools
        .iter()
        .filter_map(|t| {
            let name = t.get("name")?.as_str()?.to_string();
            let description = t
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let input_schema = t
                .get("inputSchema")
                .cloned()
                .unwrap_or_else(|| json!({ "type": "object", "properties": {} }));
            Some(ToolSpec {
                name,
                description,
                summary: None,
                input_schema,
                response_schema: None,
                source_bridge: Some(bridge_name.to_string()),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpmesh_bridge::SchemaAdapterTable;
    use mcpmesh_core::route::{FnHandler, HandlerRef, HttpMethod, ResponseCtx};
    use mcpmesh_core::schema::SchemaBundle;
    use mcpmesh_discovery::registry::RouteTableBuilder;
    use std::sync::Arc as StdArc;

    fn registry_with(route: Route) -> Arc<RouteRegistry> {
        let mut builder = RouteTableBuilder::new();
        builder.upsert(route);
        let registry = Arc::new(RouteRegistry::new());
        registry.publish(builder.build());
        registry
    }

    fn echo_route(method: HttpMethod, template: &str) -> Route {
        Route {
            method,
            url_template: template.to_string(),
            handler: HandlerRef::FuncHandler(StdArc::new(FnHandler(|ctx: RequestCtx| async move {
                ResponseCtx::ok(json!({ "received": ctx.path, "body": ctx.body }))
            }))),
            file_path: "a/get.so".into(),
            schema: SchemaBundle::default(),
        }
    }

    fn test_multiplexer(registry: Arc<RouteRegistry>) -> Multiplexer {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path().to_path_buf(), dir.path().to_path_buf());
        Multiplexer::new(
            registry,
            Arc::new(BridgeSupervisor::new()),
            SchemaAdapterTable::new(),
            cache,
            None,
            ServerInfo {
                name: "mcpmesh".to_string(),
                version: "0.1.0".to_string(),
            },
        )
    }

    #[test]
    fn initialize_advertises_protocol_and_capabilities() {
        let registry = Arc::new(RouteRegistry::new());
        let mux = test_multiplexer(registry);
        let result = mux.initialize();
        assert_eq!(result["protocolVersion"], MCP_PROTOCOL_VERSION);
        assert!(result["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn list_tools_includes_local_routes_with_empty_bridge_status() {
        let mut r = echo_route(HttpMethod::Get, "/users/{id}");
        r.schema.reconcile_path_params(&["id".to_string()]);
        let registry = registry_with(r);
        let mux = test_multiplexer(registry);
        let result = mux.list_tools().await;
        assert_eq!(result.tools.len(), 1);
        assert!(result.bridge_status.servers.is_empty());
    }

    #[tokio::test]
    async fn call_tool_dispatches_to_local_handler() {
        let mut r = echo_route(HttpMethod::Get, "/users/{id}");
        r.schema.reconcile_path_params(&["id".to_string()]);
        let registry = registry_with(r);
        let mux = test_multiplexer(registry);
        let result = mux
            .call_tool("users_id_get", json!({"id": "42"}))
            .await
            .unwrap();
        let text = result["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("42"));
    }

    #[tokio::test]
    async fn call_tool_unknown_name_errors() {
        let registry = Arc::new(RouteRegistry::new());
        let mux = test_multiplexer(registry);
        let err = mux.call_tool("does_not_exist", json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::UnknownTool(_)));
    }

    #[test]
    fn build_request_ctx_splits_path_and_body() {
        let mut r = echo_route(HttpMethod::Post, "/items/{id}");
        r.schema.reconcile_path_params(&["id".to_string()]);
        let args = json!({"id": "7", "body.name": "widget"});
        let ctx = build_request_ctx(&r, &args);
        assert_eq!(ctx.path["id"], "7");
        assert_eq!(ctx.body.unwrap()["name"], "widget");
    }
}
