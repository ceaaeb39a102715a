//! MCP tool synthesizer (C6, §4.6): projects routes into MCP tool
//! descriptors, honoring the optional route-mapping hook (§4.13).

use std::collections::HashSet;

use serde_json::{json, Map, Value};

use mcpmesh_core::route::{path_placeholders, Route};
use mcpmesh_core::schema::{ensure_array_items, flatten_one_level, flatten_required};
use mcpmesh_core::spec::ToolSpec;
use mcpmesh_discovery::registry::RouteTable;

use crate::route_mapping::{McpKind, RouteMapping};

/// `name`: stable function of `(method, urlTemplate)` — `/` becomes `_`,
/// suffixed with the lowercase method. `{}` placeholder braces are kept
/// verbatim (§4.6: `api_users_{id}_get`).
pub fn tool_name(method: mcpmesh_core::route::HttpMethod, url_template: &str) -> String {
    let path_part = url_template.trim_start_matches('/').replace('/', "_");
    if path_part.is_empty() {
        format!("root_{}", method.as_lower())
    } else {
        format!("{path_part}_{}", method.as_lower())
    }
}

fn input_schema(bundle: &mcpmesh_core::schema::SchemaBundle, placeholders: &[String]) -> Value {
    let mut properties = Map::new();
    let mut required = HashSet::new();

    if let Some(body) = &bundle.body {
        for (key, value) in flatten_one_level(body) {
            properties.insert(key, value);
        }
        for key in flatten_required(body) {
            required.insert(key);
        }
    }
    if let Some(query) = &bundle.query {
        if let Some(props) = query.get("properties").and_then(Value::as_object) {
            for (key, value) in props {
                properties.insert(key.clone(), value.clone());
            }
        }
        for key in flatten_required(query) {
            required.insert(key);
        }
    }
    if let Some(path) = &bundle.path {
        if let Some(props) = path.get("properties").and_then(Value::as_object) {
            for (key, value) in props {
                properties.insert(key.clone(), value.clone());
            }
        }
    }
    for name in placeholders {
        properties
            .entry(name.clone())
            .or_insert_with(|| json!({ "type": "string" }));
        required.insert(name.clone());
    }

    let mut schema = json!({
        "type": "object",
        "properties": Value::Object(properties),
        "required": Value::Array(required.into_iter().map(Value::String).collect()),
    });
    ensure_array_items(&mut schema);
    schema
}

/// Project every valid route in `table` into an MCP tool, optionally
/// diverting some routes to `Resource`/`Skip` via `mapping`.
pub fn synthesize_tools(table: &RouteTable, mapping: Option<&RouteMapping>) -> Vec<ToolSpec> {
    synthesize_tools_indexed(table, mapping)
        .into_iter()
        .map(|(spec, _)| spec)
        .collect()
}

/// Same projection as [`synthesize_tools`], but pairs each tool with the
/// route it was derived from — used by the request multiplexer (C10) to
/// dispatch a `tools/call` by name back to its handler.
pub fn synthesize_tools_indexed(
    table: &RouteTable,
    mapping: Option<&RouteMapping>,
) -> Vec<(ToolSpec, Route)> {
    let mut tools = Vec::new();
    let mut used_names: HashSet<String> = HashSet::new();

    for route in table.valid_routes() {
        if let Some(mapping) = mapping {
            if mapping.kind_for(route.method, &route.url_template) != McpKind::Tool {
                continue;
            }
        }

        let base_name = tool_name(route.method, &route.url_template);
        let name = dedupe_name(base_name, &mut used_names);

        let placeholders = path_placeholders(&route.url_template);
        let description = if route.schema.description == mcpmesh_core::schema::DEFAULT_DESCRIPTION
        {
            format!("Execute {} {}", route.method, route.url_template)
        } else {
            route.schema.description.clone()
        };

        tools.push((
            ToolSpec {
                name,
                description,
                summary: Some(route.schema.summary.clone()),
                input_schema: input_schema(&route.schema, &placeholders),
                response_schema: route.schema.response.clone(),
                source_bridge: None,
            },
            route.clone(),
        ));
    }

    tools
}

fn dedupe_name(base: String, used: &mut HashSet<String>) -> String {
    if used.insert(base.clone()) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}{n}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpmesh_core::route::{FnHandler, HandlerRef, HttpMethod, ResponseCtx, Route};
    use mcpmesh_core::schema::SchemaBundle;
    use mcpmesh_discovery::registry::RouteTableBuilder;
    use std::sync::Arc;

    fn route(method: HttpMethod, template: &str, file: &str) -> Route {
        Route {
            method,
            url_template: template.to_string(),
            handler: HandlerRef::FuncHandler(Arc::new(FnHandler(|_| async move {
                ResponseCtx::ok(serde_json::Value::Null)
            }))),
            file_path: file.into(),
            schema: SchemaBundle::default(),
        }
    }

    #[test]
    fn tool_name_keeps_braces_and_suffixes_method() {
        assert_eq!(
            tool_name(HttpMethod::Get, "/users/{id}"),
            "users_{id}_get"
        );
    }

    #[test]
    fn tool_name_matches_s1_scenario() {
        assert_eq!(tool_name(HttpMethod::Get, "/api/users"), "api_users_get");
        assert_eq!(
            tool_name(HttpMethod::Get, "/api/users/{id}"),
            "api_users_{id}_get"
        );
    }

    /// §8 S1: `/mcp/tools` lists `api_users_get` and `api_users_{id}_get`.
    #[test]
    fn synthesize_tools_matches_s1_names() {
        let mut builder = RouteTableBuilder::new();
        builder.upsert(route(HttpMethod::Get, "/api/users", "api/users/get.so"));
        builder.upsert(route(
            HttpMethod::Get,
            "/api/users/{id}",
            "api/users/[id]/get.so",
        ));
        let table = builder.build();
        let names: HashSet<String> = synthesize_tools(&table, None)
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert!(names.contains("api_users_get"));
        assert!(names.contains("api_users_{id}_get"));
    }

    #[test]
    fn path_placeholder_becomes_required_string_input() {
        let mut builder = RouteTableBuilder::new();
        let mut r = route(HttpMethod::Get, "/users/{id}", "a/get.so");
        r.schema.reconcile_path_params(&["id".to_string()]);
        builder.upsert(r);
        let table = builder.build();
        let tools = synthesize_tools(&table, None);
        assert_eq!(tools.len(), 1);
        let schema = &tools[0].input_schema;
        assert_eq!(schema["properties"]["id"]["type"], "string");
        assert!(schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .any(|v| v == "id"));
    }

    #[test]
    fn route_mapping_can_skip_a_route() {
        let mut builder = RouteTableBuilder::new();
        builder.upsert(route(HttpMethod::Get, "/admin/secret", "a/get.so"));
        let table = builder.build();
        let mapping = RouteMapping::new().skip_pattern(r"^/admin/.*").unwrap();
        let tools = synthesize_tools(&table, Some(&mapping));
        assert!(tools.is_empty());
    }

    #[test]
    fn default_mapping_always_produces_a_tool() {
        let mut builder = RouteTableBuilder::new();
        builder.upsert(route(HttpMethod::Get, "/users", "a/get.so"));
        let table = builder.build();
        let tools = synthesize_tools(&table, None);
        assert_eq!(tools.len(), 1);
    }
}
