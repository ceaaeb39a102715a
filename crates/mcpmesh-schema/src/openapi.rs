//! OpenAPI synthesizer (C5, §4.5): projects a route registry snapshot
//! into an OpenAPI 3.0.0 document.

use std::collections::{HashMap, HashSet};

use serde_json::{json, Map, Value};

use mcpmesh_core::route::path_placeholders;
use mcpmesh_discovery::registry::RouteTable;

/// `info`/`servers` fields the caller supplies; everything else is
/// derived from the registry.
#[derive(Debug, Clone)]
pub struct ApiInfo {
    pub title: String,
    pub version: String,
    pub server_url: String,
}

impl Default for ApiInfo {
    fn default() -> Self {
        Self {
            title: "mcpmesh API".to_string(),
            version: "0.1.0".to_string(),
            server_url: "http://localhost:8887".to_string(),
        }
    }
}

/// Build the OpenAPI document for the current registry snapshot.
pub fn synthesize(table: &RouteTable, info: &ApiInfo) -> Value {
    let mut paths = Map::new();
    let mut used_operation_ids: HashSet<String> = HashSet::new();

    let mut by_path: HashMap<String, Vec<_>> = HashMap::new();
    for route in table.valid_routes() {
        by_path
            .entry(route.url_template.clone())
            .or_default()
            .push(route);
    }

    for (path, routes) in by_path {
        let mut path_item = Map::new();
        for route in routes {
            let operation_id = unique_operation_id(
                &route.method.as_lower().to_string(),
                &path,
                &route.schema.summary,
                &mut used_operation_ids,
            );
            path_item.insert(
                route.method.as_lower().to_string(),
                operation(route, &operation_id),
            );
        }
        paths.insert(path, Value::Object(path_item));
    }

    json!({
        "openapi": "3.0.0",
        "info": { "title": info.title, "version": info.version },
        "servers": [ { "url": info.server_url } ],
        "paths": Value::Object(paths),
        "components": { "schemas": components_schemas() },
    })
}

fn unique_operation_id(
    method: &str,
    path: &str,
    summary: &str,
    used: &mut HashSet<String>,
) -> String {
    let base = slugify(summary);
    let base = if base.is_empty() {
        format!("{method}{}", slugify(path))
    } else {
        base
    };
    if used.insert(base.clone()) {
        return base;
    }
    let disambiguated = format!("{base}_{method}{}", slugify(path));
    used.insert(disambiguated.clone());
    disambiguated
}

fn slugify(s: &str) -> String {
    let mut out = String::new();
    let mut prev_sep = true;
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            prev_sep = false;
        } else if !prev_sep {
            out.push('_');
            prev_sep = true;
        }
    }
    out.trim_end_matches('_').to_string()
}

fn operation(route: &mcpmesh_core::route::Route, operation_id: &str) -> Value {
    let bundle = &route.schema;
    let placeholders = path_placeholders(&route.url_template);

    let mut parameters = Vec::new();
    for name in &placeholders {
        parameters.push(json!({
            "name": name,
            "in": "path",
            "required": true,
            "schema": { "type": "string" },
        }));
    }
    if let Some(query) = &bundle.query {
        let required: HashSet<String> = query
            .get("required")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        if let Some(props) = query.get("properties").and_then(Value::as_object) {
            for (name, schema) in props {
                let mut schema = schema.clone();
                mcpmesh_core::schema::ensure_array_items(&mut schema);
                parameters.push(json!({
                    "name": name,
                    "in": "query",
                    "required": required.contains(name),
                    "schema": schema,
                }));
            }
        }
    }

    let mut op = Map::new();
    op.insert("operationId".to_string(), json!(operation_id));
    op.insert("summary".to_string(), json!(bundle.summary));
    op.insert("description".to_string(), json!(bundle.description));
    op.insert("tags".to_string(), json!(bundle.tags));
    op.insert("parameters".to_string(), json!(parameters));

    if route.method.allows_body() {
        if let Some(body) = &bundle.body {
            let mut schema = body.clone();
            mcpmesh_core::schema::ensure_array_items(&mut schema);
            let required = schema
                .get("required")
                .and_then(Value::as_array)
                .map(|a| !a.is_empty())
                .unwrap_or(false);
            op.insert(
                "requestBody".to_string(),
                json!({
                    "required": required,
                    "content": { "application/json": { "schema": schema } },
                }),
            );
        }
    }

    let mut responses = Map::new();
    if let Some(response) = &bundle.response {
        let mut schema = response.clone();
        mcpmesh_core::schema::ensure_array_items(&mut schema);
        responses.insert(
            "200".to_string(),
            json!({ "description": "Success", "content": { "application/json": { "schema": schema } } }),
        );
    }
    for (status, schema) in &bundle.errors {
        let mut schema = schema.clone();
        mcpmesh_core::schema::ensure_array_items(&mut schema);
        responses.insert(
            status.to_string(),
            json!({ "description": "Error", "content": { "application/json": { "schema": schema } } }),
        );
    }
    responses.insert(
        "default".to_string(),
        json!({
            "description": "Unexpected error",
            "content": { "application/json": { "schema": { "$ref": "#/components/schemas/Error" } } },
        }),
    );
    op.insert("responses".to_string(), Value::Object(responses));

    Value::Object(op)
}

fn components_schemas() -> Value {
    json!({
        "Error": {
            "type": "object",
            "properties": {
                "error": { "type": "boolean" },
                "message": { "type": "string" },
            },
            "required": ["error", "message"],
        },
        "Success": {
            "type": "object",
            "properties": {
                "success": { "type": "boolean" },
                "data": {},
            },
            "required": ["success"],
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpmesh_core::route::{FnHandler, HandlerRef, HttpMethod, ResponseCtx, Route};
    use mcpmesh_core::schema::SchemaBundle;
    use mcpmesh_discovery::registry::RouteTableBuilder;
    use std::sync::Arc;

    fn route(method: HttpMethod, template: &str) -> Route {
        Route {
            method,
            url_template: template.to_string(),
            handler: HandlerRef::FuncHandler(Arc::new(FnHandler(|_| async move {
                ResponseCtx::ok(Value::Null)
            }))),
            file_path: format!("api{template}/{method:?}.so").into(),
            schema: SchemaBundle::default(),
        }
    }

    #[test]
    fn paths_use_brace_form_never_colon_form() {
        let mut builder = RouteTableBuilder::new();
        builder.upsert(route(HttpMethod::Get, "/users/{id}"));
        let table = builder.build();
        let doc = synthesize(&table, &ApiInfo::default());
        let paths = doc["paths"].as_object().unwrap();
        assert!(paths.contains_key("/users/{id}"));
        assert!(!paths.keys().any(|k| k.contains(':')));
    }

    #[test]
    fn path_placeholder_is_required_parameter() {
        let mut builder = RouteTableBuilder::new();
        let mut r = route(HttpMethod::Get, "/users/{id}");
        r.schema.reconcile_path_params(&["id".to_string()]);
        builder.upsert(r);
        let table = builder.build();
        let doc = synthesize(&table, &ApiInfo::default());
        let params = doc["paths"]["/users/{id}"]["get"]["parameters"]
            .as_array()
            .unwrap();
        let id_param = params.iter().find(|p| p["name"] == "id").unwrap();
        assert_eq!(id_param["required"], true);
        assert_eq!(id_param["in"], "path");
    }

    #[test]
    fn always_has_error_and_success_components() {
        let table = RouteTableBuilder::new().build();
        let doc = synthesize(&table, &ApiInfo::default());
        assert!(doc["components"]["schemas"]["Error"].is_object());
        assert!(doc["components"]["schemas"]["Success"].is_object());
    }

    #[test]
    fn operation_ids_are_unique_on_collision() {
        let mut builder = RouteTableBuilder::new();
        let mut a = route(HttpMethod::Get, "/a");
        a.schema.summary = "Fetch thing".to_string();
        let mut b = route(HttpMethod::Post, "/b");
        b.schema.summary = "Fetch thing".to_string();
        builder.upsert(a);
        builder.upsert(b);
        let table = builder.build();
        let doc = synthesize(&table, &ApiInfo::default());
        let id_a = doc["paths"]["/a"]["get"]["operationId"].as_str().unwrap();
        let id_b = doc["paths"]["/b"]["post"]["operationId"].as_str().unwrap();
        assert_ne!(id_a, id_b);
    }
}
