//! HTTP surface (§6): the local REST+OpenAPI interface derived straight
//! from the route registry, plus the introspection/bridge/admin
//! endpoints that sit alongside it.

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use mcpmesh_core::route::{HttpMethod, RequestCtx};
use mcpmesh_discovery::match_route;
use mcpmesh_schema::{synthesize_openapi, synthesize_tools, ApiInfo};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api-info", get(api_info))
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(docs))
        .route("/mcp/tools", get(mcp_tools))
        .route("/mcp/execute/{tool_name}", post(mcp_execute))
        .route("/bridge/list-tools", get(bridge_list_tools))
        .route("/bridge/call-tool", post(bridge_call_tool))
        .route("/admin/retry-initialization", post(retry_initialization))
        .fallback(dynamic_route)
        .with_state(state)
}

/// `GET /health` (§6, §7: "`/health` degrades, offending route absent").
async fn health(State(state): State<AppState>) -> Json<Value> {
    let table = state.registry.snapshot();
    let total_loaded = table.len();
    let failed = table.errors().len();
    let healthy_routes = table.valid_routes().count();

    let status = if failed == 0 {
        "healthy"
    } else if healthy_routes == 0 && total_loaded == 0 {
        "unhealthy"
    } else {
        "partial"
    };

    let routes: Vec<Value> = table
        .iter()
        .map(|entry| {
            json!({
                "method": entry.route.method.as_str(),
                "urlTemplate": entry.route.url_template,
                "status": if entry.valid { "healthy" } else { "failed" },
            })
        })
        .collect();

    let errors: Vec<Value> = table
        .errors()
        .iter()
        .map(|e| {
            json!({
                "file": e.file.display().to_string(),
                "category": e.category,
                "message": e.message,
            })
        })
        .collect();

    Json(json!({
        "status": status,
        "uptimeSeconds": state.started_at.elapsed().as_secs(),
        "routes": routes,
        "errors": errors,
    }))
}

/// `GET /api-info` → the route table (§6).
async fn api_info(State(state): State<AppState>) -> Json<Value> {
    let table = state.registry.snapshot();
    let routes: Vec<Value> = table
        .iter()
        .map(|entry| {
            json!({
                "method": entry.route.method.as_str(),
                "urlTemplate": entry.route.url_template,
                "valid": entry.valid,
                "summary": entry.route.schema.summary,
                "description": entry.route.schema.description,
                "tags": entry.route.schema.tags,
            })
        })
        .collect();
    Json(json!({ "routes": routes }))
}

/// `GET /openapi.json` (§4.5, §7: synthesis failure is a 500 isolated to
/// this endpoint).
async fn openapi_json(State(state): State<AppState>) -> Response {
    let table = state.registry.snapshot();
    let info = ApiInfo {
        server_url: format!("http://{}:{}", state.config.host, state.config.port),
        ..ApiInfo::default()
    };
    Json(synthesize_openapi(&table, &info)).into_response()
}

/// `GET /docs` — an HTML shell referencing `/openapi.json`; out of core
/// scope beyond this stub (§6).
async fn docs() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head><title>mcpmesh API docs</title></head>
<body>
<div id="docs"></div>
<script>window.openapiUrl = "/openapi.json";</script>
</body>
</html>"#,
    )
}

/// `GET /mcp/tools` — the same projection as the MCP surface's local
/// tool set (§4.6, §6).
async fn mcp_tools(State(state): State<AppState>) -> Json<Value> {
    let table = state.registry.snapshot();
    let tools = synthesize_tools(&table, None);
    Json(json!({ "tools": tools }))
}

#[derive(Debug, Deserialize, Default)]
struct McpExecuteBody {
    #[serde(default)]
    body: Option<Value>,
    #[serde(default)]
    query: Map<String, Value>,
    #[serde(default)]
    headers: std::collections::HashMap<String, String>,
    #[serde(default)]
    path: Map<String, Value>,
}

/// `POST /mcp/execute/{toolName}` (§6): synthesize a local invocation
/// from the tool's originating route and report `{success, statusCode,
/// data}`.
async fn mcp_execute(
    State(state): State<AppState>,
    AxumPath(tool_name): AxumPath<String>,
    Json(payload): Json<McpExecuteBody>,
) -> Json<Value> {
    let table = state.registry.snapshot();
    let tools = mcpmesh_schema::synthesize_tools_indexed(&table, None);

    let Some((_, route)) = tools.into_iter().find(|(t, _)| t.name == tool_name) else {
        return Json(json!({
            "success": false,
            "statusCode": 404,
            "data": { "error": true, "message": format!("unknown tool {tool_name:?}") },
        }));
    };

    let ctx = RequestCtx {
        path: payload.path.into_iter().collect(),
        query: payload.query.into_iter().collect(),
        headers: payload.headers,
        body: payload.body,
    };
    let response = route.handler.invoke(ctx).await;
    Json(json!({
        "success": response.status < 400,
        "statusCode": response.status,
        "data": response.body,
    }))
}

/// `GET /bridge/list-tools` — fan-out across every ready bridge (§6).
async fn bridge_list_tools(State(state): State<AppState>) -> Json<Value> {
    let result = state.mux.list_tools().await;
    Json(json!({
        "tools": result.tools,
        "bridgeStatus": result.bridge_status,
    }))
}

#[derive(Debug, Deserialize)]
struct BridgeCallToolBody {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// `POST /bridge/call-tool` — targeted call through the same dispatch
/// path the MCP surface uses (§6, §4.10).
async fn bridge_call_tool(
    State(state): State<AppState>,
    Json(payload): Json<BridgeCallToolBody>,
) -> Response {
    match state.mux.call_tool(&payload.name, payload.arguments).await {
        Ok(value) => Json(value).into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, Json(json!({ "error": true, "message": e.to_string() })))
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct RetryInitBody {
    api: String,
}

/// `POST /admin/retry-initialization` (§6): re-run discovery for exactly
/// the named handler's source file, if it's still present in the table.
async fn retry_initialization(
    State(state): State<AppState>,
    Json(payload): Json<RetryInitBody>,
) -> Json<Value> {
    let table = state.registry.snapshot();
    let target = table
        .iter()
        .find(|entry| entry.route.url_template == payload.api)
        .map(|entry| entry.route.file_path.clone());

    let Some(file) = target else {
        return Json(json!({ "success": false, "message": format!("no handler registered for {:?}", payload.api) }));
    };

    (state.reload)(vec![file.clone()]);

    Json(json!({
        "success": true,
        "message": format!("retried {}", file.display()),
    }))
}

/// Dynamic user-defined routes (§6): matched at request time against the
/// live registry snapshot, so hot-reloaded routes never require
/// rebuilding this router.
async fn dynamic_route(
    State(state): State<AppState>,
    method: axum::http::Method,
    uri: axum::http::Uri,
    headers: HeaderMap,
    Query(query): Query<std::collections::HashMap<String, String>>,
    body: axum::body::Bytes,
) -> Response {
    let Some(method) = method_from_axum(&method) else {
        return (StatusCode::METHOD_NOT_ALLOWED, "method not supported").into_response();
    };

    let table = state.registry.snapshot();
    let Some((route, path_params)) = match_route(&table, method, uri.path()) else {
        return (StatusCode::NOT_FOUND, "no matching route").into_response();
    };

    let parsed_body: Option<Value> = if body.is_empty() {
        None
    } else {
        serde_json::from_slice(&body).ok()
    };

    let header_map = headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
        .collect();

    let ctx = RequestCtx {
        path: path_params
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect(),
        query: query
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect(),
        headers: header_map,
        body: parsed_body,
    };

    let response = route.handler.invoke(ctx).await;
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::OK);
    (status, Json(response.body)).into_response()
}

fn method_from_axum(method: &axum::http::Method) -> Option<HttpMethod> {
    HttpMethod::from_token(method.as_str())
}
