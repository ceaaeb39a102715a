//! MCP JSON-RPC surface over stdio (§6: "Framing for stdio: one JSON
//! object per newline-terminated line"), used when `STDIO_MODE` is set.

use std::path::PathBuf;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use mcpmesh_mcp::Multiplexer;

/// Reserved JSON-RPC error codes this surface emits (§7: "method not
/// found / equivalent").
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const INTERNAL_ERROR: i64 = -32603;

/// Run the stdio JSON-RPC loop until stdin closes. Never returns an
/// `Err` for a malformed or failing individual request — those become
/// JSON-RPC error replies; only stdio I/O failure ends the loop.
///
/// Concurrently selects on registry publishes so a `tools/list_changed`
/// notification (no `id`, per JSON-RPC 2.0) can interleave with request
/// handling (§4.4 step 4, §8 S2).
pub async fn serve(mux: &Multiplexer) -> std::io::Result<()> {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();
    let mut changes = mux.subscribe_tool_changes();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let reply = match serde_json::from_str::<Value>(&line) {
                    Ok(request) => handle_request(mux, request).await,
                    Err(e) => json!({
                        "jsonrpc": "2.0",
                        "id": Value::Null,
                        "error": { "code": INVALID_PARAMS, "message": format!("invalid JSON: {e}") },
                    }),
                };
                write_line(&mut stdout, &reply).await?;
            }
            result = changes.recv() => {
                if result.is_err() {
                    continue;
                }
                let notification = json!({
                    "jsonrpc": "2.0",
                    "method": "notifications/tools/list_changed",
                });
                write_line(&mut stdout, &notification).await?;
            }
        }
    }
    Ok(())
}

async fn write_line(stdout: &mut tokio::io::Stdout, value: &Value) -> std::io::Result<()> {
    let mut out = serde_json::to_vec(value).unwrap_or_default();
    out.push(b'\n');
    stdout.write_all(&out).await?;
    stdout.flush().await
}

async fn handle_request(mux: &Multiplexer, request: Value) -> Value {
    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let method = request.get("method").and_then(Value::as_str).unwrap_or("");
    let params = request.get("params").cloned().unwrap_or(Value::Null);

    match dispatch(mux, method, params).await {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err((code, message)) => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": code, "message": message },
        }),
    }
}

async fn dispatch(mux: &Multiplexer, method: &str, params: Value) -> Result<Value, (i64, String)> {
    match method {
        "initialize" => Ok(mux.initialize()),
        "tools/list" => {
            let result = mux.list_tools().await;
            Ok(json!({ "tools": result.tools, "servers": result.bridge_status.servers }))
        }
        "tools/call" => {
            let name = params
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| (INVALID_PARAMS, "missing 'name'".to_string()))?;
            let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
            mux.call_tool(name, arguments)
                .await
                .map_err(|e| (INTERNAL_ERROR, e.to_string()))
        }
        "prompts/list" => mux
            .list_prompts()
            .map(|prompts| json!({ "prompts": prompts }))
            .map_err(|e| (INTERNAL_ERROR, e.to_string())),
        "prompts/get" => {
            let relative = relative_path_param(&params, "name")?;
            mux.get_prompt(&relative)
                .map_err(|e| (INTERNAL_ERROR, e.to_string()))?
                .ok_or_else(|| (METHOD_NOT_FOUND, format!("no prompt at {}", relative.display())))
        }
        "resources/list" => mux
            .list_resources()
            .map(|resources| json!({ "resources": resources }))
            .map_err(|e| (INTERNAL_ERROR, e.to_string())),
        "resources/read" => {
            let relative = uri_to_relative_path(&params)?;
            mux.read_resource(&relative)
                .map_err(|e| (INTERNAL_ERROR, e.to_string()))?
                .ok_or_else(|| (METHOD_NOT_FOUND, format!("no resource at {}", relative.display())))
        }
        other => Err((METHOD_NOT_FOUND, format!("unknown method {other:?}"))),
    }
}

fn relative_path_param(params: &Value, key: &str) -> Result<PathBuf, (i64, String)> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(PathBuf::from)
        .ok_or_else(|| (INVALID_PARAMS, format!("missing '{key}'")))
}

fn uri_to_relative_path(params: &Value) -> Result<PathBuf, (i64, String)> {
    let uri = params
        .get("uri")
        .and_then(Value::as_str)
        .ok_or_else(|| (INVALID_PARAMS, "missing 'uri'".to_string()))?;
    Ok(PathBuf::from(
        uri.strip_prefix("resource://").unwrap_or(uri),
    ))
}
