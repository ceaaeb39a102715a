//! Minimal JSON-RPC-over-HTTP client for HTTP bridges (§4.7: "HTTP
//! bridges are considered ready once the initialize response is
//! received").

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::{json, Value};

use crate::error::RpcError;
use crate::rpc::MCP_PROTOCOL_VERSION;

pub struct HttpRpcClient {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl HttpRpcClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            next_id: AtomicU64::new(0),
        }
    }

    pub async fn initialize(
        &self,
        client_name: &str,
        client_version: &str,
        deadline: Duration,
    ) -> Result<Value, RpcError> {
        self.request(
            "initialize",
            json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "clientInfo": { "name": client_name, "version": client_version },
                "capabilities": {},
            }),
            deadline,
        )
        .await
    }

    pub async fn request(
        &self,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });

        let send = self.client.post(&self.url).json(&body).send();
        let response = tokio::time::timeout(deadline, send)
            .await
            .map_err(|_| RpcError::Timeout(deadline))?
            .map_err(|e| RpcError::Malformed(e.to_string()))?;

        let value: Value = response
            .json()
            .await
            .map_err(|e| RpcError::Malformed(e.to_string()))?;

        if let Some(error) = value.get("error") {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(-1);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(RpcError::Remote { code, message });
        }
        Ok(value.get("result").cloned().unwrap_or(Value::Null))
    }
}
