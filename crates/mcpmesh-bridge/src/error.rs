use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid bridge manifest: {0}")]
    Manifest(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),

    #[error("bridge command name is invalid: {0}")]
    InvalidCommand(String),

    #[error("bridge command not found in PATH: {0}")]
    CommandNotFound(String),

    #[error("circular bridge reference detected: {chain}")]
    Circular { chain: String },
}

/// Failures surfaced by the C8 framed JSON-RPC client.
#[derive(Debug, Error, Clone)]
pub enum RpcError {
    #[error("rpc request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("bridge transport closed: exit_code={exit_code:?} signal={signal:?}")]
    TransportClosed {
        exit_code: Option<i32>,
        signal: Option<i32>,
    },

    #[error("remote returned an error: {code} {message}")]
    Remote { code: i64, message: String },

    #[error("malformed rpc response: {0}")]
    Malformed(String),
}
