use thiserror::Error;

pub type Result<T> = std::result::Result<T, McpError>;

#[derive(Debug, Error)]
pub enum McpError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("request timed out")]
    Timeout,
}

impl McpError {
    /// JSON-RPC error code, following the standard reserved ranges.
    pub fn code(&self) -> i64 {
        match self {
            Self::UnknownMethod(_) => -32601,
            Self::UnknownTool(_) => -32602,
            Self::Timeout => -32000,
            Self::Io(_) | Self::Json(_) => -32603,
        }
    }
}
