//! Error types for discovery, loading, and reload.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DiscoveryError>;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("io error walking {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load handler module {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: LoadError,
    },

    #[error("filesystem watcher error: {0}")]
    Watch(#[from] notify::Error),
}

/// Failure reasons for loading one handler file — also the categorical
/// tag surfaced on the registry's loader-error list (§4.2).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("dynamic library dependency missing: {0}")]
    MissingDependency(String),
    #[error("module could not be loaded: {0}")]
    MissingModule(String),
    #[error("handler export shape is invalid (expected object/class/function): {0}")]
    InvalidConstructor(String),
    #[error("handler property access failed: {0}")]
    PropertyError(String),
    #[error("handler file is malformed: {0}")]
    Syntax(String),
    #[error("unknown loader failure: {0}")]
    Unknown(String),
}

impl LoadError {
    /// The categorical `type` tag required on each loader error
    /// entry (§4.2: `missing_dependency`, `missing_module`,
    /// `invalid_constructor`, `property_error`, `syntax`, `unknown`).
    pub fn category(&self) -> &'static str {
        match self {
            Self::MissingDependency(_) => "missing_dependency",
            Self::MissingModule(_) => "missing_module",
            Self::InvalidConstructor(_) => "invalid_constructor",
            Self::PropertyError(_) => "property_error",
            Self::Syntax(_) => "syntax",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// One entry in the registry's append-only loader-error list (§4.2).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LoaderErrorEntry {
    pub file: PathBuf,
    pub category: String,
    pub message: String,
}

impl LoaderErrorEntry {
    pub fn new(file: PathBuf, error: &LoadError) -> Self {
        Self {
            file,
            category: error.category().to_string(),
            message: error.to_string(),
        }
    }
}
