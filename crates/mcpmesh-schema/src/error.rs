use thiserror::Error;

pub type Result<T> = std::result::Result<T, SchemaError>;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid route-mapping pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}
