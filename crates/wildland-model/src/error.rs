use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("schema error: {0}")]
    SchemaError(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
