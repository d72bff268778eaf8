use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid alias {0:?}: must match ^@[a-z][a-z0-9-]*$")]
    InvalidAlias(String),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not determine a platform config directory")]
    NoConfigDir,
}

pub type Result<T> = std::result::Result<T, ConfigError>;
