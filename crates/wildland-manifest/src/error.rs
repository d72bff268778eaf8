use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("schema error: {0}")]
    SchemaError(String),

    #[error("signature error: {0}")]
    SignatureError(String),

    #[error("decrypt error: {0}")]
    DecryptError(#[from] wildland_crypto::CryptoError),

    #[error("manifest is encrypted and no locally available secret key unwraps it")]
    Unencryptable,

    #[error("unsupported manifest version {0:?} (frozen at \"1\")")]
    VersionMismatch(String),

    #[error("malformed envelope: {0}")]
    Envelope(String),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, ManifestError>;
