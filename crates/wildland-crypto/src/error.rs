use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("signature verification failed")]
    SignatureError,

    #[error("decryption failed: no owned secret key unwraps this payload")]
    DecryptError,

    #[error("key missing: {0}")]
    KeyMissing(String),

    #[error("dummy-mode key cannot cross-verify real key material")]
    Untrusted,

    #[error("malformed key material: {0}")]
    Malformed(String),

    #[error("key store io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
