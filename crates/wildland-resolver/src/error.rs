use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no manifest matches segment {0:?}")]
    NotFound(String),

    #[error("{0} is signed by a key not vouched for by the current chain")]
    Untrusted(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("bridge cycle detected after {0} hops")]
    Cycle(usize),

    #[error("network error fetching {0}")]
    NetworkError(String),

    #[error("malformed wildland url: {0}")]
    BadUrl(String),
}

impl From<wildland_model::ModelError> for ResolveError {
    fn from(e: wildland_model::ModelError) -> Self {
        ResolveError::Decode(e.to_string())
    }
}

impl From<wildland_crypto::CryptoError> for ResolveError {
    fn from(e: wildland_crypto::CryptoError) -> Self {
        ResolveError::Decode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ResolveError>;
