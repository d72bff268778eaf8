use thiserror::Error;

/// Errors a command handler can raise; these map directly onto the
/// `error:"unknown-command"` / `error:"bad-args"` wire vocabulary spec.md
/// §4.9 requires, plus a catch-all for handler-internal failures.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("unknown-command")]
    UnknownCommand,

    #[error("bad-args")]
    BadArgs,

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, RpcError>;
