//! Line-delimited JSON-over-UDS control protocol (spec.md §4.9), shared by
//! MountCore's and SyncDaemon's control sockets. Every request is
//! `{cmd, id, args}`; every response is `{id, result?|error?}`.

mod error;
mod protocol;
mod server;

pub use error::{Result, RpcError};
pub use protocol::{Request, Response};
pub use server::{RpcClient, RpcHandler, RpcServer};
