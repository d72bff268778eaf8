use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;

use crate::error::RpcError;
use crate::protocol::{Request, Response};

/// Implemented by MountCore / SyncDaemon to dispatch a decoded `{cmd, args}`
/// request to the right internal operation.
#[async_trait]
pub trait RpcHandler: Send + Sync {
    async fn handle(&self, cmd: &str, args: Value) -> Result<Value, RpcError>;
}

/// A line-delimited JSON-over-UDS control server (spec.md §4.9), grounded
/// in the bare read/write framing loop of a Unix-domain-socket IPC server:
/// stale-socket removal, one task per connection, `BufReader` +
/// `read_line`/`write_all("\n")` framing. No auth handshake — the
/// `{cmd,id,args}`/`{id,result?|error?}` protocol spec.md defines has none
/// of its own.
pub struct RpcServer {
    socket_path: PathBuf,
}

impl RpcServer {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    /// Binds the socket and serves connections until `shutdown` fires.
    pub async fn serve(
        self,
        handler: Arc<dyn RpcHandler>,
        mut shutdown: watch::Receiver<()>,
    ) -> std::io::Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!("control socket listening at {:?}", self.socket_path);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, _addr) = accepted?;
                    let handler = handler.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, handler).await {
                            tracing::warn!("control connection error: {e}");
                        }
                    });
                }
                _ = shutdown.changed() => {
                    tracing::info!("control socket {:?} shutting down", self.socket_path);
                    break;
                }
            }
        }

        let _ = std::fs::remove_file(&self.socket_path);
        Ok(())
    }
}

async fn handle_connection(stream: UnixStream, handler: Arc<dyn RpcHandler>) -> std::io::Result<()> {
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Ok(());
        }

        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(trimmed) {
            Ok(request) => dispatch(&*handler, request).await,
            Err(e) => Response::err("unknown", format!("bad-args: malformed request: {e}")),
        };

        let mut out = serde_json::to_string(&response)?;
        out.push('\n');
        writer.write_all(out.as_bytes()).await?;
        writer.flush().await?;
    }
}

async fn dispatch(handler: &dyn RpcHandler, request: Request) -> Response {
    match handler.handle(&request.cmd, request.args).await {
        Ok(result) => Response::ok(request.id, result),
        Err(RpcError::UnknownCommand) => Response::err(request.id, "unknown-command"),
        Err(RpcError::BadArgs) => Response::err(request.id, "bad-args"),
        Err(RpcError::Internal(msg)) => Response::err(request.id, msg),
    }
}

/// A thin client over the same framing, for tests and for one daemon
/// talking to the other's socket (e.g. MountCore triggering a resync).
pub struct RpcClient {
    reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    writer: tokio::net::unix::OwnedWriteHalf,
}

impl RpcClient {
    pub async fn connect(socket_path: impl AsRef<Path>) -> std::io::Result<Self> {
        let stream = UnixStream::connect(socket_path).await?;
        let (read_half, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer,
        })
    }

    pub async fn call(&mut self, cmd: impl Into<String>, id: impl Into<String>, args: Value) -> std::io::Result<Response> {
        let request = Request {
            cmd: cmd.into(),
            id: id.into(),
            args,
        };
        let mut out = serde_json::to_string(&request)?;
        out.push('\n');
        self.writer.write_all(out.as_bytes()).await?;
        self.writer.flush().await?;

        let mut line = String::new();
        self.reader.read_line(&mut line).await?;
        let response: Response = serde_json::from_str(line.trim_end())?;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoHandler;

    #[async_trait]
    impl RpcHandler for EchoHandler {
        async fn handle(&self, cmd: &str, args: Value) -> Result<Value, RpcError> {
            match cmd {
                "echo" => Ok(args),
                "boom" => Err(RpcError::BadArgs),
                _ => Err(RpcError::UnknownCommand),
            }
        }
    }

    #[tokio::test]
    async fn test_request_response_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("ctl.sock");
        let (shutdown_tx, shutdown_rx) = watch::channel(());

        let server = RpcServer::new(socket_path.clone());
        let handle = tokio::spawn(server.serve(Arc::new(EchoHandler), shutdown_rx));

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let mut client = RpcClient::connect(&socket_path).await.unwrap();

        let response = client.call("echo", "1", json!({"x": 1})).await.unwrap();
        assert_eq!(response.result, Some(json!({"x": 1})));

        let response = client.call("nope", "2", json!({})).await.unwrap();
        assert_eq!(response.error.as_deref(), Some("unknown-command"));

        let response = client.call("boom", "3", json!({})).await.unwrap();
        assert_eq!(response.error.as_deref(), Some("bad-args"));

        let _ = shutdown_tx.send(());
        let _ = handle.await;
    }
}
