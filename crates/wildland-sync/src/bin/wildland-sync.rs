use std::sync::Arc;

use clap::Parser;
use wildland_config::Config;
use wildland_rpc::RpcServer;
use wildland_storage::{LocalFilesystemBackend, StorageBackend, StorageRegistry};
use wildland_sync::{process, JobTable, SyncControl};

#[derive(Parser, Debug)]
#[command(name = "wildland-sync", about = "Wildland SyncDaemon: per-job state machines and control socket")]
struct Args {
    /// Path to the wildland config file; defaults to the platform config dir.
    #[arg(long)]
    config: Option<std::path::PathBuf>,
}

fn default_registry() -> StorageRegistry {
    let mut registry = StorageRegistry::new();
    registry.register(
        "local",
        Arc::new(|storage: &wildland_model::Storage| {
            let path = storage
                .params
                .get("path")
                .and_then(|v| v.as_str())
                .ok_or_else(|| wildland_storage::StorageError::BackendIo("local storage missing 'path' param".into()))?
                .to_string();
            Ok(Arc::new(LocalFilesystemBackend::new(path.into())) as Arc<dyn StorageBackend>)
        }),
    );
    registry
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    process::init_logging();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default_platform()?,
    };
    config.ensure_directories()?;

    let table = Arc::new(JobTable::new());
    let (_shutdown_handle, shutdown_rx) = process::graceful_shutdown();

    let control = Arc::new(SyncControl::new(table.clone(), default_registry()));
    let server = RpcServer::new(config.sync_socket_path.clone());
    server.serve(control, shutdown_rx).await?;

    table.stop_all();
    Ok(())
}
