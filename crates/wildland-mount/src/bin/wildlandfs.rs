use std::sync::Arc;

use clap::Parser;
use wildland_config::Config;
use wildland_mount::{process, MountControl, MountCore};
use wildland_rpc::RpcServer;
use wildland_storage::{LocalFilesystemBackend, StorageBackend, StorageRegistry};

#[derive(Parser, Debug)]
#[command(name = "wildlandfs", about = "Wildland MountCore: FUSE filesystem and control socket")]
struct Args {
    /// Path to the FUSE mountpoint.
    #[arg(long)]
    mountpoint: std::path::PathBuf,

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

    let core = Arc::new(MountCore::new(default_registry()));
    let (_shutdown_handle, shutdown_rx) = process::graceful_shutdown();

    let rt = tokio::runtime::Handle::current();
    let fs_core = core.clone();
    let mountpoint = args.mountpoint.clone();
    let fuse_rx = shutdown_rx.clone();
    let fuse_thread = std::thread::spawn(move || {
        let fs = wildland_mount::WildlandFs::new(rt, fs_core);
        let options = vec![fuser::MountOption::FSName("wildland".to_string())];
        match fuser::spawn_mount2(fs, &mountpoint, &options) {
            Ok(session) => {
                tracing::info!("FUSE mounted at {:?}", mountpoint);
                let mut rx = fuse_rx;
                let _ = futures::executor::block_on(rx.changed());
                drop(session);
            }
            Err(e) => tracing::error!("failed to mount FUSE filesystem: {e}"),
        }
    });

    let control = Arc::new(MountControl::new(core));
    let server = RpcServer::new(config.fs_socket_path.clone());
    server.serve(control, shutdown_rx).await?;

    let _ = fuse_thread.join();
    Ok(())
}
