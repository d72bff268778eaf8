use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Installs a compact stdout `tracing` layer honoring `RUST_LOG`, matching
/// the teacher's `daemon/process` bootstrap.
pub fn init_logging() {
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(std::io::stdout());
    std::mem::forget(guard);

    let env_filter = EnvFilter::builder().with_default_directive(tracing::Level::INFO.into()).from_env_lossy();
    let layer = tracing_subscriber::fmt::layer().compact().with_writer(non_blocking_writer).with_filter(env_filter);

    let _ = tracing_subscriber::registry().with(layer).try_init();
}

/// Spawns a task that listens for SIGINT/SIGTERM and signals every holder of
/// the returned receiver over a `watch` channel (spec.md §5 graceful
/// shutdown), the same mechanism the teacher uses for its own long-lived
/// processes.
pub fn graceful_shutdown() -> (tokio::task::JoinHandle<()>, watch::Receiver<()>) {
    let (tx, rx) = watch::channel(());

    let handle = tokio::spawn(async move {
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");

        tokio::select! {
            _ = sigint.recv() => tracing::info!("received SIGINT, shutting down"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        }

        let _ = tx.send(());
    });

    (handle, rx)
}
