/// Capability flags a driver declares about itself (spec.md §4.5). MountCore
/// and SyncDaemon consult these to decide whether to substitute a periodic
/// scan for a native watcher, reject writes, or serialize random writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub read_only: bool,
    pub supports_watcher_native: bool,
    pub supports_random_writes: bool,
}

impl Capabilities {
    pub const fn read_write() -> Self {
        Self {
            read_only: false,
            supports_watcher_native: false,
            supports_random_writes: true,
        }
    }

    pub const fn read_only() -> Self {
        Self {
            read_only: true,
            supports_watcher_native: false,
            supports_random_writes: false,
        }
    }

    pub const fn with_native_watcher(mut self) -> Self {
        self.supports_watcher_native = true;
        self
    }
}
