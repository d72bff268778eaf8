//! MountCore (spec.md §4.6): a FUSE filesystem multiplexing one or more
//! `StorageBackend`s per container, plus the UDS control socket that drives
//! it (`fs-commands.json`, spec.md §6).

mod control;
mod core;
mod error;
mod fs;
mod inode;
mod manifest;
pub mod process;
mod subcontainer;
mod table;

pub use control::MountControl;
pub use core::{check_writable, MountCore, MountItem};
pub use error::{MountError, Result};
pub use fs::WildlandFs;
pub use inode::InodeTable;
pub use manifest::{PseudoManifest, PSEUDO_MANIFEST_NAME};
pub use subcontainer::{SubcontainerAction, SubcontainerCoalescer};
pub use table::{MountTable, MountedStorage};
