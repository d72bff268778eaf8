//! Strongly-typed views over validated Wildland manifests: `User`,
//! `Container`, `Storage`, `Bridge`, `Link`, and access lists, plus the
//! invariants from spec.md §3 enforced at construction.

mod access;
mod error;
mod invariants;
mod objects;
mod views;

pub use access::{is_public_access, AccessEntry};
pub use error::{ModelError, Result};
pub use invariants::{
    validate_access_for_encryption, validate_bridge_pubkey, validate_container_uuid_path,
    validate_owner_pubkey, validate_single_primary, validate_storage_container_path,
};
pub use objects::{Backends, Bridge, BridgeTarget, Container, ContainerStorageRef, Link, Storage, User};
pub use views::{ContainerView, MemberLookup, UserView};
