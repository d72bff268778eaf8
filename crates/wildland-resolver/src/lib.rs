//! Walks Wildland URLs (`wildland:<owner>:<segment>:<segment>:…`) through
//! bridges and manifest catalogs into concrete manifests (spec.md §4.4).
//!
//! The resolver itself is storage-agnostic: callers supply a
//! [`CatalogSource`] that knows how to list an owner's `manifests-catalog`
//! contents and fetch cross-user manifests. This keeps the walk/verify/
//! cycle-detect algorithm testable with an in-memory fake, independent of
//! `wildland-config`'s on-disk catalog or any network transport.

mod catalog;
mod error;
mod glob;
mod resolve;
mod url;

pub use catalog::{CatalogEntry, CatalogSource};
pub use error::{ResolveError, Result};
pub use glob::segment_matches;
pub use resolve::{ResolvedManifest, Resolver, DEFAULT_MAX_DEPTH};
pub use url::WildlandUrl;
