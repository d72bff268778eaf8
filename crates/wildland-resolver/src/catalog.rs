use wildland_crypto::Fingerprint;
use wildland_model::{Bridge, ContainerView};

use crate::error::Result;
use crate::glob::segment_matches;

/// One manifest reachable from an owner's `manifests-catalog`: either a
/// container to mount or a bridge pointing at another user (spec.md §4.4).
#[derive(Debug, Clone)]
pub enum CatalogEntry {
    Container(ContainerView),
    Bridge(Bridge),
}

impl CatalogEntry {
    /// Whether this entry has a path matching `segment` (a container's
    /// `mount_paths()` or a bridge's declared `paths[]`).
    pub fn matches(&self, segment: &str) -> bool {
        match self {
            CatalogEntry::Container(c) => c.mount_paths().iter().any(|p| segment_matches(segment, p)),
            CatalogEntry::Bridge(b) => b.paths.iter().any(|p| segment_matches(segment, p)),
        }
    }
}

/// Supplies the resolver with catalog contents and cross-user fetches. A
/// concrete implementation walks local manifest directories and/or the
/// network; the resolver itself stays agnostic of where manifests live.
pub trait CatalogSource {
    /// Every container and bridge manifest published in `owner`'s
    /// `manifests-catalog`, already signature-verified against `owner`'s
    /// known pubkeys. Called at most once per owner per `resolve` call (the
    /// resolver caches the result for the duration of the call).
    fn catalog(&mut self, owner: &Fingerprint) -> Result<Vec<CatalogEntry>>;

    /// Fetches and verifies the user manifest a bridge points at (by URL or
    /// by `Link`), in the context of `current_owner` (the bridge's signer).
    fn fetch_user(
        &mut self,
        target: &wildland_model::BridgeTarget,
        current_owner: &Fingerprint,
    ) -> Result<wildland_model::UserView>;
}
