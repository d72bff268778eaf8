use std::collections::HashMap;

use wildland_storage::{WatchEvent, WatchEventKind};

/// A subcontainer-triggered mount/unmount action, coalesced per-path (spec.md
/// §4.6 "Subcontainer remount ... Updates are coalesced per-path and
/// serialized; intermediate states are never exposed").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubcontainerAction {
    Mount { path: String },
    Unmount { path: String },
}

/// Reduces a burst of raw watcher events on a subcontainer-manifest pattern
/// into one action per affected path, keeping only the latest (a
/// create-then-delete pair in the same batch collapses to `Unmount`, a
/// delete-then-create collapses to `Mount`). Callers drain `coalesce()` and
/// apply actions serially, so a subcontainer path never observes a
/// half-applied intermediate mount.
#[derive(Default)]
pub struct SubcontainerCoalescer {
    pending: HashMap<String, SubcontainerAction>,
}

impl SubcontainerCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, event: WatchEvent) {
        let action = match event.kind {
            WatchEventKind::Create | WatchEventKind::Modify => SubcontainerAction::Mount { path: event.path.clone() },
            WatchEventKind::Delete => SubcontainerAction::Unmount { path: event.path.clone() },
        };
        self.pending.insert(event.path, action);
    }

    /// Drains every coalesced action accumulated so far, in path order (for
    /// deterministic test assertions; the ordering has no semantic meaning
    /// to callers beyond "one action per path").
    pub fn drain(&mut self) -> Vec<SubcontainerAction> {
        let mut paths: Vec<String> = self.pending.keys().cloned().collect();
        paths.sort();
        paths
            .into_iter()
            .map(|path| self.pending.remove(&path).expect("path came from pending keys"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: WatchEventKind, path: &str) -> WatchEvent {
        WatchEvent { kind, path: path.to_string() }
    }

    #[test]
    fn test_create_then_delete_collapses_to_unmount() {
        let mut c = SubcontainerCoalescer::new();
        c.observe(event(WatchEventKind::Create, "/sub/a.container.yaml"));
        c.observe(event(WatchEventKind::Delete, "/sub/a.container.yaml"));
        assert_eq!(c.drain(), vec![SubcontainerAction::Unmount { path: "/sub/a.container.yaml".into() }]);
    }

    #[test]
    fn test_distinct_paths_each_get_one_action() {
        let mut c = SubcontainerCoalescer::new();
        c.observe(event(WatchEventKind::Create, "/sub/a.container.yaml"));
        c.observe(event(WatchEventKind::Create, "/sub/b.container.yaml"));
        assert_eq!(
            c.drain(),
            vec![
                SubcontainerAction::Mount { path: "/sub/a.container.yaml".into() },
                SubcontainerAction::Mount { path: "/sub/b.container.yaml".into() },
            ]
        );
    }

    #[test]
    fn test_drain_empties_pending() {
        let mut c = SubcontainerCoalescer::new();
        c.observe(event(WatchEventKind::Create, "/sub/a.container.yaml"));
        assert_eq!(c.drain().len(), 1);
        assert!(c.drain().is_empty());
    }
}
