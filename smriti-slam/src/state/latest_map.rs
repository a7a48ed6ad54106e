use std::sync::Arc;

use parking_lot::RwLock;

use crate::engine::map::{MapSink, Snapshot};

/// Shared handle to the newest published map.
///
/// Publishing swaps the pointer; readers keep whatever snapshot they
/// already hold.
#[derive(Debug, Default)]
pub struct LatestMap {
    current: RwLock<Option<Arc<Snapshot>>>,
}

impl LatestMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// The newest snapshot, if any has been published.
    pub fn get(&self) -> Option<Arc<Snapshot>> {
        self.current.read().clone()
    }

    /// Revision of the newest snapshot.
    pub fn revision(&self) -> Option<u64> {
        self.current.read().as_ref().map(|s| s.revision)
    }

    /// Forget the published map.
    pub fn clear(&self) {
        *self.current.write() = None;
    }
}

impl MapSink for LatestMap {
    fn publish(&self, snapshot: Arc<Snapshot>) {
        *self.current.write() = Some(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Point2D;

    fn snapshot(revision: u64) -> Arc<Snapshot> {
        Arc::new(Snapshot {
            revision,
            vertex_count: 1,
            resolution: 0.05,
            width: 1,
            height: 1,
            origin: Point2D::new(0.0, 0.0),
            cells: vec![-1],
        })
    }

    #[test]
    fn test_publish_replaces_without_touching_readers() {
        let latest = LatestMap::new();
        assert!(latest.get().is_none());

        latest.publish(snapshot(1));
        let held = latest.get().unwrap();
        latest.publish(snapshot(2));

        assert_eq!(held.revision, 1);
        assert_eq!(latest.revision(), Some(2));

        latest.clear();
        assert!(latest.get().is_none());
    }
}
