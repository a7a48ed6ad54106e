//! Map Publisher Thread - periodic map regeneration.
//!
//! Rebuilds the grid from the shared graph every update interval and hands
//! the snapshot to every registered sink. A rebuild is skipped when the
//! graph revision has not changed since the last publication.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::engine::graph::SharedGraph;
use crate::engine::map::{MapRegenerator, MapSink};

/// Sleep granularity while waiting for the next rebuild, so shutdown is
/// noticed promptly.
const TICK: Duration = Duration::from_millis(50);

/// Map publisher thread handle.
pub struct MapPublisherThread {
    handle: JoinHandle<()>,
}

impl MapPublisherThread {
    /// Spawn the map publisher thread.
    pub fn spawn(
        regenerator: MapRegenerator,
        graph: SharedGraph,
        sinks: Vec<Arc<dyn MapSink>>,
        running: Arc<AtomicBool>,
    ) -> std::io::Result<Self> {
        let handle = thread::Builder::new()
            .name("map-publisher".into())
            .spawn(move || run_publisher_loop(regenerator, graph, sinks, running))?;
        Ok(Self { handle })
    }

    /// Wait for the thread to finish.
    pub fn join(self) -> thread::Result<()> {
        self.handle.join()
    }
}

fn run_publisher_loop(
    regenerator: MapRegenerator,
    graph: SharedGraph,
    sinks: Vec<Arc<dyn MapSink>>,
    running: Arc<AtomicBool>,
) {
    let interval = regenerator.config().update_interval();
    log::info!(
        "Map publisher starting ({} sinks, every {} ms)",
        sinks.len(),
        interval.as_millis()
    );

    let mut published: Option<u64> = None;
    let mut next = Instant::now();

    while running.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now < next {
            thread::sleep((next - now).min(TICK));
            continue;
        }
        next = now + interval;

        let revision = graph.read().revision();
        if published == Some(revision) {
            continue;
        }

        let started = Instant::now();
        let Some(snapshot) = regenerator.rebuild(&graph) else {
            continue;
        };
        log::debug!(
            "Map revision {} rebuilt: {}x{} cells from {} vertices in {:?}",
            snapshot.revision,
            snapshot.width,
            snapshot.height,
            snapshot.vertex_count,
            started.elapsed()
        );

        published = Some(snapshot.revision);
        let snapshot = Arc::new(snapshot);
        for sink in &sinks {
            sink.publish(Arc::clone(&snapshot));
        }
    }

    log::info!("Map publisher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::{Mutex, RwLock};

    use crate::core::types::Pose2D;
    use crate::engine::graph::PoseGraph;
    use crate::engine::graph::pose_graph::tests::new_vertex;
    use crate::engine::map::{MapConfig, Snapshot};
    use crate::state::LatestMap;

    #[derive(Default)]
    struct CountingSink {
        revisions: Mutex<Vec<u64>>,
    }

    impl MapSink for CountingSink {
        fn publish(&self, snapshot: Arc<Snapshot>) {
            self.revisions.lock().push(snapshot.revision);
        }
    }

    #[test]
    fn test_publishes_once_per_revision() {
        let graph: SharedGraph = Arc::new(RwLock::new(PoseGraph::new()));
        let counting = Arc::new(CountingSink::default());
        let latest = Arc::new(LatestMap::new());
        let running = Arc::new(AtomicBool::new(true));
        let regenerator = MapRegenerator::new(MapConfig {
            update_interval_secs: 0.02,
            ..MapConfig::default()
        });

        let sinks: Vec<Arc<dyn MapSink>> = vec![counting.clone(), latest.clone()];
        let thread =
            MapPublisherThread::spawn(regenerator, Arc::clone(&graph), sinks, Arc::clone(&running))
                .unwrap();

        thread::sleep(Duration::from_millis(100));
        assert!(latest.get().is_none(), "empty graph must not publish");

        graph.write().add_vertex(new_vertex(Pose2D::new(1.0, 1.0, 0.0)));
        thread::sleep(Duration::from_millis(200));

        running.store(false, Ordering::Relaxed);
        thread.join().unwrap();

        let revisions = counting.revisions.lock().clone();
        assert_eq!(revisions.len(), 1);
        assert_eq!(latest.revision(), Some(revisions[0]));
    }
}
