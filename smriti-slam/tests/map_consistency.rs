//! Map regeneration racing graph updates must only ever see whole graph
//! states.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use smriti_slam::engine::graph::SolverSettings;
use smriti_slam::sim::{LidarSimConfig, LidarSimulator, LoopRoute, OdometrySimulator, Room};
use smriti_slam::{
    LifelongConfig, MapConfig, MapRegenerator, Point2D, PoseGraphConfig, PoseGraphManager,
    PosedScan,
};

#[test]
fn test_rebuild_sees_whole_graph_states() {
    let mut manager = PoseGraphManager::new(
        PoseGraphConfig::default(),
        &SolverSettings::default(),
        &LifelongConfig {
            enabled: false,
            ..LifelongConfig::default()
        },
        [LidarSimConfig::default().laser_geometry()],
    )
    .unwrap();
    let graph = manager.graph();
    let done = Arc::new(AtomicBool::new(false));

    let reader = {
        let graph = Arc::clone(&graph);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let regenerator = MapRegenerator::new(MapConfig::default());
            let mut seen = Vec::new();
            loop {
                if let Some(snapshot) = regenerator.rebuild(&graph) {
                    seen.push((snapshot.revision, snapshot.vertex_count));
                }
                if done.load(Ordering::Acquire) && !seen.is_empty() {
                    return seen;
                }
            }
        })
    };

    // Without pruning a scan changes the vertex count only with its first
    // mutation, so every revision up to the one recorded after the scan
    // carries that scan's count.
    let mut room = Room::rectangle(6.0, 4.0);
    room.add_box(Point2D::new(2.6, 1.7), Point2D::new(3.4, 2.3));
    let route = LoopRoute::rectangle(6.0, 4.0, 1.0).unwrap();
    let mut lidar = LidarSimulator::new(LidarSimConfig::default(), 3);
    let mut odom = OdometrySimulator::new(0.01, 0.005, 4);

    let mut records = vec![(graph.read().revision(), 0usize)];
    for i in 1..=60u64 {
        let truth = route.pose_at(i as f32 * 0.4);
        let posed = PosedScan::new(lidar.scan(&room, &truth, i * 500_000), odom.update(&truth));
        manager.process_scan(&posed).unwrap();
        let g = graph.read();
        records.push((g.revision(), g.num_vertices()));
    }
    done.store(true, Ordering::Release);
    let seen = reader.join().unwrap();

    assert!(records.windows(2).all(|w| w[0].0 < w[1].0));
    for (revision, vertex_count) in &seen {
        let expected = records
            .iter()
            .find(|(r, _)| r >= revision)
            .map(|(_, count)| *count);
        assert_eq!(
            expected,
            Some(*vertex_count),
            "snapshot at revision {revision} saw {vertex_count} vertices"
        );
    }
}
