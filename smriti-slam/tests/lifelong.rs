//! Lifelong operation: repeated laps around a room must keep the graph
//! bounded without breaking its invariants.

use std::collections::BTreeSet;

use smriti_slam::engine::graph::{
    Constraint, Information2D, NewVertex, SearchStrategy, SolverSettings, SpatialIndex,
};
use smriti_slam::sim::{LidarSimConfig, LidarSimulator, LoopRoute, OdometrySimulator, Room};
use smriti_slam::{
    BoundingBox2D, EdgeKind, LifelongConfig, LifelongPruner, Point2D, Pose2D, PoseGraph,
    PoseGraphConfig, PoseGraphManager, PosedScan, VertexId,
};

struct Drive {
    room: Room,
    route: LoopRoute,
    lidar: LidarSimulator,
    odom: OdometrySimulator,
    travelled: f32,
    time_us: u64,
}

impl Drive {
    fn new(seed: u64) -> Self {
        let mut room = Room::rectangle(6.0, 4.0);
        room.add_box(Point2D::new(2.6, 1.7), Point2D::new(3.4, 2.3));
        Self {
            room,
            route: LoopRoute::rectangle(6.0, 4.0, 1.0).unwrap(),
            lidar: LidarSimulator::new(LidarSimConfig::default(), seed),
            odom: OdometrySimulator::new(0.01, 0.005, seed + 1),
            travelled: 0.0,
            time_us: 0,
        }
    }

    /// Advance `step` meters along the route and capture a scan.
    fn next(&mut self, step: f32) -> PosedScan {
        self.travelled += step;
        self.time_us += 1_000_000;
        let truth = self.route.pose_at(self.travelled);
        let odom = self.odom.update(&truth);
        PosedScan::new(self.lidar.scan(&self.room, &truth, self.time_us), odom)
    }
}

fn manager(use_tree: bool) -> PoseGraphManager {
    PoseGraphManager::new(
        PoseGraphConfig::default(),
        &SolverSettings::default(),
        &LifelongConfig {
            use_tree,
            ..LifelongConfig::default()
        },
        [LidarSimConfig::default().laser_geometry()],
    )
    .unwrap()
}

fn run_laps(use_tree: bool, laps: usize) {
    let mut drive = Drive::new(21);
    let mut m = manager(use_tree);
    let step = 0.5;
    let scans = (drive.route.length() / step) as usize * laps;

    let mut ids = Vec::new();
    let mut evicted = BTreeSet::new();
    for _ in 0..scans {
        let outcome = m.process_scan(&drive.next(step)).unwrap();
        ids.push(outcome.vertex);
        if let Some(report) = outcome.prune {
            evicted.extend(report.evicted);
        }
    }

    // Ids strictly increase and are never handed out twice.
    assert!(ids.windows(2).all(|w| w[0] < w[1]));

    let stats = m.stats();
    assert_eq!(stats.scans_added as usize, scans);
    assert_eq!(stats.vertices as u64 + stats.evictions, stats.scans_added);
    assert_eq!(stats.evictions as usize, evicted.len());
    assert!(
        stats.vertices < scans / laps,
        "{} vertices after {} laps of {} scans",
        stats.vertices,
        laps,
        scans / laps
    );

    let graph = m.graph();
    let graph = graph.read();
    for edge in graph.edges() {
        assert!(graph.contains(edge.from) && graph.contains(edge.to));
        assert_ne!(edge.from, edge.to);
    }

    // No query can return an evicted vertex.
    let mut index = SpatialIndex::new(SearchStrategy::Tree);
    index.rebuild(&graph);
    for v in graph.vertices() {
        let found = index.query(&graph, v.id, v.pose.position(), 100.0);
        assert!(found.iter().all(|id| !evicted.contains(id)));
        assert!(!evicted.contains(&v.id));
    }
}

#[test]
fn test_repeated_laps_stay_bounded_with_link_traversal() {
    run_laps(false, 4);
}

#[test]
fn test_repeated_laps_stay_bounded_with_tree() {
    run_laps(true, 4);
}

fn vertex(x: f32, half: f32) -> NewVertex {
    let scan = smriti_slam::LaserScan::new("laser", 0, 0.0, 0.1, 0.1, 8.0, vec![1.0; 4]);
    let pose = Pose2D::new(x, 0.0, 0.0);
    NewVertex {
        pose,
        odom_pose: pose,
        sensor_offset: Pose2D::identity(),
        cloud: std::sync::Arc::new(scan.to_point_cloud()),
        scan: std::sync::Arc::new(scan),
        bounding_box: BoundingBox2D::new(
            Point2D::new(x - half, -half),
            Point2D::new(x + half, half),
        ),
    }
}

#[test]
fn test_coinciding_footprints_evict_newer_vertex() {
    for strategy in [SearchStrategy::Tree, SearchStrategy::LinkTraversal { max_hops: None }] {
        let mut graph = PoseGraph::new();
        let old = graph.add_vertex(vertex(0.0, 1.0));
        let new = graph.add_vertex(vertex(0.0, 1.0));
        graph.add_edge(
            old,
            new,
            Constraint::new(EdgeKind::Odometry, Pose2D::identity(), Information2D::default()),
        );
        let mut index = SpatialIndex::new(strategy);
        index.rebuild(&graph);

        let report = LifelongPruner::new(LifelongConfig::default())
            .evaluate(&mut graph, &index, new)
            .unwrap();

        assert_eq!(report.evicted, vec![new]);
        assert!(graph.contains(old));
        assert!(!graph.contains(new));
        assert_eq!(graph.num_edges(), 0);
        assert_eq!(graph.next_vertex_id(), 2 as VertexId);
    }
}

/// ScanMatch edges joining vertices captured more than half a lap apart.
fn cross_lap_matches(use_tree: bool, laps: f32) -> usize {
    let mut drive = Drive::new(5);
    let mut m = PoseGraphManager::new(
        PoseGraphConfig::default(),
        &SolverSettings::default(),
        &LifelongConfig {
            enabled: false,
            use_tree,
            ..LifelongConfig::default()
        },
        [LidarSimConfig::default().laser_geometry()],
    )
    .unwrap();

    let step = 0.5;
    let per_lap = (drive.route.length() / step) as usize;
    for _ in 0..(per_lap as f32 * laps) as usize {
        m.process_scan(&drive.next(step)).unwrap();
    }

    let lap_gap = per_lap as VertexId / 2;
    let graph = m.graph();
    let graph = graph.read();
    graph
        .edges()
        .filter(|e| e.constraint.kind == EdgeKind::ScanMatch)
        .filter(|e| e.from.abs_diff(e.to) > lap_gap)
        .count()
}

#[test]
fn test_second_lap_matches_first_lap_with_both_strategies() {
    let tree = cross_lap_matches(true, 1.5);
    let links = cross_lap_matches(false, 1.5);
    assert!(tree > 0, "tree found no revisits");
    assert!(links > 0, "link traversal found no revisits");
}
