//! Ingestion pipeline tests: admission control, pause gating, queue
//! clearing and consumer wake-up across threads.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use smriti_slam::ingestion::{
    Admission, AdmissionConfig, OdometryBuffer, RejectionReason, ScanQueue, SensorFrontend,
    TransformError,
};
use smriti_slam::engine::graph::SolverSettings;
use smriti_slam::sim::{LidarSimConfig, LidarSimulator, Room};
use smriti_slam::{
    LaserScan, LifelongConfig, Pose2D, PoseGraphConfig, PoseGraphManager, SlamError, Timestamped,
};

fn scan(timestamp_us: u64) -> LaserScan {
    LaserScan::new(
        "laser",
        timestamp_us,
        -std::f32::consts::PI,
        std::f32::consts::TAU / 8.0,
        0.1,
        8.0,
        vec![2.0; 8],
    )
}

fn queue(config: AdmissionConfig) -> Arc<ScanQueue> {
    Arc::new(ScanQueue::new(config))
}

fn distance_only(minimum_travel_distance: f32) -> AdmissionConfig {
    AdmissionConfig {
        minimum_time_interval: 0.0,
        minimum_travel_distance,
        minimum_travel_heading: 10.0,
        throttle_scans: 1,
        max_queue_size: 0,
    }
}

#[test]
fn test_distance_gate_admits_first_and_third() {
    let q = queue(distance_only(1.0));

    let outcomes: Vec<Admission> = [0.0, 0.5, 1.2]
        .iter()
        .enumerate()
        .map(|(i, x)| {
            let t = i as u64 * 1_000_000;
            q.try_admit(scan(t), Pose2D::new(*x, 0.0, 0.0), t)
        })
        .collect();

    assert_eq!(
        outcomes,
        vec![
            Admission::Accepted,
            Admission::Rejected(RejectionReason::BelowDistanceThreshold),
            Admission::Accepted,
        ]
    );
    assert_eq!(q.len(), 2);
}

#[test]
fn test_exact_threshold_distance_is_rejected() {
    let q = queue(distance_only(1.0));
    assert!(q.try_admit(scan(0), Pose2D::identity(), 0).is_accepted());
    assert_eq!(
        q.try_admit(scan(1), Pose2D::new(1.0, 0.0, 0.0), 1),
        Admission::Rejected(RejectionReason::BelowDistanceThreshold)
    );
}

#[test]
fn test_time_gate() {
    let q = queue(AdmissionConfig {
        minimum_time_interval: 0.5,
        ..distance_only(0.0)
    });
    assert!(q.try_admit(scan(0), Pose2D::identity(), 0).is_accepted());
    assert_eq!(
        q.try_admit(scan(1), Pose2D::new(2.0, 0.0, 0.0), 400_000),
        Admission::Rejected(RejectionReason::BelowTimeThreshold)
    );
    assert!(
        q.try_admit(scan(2), Pose2D::new(2.0, 0.0, 0.0), 600_000)
            .is_accepted()
    );
}

#[test]
fn test_pause_rejects_until_resume_and_keeps_pending() {
    let q = queue(distance_only(0.1));
    assert!(q.try_admit(scan(0), Pose2D::identity(), 0).is_accepted());

    q.pause();
    for i in 1..5 {
        assert_eq!(
            q.try_admit(scan(i), Pose2D::new(i as f32, 0.0, 0.0), i),
            Admission::Rejected(RejectionReason::Paused)
        );
    }
    assert!(q.dequeue_timeout(Duration::from_millis(20)).is_none());
    assert_eq!(q.len(), 1);

    q.resume();
    assert!(q.dequeue_timeout(Duration::from_millis(20)).is_some());
    assert!(
        q.try_admit(scan(9), Pose2D::new(9.0, 0.0, 0.0), 9)
            .is_accepted()
    );
}

#[test]
fn test_clear_queue_leaves_graph_untouched() {
    let room = Room::rectangle(6.0, 4.0);
    let sim = LidarSimConfig::default();
    let mut manager = PoseGraphManager::new(
        PoseGraphConfig::default(),
        &SolverSettings::default(),
        &LifelongConfig::default(),
        [sim.laser_geometry()],
    )
    .unwrap();
    let mut lidar = LidarSimulator::new(sim, 4);
    let q = queue(distance_only(0.1));

    let mut admit = |x: f32, t: u64| {
        let pose = Pose2D::new(x, 1.5, 0.0);
        q.try_admit(lidar.scan(&room, &pose, t), pose, t)
    };
    assert!(admit(1.0, 0).is_accepted());
    let first = q.dequeue().unwrap();
    manager.process_scan(&first).unwrap();
    let before = manager.stats();

    assert!(admit(2.0, 1).is_accepted());
    assert!(admit(3.0, 2).is_accepted());
    assert_eq!(q.clear_queue(), 2);
    assert!(q.is_empty());
    assert_eq!(q.stats().cleared, 2);

    assert_eq!(manager.stats(), before);
}

#[test]
fn test_consumer_receives_in_order_across_threads() {
    let q = queue(distance_only(0.1));
    let consumer = {
        let q = Arc::clone(&q);
        thread::spawn(move || {
            let mut seen = Vec::new();
            while let Some(posed) = q.dequeue() {
                seen.push(posed.scan.timestamp_us);
            }
            seen
        })
    };

    for i in 0..50u64 {
        let t = i * 1000;
        assert!(q.try_admit(scan(t), Pose2D::new(i as f32, 0.0, 0.0), t).is_accepted());
    }
    while !q.is_empty() {
        thread::sleep(Duration::from_millis(1));
    }
    q.shutdown();

    let seen = consumer.join().unwrap();
    assert_eq!(seen, (0..50u64).map(|i| i * 1000).collect::<Vec<_>>());
}

#[test]
fn test_shutdown_wakes_blocked_consumer() {
    let q = queue(AdmissionConfig::default());
    let consumer = {
        let q = Arc::clone(&q);
        thread::spawn(move || q.dequeue())
    };
    thread::sleep(Duration::from_millis(30));
    q.shutdown();

    assert!(consumer.join().unwrap().is_none());
    assert_eq!(
        q.try_admit(scan(0), Pose2D::identity(), 0),
        Admission::Rejected(RejectionReason::ShuttingDown)
    );
}

#[test]
fn test_frontend_interpolates_capture_pose() {
    let odometry = Arc::new(OdometryBuffer::new("base_link", "odom", 16));
    odometry.push(Timestamped::new(Pose2D::new(0.0, 0.0, 0.0), 0));
    odometry.push(Timestamped::new(Pose2D::new(2.0, 0.0, 0.0), 1_000_000));

    let q = queue(distance_only(0.5));
    let frontend = SensorFrontend::new(Arc::clone(&q), odometry, "base_link", "odom");

    frontend.on_scan(scan(500_000)).unwrap();
    let posed = q.dequeue().unwrap();
    assert!((posed.pose.x - 1.0).abs() < 1e-5);

    let err = frontend.on_scan(scan(2_000_000)).unwrap_err();
    assert!(matches!(
        err,
        SlamError::TransformUnavailable(TransformError::Extrapolation { .. })
    ));
    assert!(q.is_empty());
}
