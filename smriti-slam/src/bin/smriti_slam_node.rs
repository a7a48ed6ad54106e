//! smriti-slam-node daemon
//!
//! Drives a simulated robot around a furnished room, feeds its range scans
//! and drifting odometry into the SLAM pipeline, and saves the map and pose
//! graph on exit.
//!
//! # Usage
//!
//! ```bash
//! # Run until Ctrl-C with default config
//! cargo run --bin smriti-slam-node
//!
//! # 400 simulated seconds, 5x faster than real time
//! cargo run --bin smriti-slam-node -- --config smriti.toml --duration 400 --speedup 5
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::Parser;

use smriti_slam::sim::{LidarSimConfig, LidarSimulator, LoopRoute, OdometrySimulator, Room};
use smriti_slam::{
    CommandResponse, OdometryBuffer, Point2D, SlamCommand, SlamError, SlamSystem, SmritiConfig,
    Timestamped, load_config,
};

/// Odometry samples kept for pose lookup.
const ODOMETRY_HISTORY: usize = 256;

#[derive(Parser, Debug)]
#[command(name = "smriti-slam-node")]
#[command(about = "Lifelong pose-graph SLAM on a simulated range sensor")]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Simulated seconds to run (0 = until Ctrl-C)
    #[arg(short, long, default_value = "0")]
    duration: f32,

    /// Scan rate (Hz)
    #[arg(long, default_value = "10.0")]
    rate: f32,

    /// Robot speed along the route (m/s)
    #[arg(long, default_value = "0.3")]
    speed: f32,

    /// Simulation speed relative to real time
    #[arg(long, default_value = "1.0")]
    speedup: f32,

    /// Random seed for sensor noise and odometry drift
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Skip saving the map and pose graph on exit
    #[arg(long)]
    no_save: bool,
}

/// 8 x 6 m room with a table, a sofa and a pillar.
fn furnished_room() -> Room {
    let mut room = Room::rectangle(8.0, 6.0);
    room.add_box(Point2D::new(3.2, 2.4), Point2D::new(4.6, 3.4));
    room.add_box(Point2D::new(7.3, 0.4), Point2D::new(7.8, 2.2));
    room.add_box(Point2D::new(2.0, 5.3), Point2D::new(2.4, 5.7));
    room
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {} - {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => {
            log::info!("smriti-slam-node shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), SlamError> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => SmritiConfig::default(),
    };

    let lidar_config = LidarSimConfig::default();
    if !config
        .lasers
        .iter()
        .any(|l| l.frame_id == lidar_config.frame_id)
    {
        config.lasers.push(lidar_config.laser_geometry());
    }

    log::info!("smriti-slam-node starting...");
    log::info!("  Solver: {}", config.graph.solver);
    log::info!(
        "  Admission: {:.2} m / {:.2} rad / {:.2} s",
        config.ingestion.minimum_travel_distance,
        config.ingestion.minimum_travel_heading,
        config.ingestion.minimum_time_interval
    );
    log::info!(
        "  Lifelong pruning: {} ({})",
        config.lifelong.enabled,
        if config.lifelong.use_tree { "k-d tree" } else { "link traversal" }
    );
    log::info!("  Output: {}", config.persistence.output_dir.display());

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| SlamError::ConfigurationFatal(format!("failed to set Ctrl-C handler: {e}")))?;

    let odometry = Arc::new(OdometryBuffer::new(
        config.frames.base_frame.clone(),
        config.frames.odom_frame.clone(),
        ODOMETRY_HISTORY,
    ));
    let system = SlamSystem::spawn(config, odometry.clone(), Vec::new())?;

    simulate(args, &system, &odometry, lidar_config, &running);

    if let Ok(CommandResponse::Stats(stats)) = system.execute(SlamCommand::Stats) {
        log::info!("Final graph: {:?}", stats.graph);
    }

    let mut worker = system.shutdown()?;
    if !args.no_save {
        worker.save_on_exit();
    }
    Ok(())
}

/// Drive the route until the duration elapses or shutdown is requested.
fn simulate(
    args: &Args,
    system: &SlamSystem,
    odometry: &OdometryBuffer,
    lidar_config: LidarSimConfig,
    running: &AtomicBool,
) {
    let room = furnished_room();
    let Some(route) = LoopRoute::rectangle(8.0, 6.0, 1.2) else {
        return;
    };
    let mut lidar = LidarSimulator::new(lidar_config, args.seed);
    let mut odom = OdometrySimulator::new(0.02, 0.01, args.seed.wrapping_add(1));

    let period = 1.0 / args.rate.max(0.1);
    let wall_period = Duration::from_secs_f32(period / args.speedup.max(0.01));
    let mut sim_time = 0.0f32;
    let mut last_report = 0.0f32;

    log::info!("Simulating {:.1} m loop at {:.2} m/s", route.length(), args.speed);

    while running.load(Ordering::Relaxed) && (args.duration <= 0.0 || sim_time < args.duration) {
        let tick = Instant::now();
        let timestamp_us = (sim_time as f64 * 1e6) as u64;

        let truth = route.pose_at(sim_time * args.speed);
        odometry.push(Timestamped::new(odom.update(&truth), timestamp_us));
        let scan = lidar.scan(&room, &truth, timestamp_us);
        if let Err(e) = system.frontend().on_scan(scan) {
            log::trace!("Scan at {} us not queued: {}", timestamp_us, e);
        }

        if sim_time - last_report >= 10.0 {
            last_report = sim_time;
            if let Ok(CommandResponse::Stats(stats)) = system.execute(SlamCommand::Stats) {
                log::info!(
                    "t={:.0}s vertices={} edges={} evicted={} loop closures={} queued={}",
                    sim_time,
                    stats.graph.vertices,
                    stats.graph.edges,
                    stats.graph.evictions,
                    stats.graph.loop_closures,
                    stats.queue.pending
                );
            }
        }

        sim_time += period;
        if let Some(rest) = wall_period.checked_sub(tick.elapsed()) {
            std::thread::sleep(rest);
        }
    }
}
