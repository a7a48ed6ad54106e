//! Noisy range sensor and drifting odometry.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use super::room::Room;
use crate::core::types::{LaserScan, Pose2D};
use crate::engine::graph::LaserGeometry;

/// Simulated sensor parameters.
#[derive(Debug, Clone)]
pub struct LidarSimConfig {
    /// Frame id stamped on every scan.
    pub frame_id: String,
    /// Beams per revolution.
    pub num_beams: usize,
    /// Minimum range (meters).
    pub range_min: f32,
    /// Maximum range (meters).
    pub range_max: f32,
    /// Gaussian range noise (meters).
    pub range_stddev: f32,
    /// Sensor pose relative to the robot.
    pub mount: Pose2D,
}

impl Default for LidarSimConfig {
    fn default() -> Self {
        Self {
            frame_id: "laser".to_string(),
            num_beams: 360,
            range_min: 0.15,
            range_max: 8.0,
            range_stddev: 0.005,
            mount: Pose2D::identity(),
        }
    }
}

impl LidarSimConfig {
    /// Descriptor matching the scans this sensor produces.
    pub fn laser_geometry(&self) -> LaserGeometry {
        let increment = std::f32::consts::TAU / self.num_beams.max(1) as f32;
        LaserGeometry {
            frame_id: self.frame_id.clone(),
            angle_min: -std::f32::consts::PI,
            angle_max: -std::f32::consts::PI + (self.num_beams.max(1) - 1) as f32 * increment,
            angle_increment: increment,
            range_min: self.range_min,
            range_max: self.range_max,
            inverted: false,
            mount: self.mount,
        }
    }
}

/// Ray-casting range sensor.
pub struct LidarSimulator {
    config: LidarSimConfig,
    rng: StdRng,
    noise: Option<Normal<f32>>,
}

impl LidarSimulator {
    /// Create a simulator with a fixed seed.
    pub fn new(config: LidarSimConfig, seed: u64) -> Self {
        let noise = (config.range_stddev > 0.0)
            .then(|| Normal::new(0.0, config.range_stddev).ok())
            .flatten();
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
            noise,
        }
    }

    /// Sensor parameters.
    pub fn config(&self) -> &LidarSimConfig {
        &self.config
    }

    /// Angle between beams.
    pub fn angle_increment(&self) -> f32 {
        std::f32::consts::TAU / self.config.num_beams.max(1) as f32
    }

    /// Scan `room` from the true robot pose.
    ///
    /// Beams that hit nothing report `range_max`.
    pub fn scan(&mut self, room: &Room, robot: &Pose2D, timestamp_us: u64) -> LaserScan {
        let sensor = robot.compose(&self.config.mount);
        let increment = self.angle_increment();
        let angle_min = -std::f32::consts::PI;

        let ranges = (0..self.config.num_beams)
            .map(|i| {
                let angle = sensor.theta + angle_min + i as f32 * increment;
                let r = room.ray_cast(sensor.position(), angle, self.config.range_max);
                if r >= self.config.range_max {
                    return self.config.range_max;
                }
                let noisy = match &self.noise {
                    Some(n) => r + n.sample(&mut self.rng),
                    None => r,
                };
                noisy.clamp(self.config.range_min, self.config.range_max - 1e-3)
            })
            .collect();

        LaserScan::new(
            self.config.frame_id.clone(),
            timestamp_us,
            angle_min,
            increment,
            self.config.range_min,
            self.config.range_max,
            ranges,
        )
    }
}

/// Odometry that accumulates a small multiplicative drift.
pub struct OdometrySimulator {
    estimate: Pose2D,
    last_truth: Option<Pose2D>,
    translation_drift: f32,
    rotation_drift: f32,
    rng: StdRng,
}

impl OdometrySimulator {
    /// `translation_drift` and `rotation_drift` are relative std devs.
    pub fn new(translation_drift: f32, rotation_drift: f32, seed: u64) -> Self {
        Self {
            estimate: Pose2D::identity(),
            last_truth: None,
            translation_drift,
            rotation_drift,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Advance to the new true pose and return the odometry estimate.
    pub fn update(&mut self, truth: &Pose2D) -> Pose2D {
        let Some(last) = self.last_truth.replace(*truth) else {
            self.estimate = *truth;
            return self.estimate;
        };
        let delta = last.between(truth);
        let trans = delta.x.hypot(delta.y);
        let noisy = Pose2D::new(
            delta.x + self.sample(self.translation_drift * trans),
            delta.y + self.sample(self.translation_drift * trans),
            delta.theta + self.sample(self.rotation_drift * delta.theta.abs()),
        );
        self.estimate = self.estimate.compose(&noisy);
        self.estimate
    }

    fn sample(&mut self, stddev: f32) -> f32 {
        match Normal::new(0.0, stddev) {
            Ok(n) if stddev > 0.0 => n.sample(&mut self.rng),
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_noiseless_scan_matches_room() {
        let room = Room::rectangle(6.0, 4.0);
        let mut lidar = LidarSimulator::new(
            LidarSimConfig {
                range_stddev: 0.0,
                num_beams: 4,
                ..Default::default()
            },
            1,
        );
        // Beams at -pi, -pi/2, 0, pi/2 from (2, 1).
        let scan = lidar.scan(&room, &Pose2D::new(2.0, 1.0, 0.0), 7);

        assert_eq!(scan.timestamp_us, 7);
        assert_eq!(scan.len(), 4);
        assert_relative_eq!(scan.ranges[0], 2.0, epsilon = 1e-4);
        assert_relative_eq!(scan.ranges[1], 1.0, epsilon = 1e-4);
        assert_relative_eq!(scan.ranges[2], 4.0, epsilon = 1e-4);
        assert_relative_eq!(scan.ranges[3], 3.0, epsilon = 1e-4);
    }

    #[test]
    fn test_laser_geometry_accepts_simulated_scans() {
        let config = LidarSimConfig::default();
        let geometry = config.laser_geometry();
        let mut lidar = LidarSimulator::new(config, 5);
        let scan = lidar.scan(&Room::rectangle(6.0, 4.0), &Pose2D::new(3.0, 2.0, 0.3), 0);

        assert!(geometry.is_calibrated());
        assert!(geometry.accepts(&scan));
        assert_eq!(geometry.expected_readings(), scan.len());
        assert_eq!(geometry.range_max, scan.range_max);
    }

    #[test]
    fn test_out_of_range_reports_max() {
        let room = Room::rectangle(20.0, 20.0);
        let mut lidar = LidarSimulator::new(LidarSimConfig::default(), 3);
        let scan = lidar.scan(&room, &Pose2D::new(10.0, 10.0, 0.0), 0);
        assert!(scan.ranges.iter().all(|r| *r == scan.range_max));
    }

    #[test]
    fn test_drift_free_odometry_tracks_truth() {
        let mut odom = OdometrySimulator::new(0.0, 0.0, 5);
        odom.update(&Pose2D::new(1.0, 1.0, 0.0));
        let est = odom.update(&Pose2D::new(2.0, 1.5, 0.3));
        assert_relative_eq!(est.x, 2.0, epsilon = 1e-5);
        assert_relative_eq!(est.y, 1.5, epsilon = 1e-5);
        assert_relative_eq!(est.theta, 0.3, epsilon = 1e-5);
    }
}
