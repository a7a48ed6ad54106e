//! LiDAR scan and point cloud types.

use std::sync::Arc;

use super::pose::{Point2D, Pose2D};
use serde::{Deserialize, Serialize};

/// Raw LiDAR scan in polar coordinates.
///
/// Represents a single sweep from a 2D range sensor, as delivered by the
/// transport layer. Ranges are sampled uniformly from `angle_min` with
/// `angle_increment` spacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaserScan {
    /// Sensor frame this scan was captured in.
    pub frame_id: String,
    /// Capture timestamp in microseconds.
    pub timestamp_us: u64,
    /// Start angle in radians
    pub angle_min: f32,
    /// Angular resolution (radians between consecutive readings)
    pub angle_increment: f32,
    /// Minimum valid range in meters
    pub range_min: f32,
    /// Maximum valid range in meters
    pub range_max: f32,
    /// Range measurements in meters (0 or NaN = invalid)
    pub ranges: Vec<f32>,
}

impl LaserScan {
    /// Create a new laser scan.
    pub fn new(
        frame_id: impl Into<String>,
        timestamp_us: u64,
        angle_min: f32,
        angle_increment: f32,
        range_min: f32,
        range_max: f32,
        ranges: Vec<f32>,
    ) -> Self {
        Self {
            frame_id: frame_id.into(),
            timestamp_us,
            angle_min,
            angle_increment,
            range_min,
            range_max,
            ranges,
        }
    }

    /// Number of range measurements.
    #[inline]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Check if scan is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Angle of the last reading.
    #[inline]
    pub fn angle_max(&self) -> f32 {
        self.angle_at(self.ranges.len().saturating_sub(1))
    }

    /// Get the angle for a given index.
    #[inline]
    pub fn angle_at(&self, index: usize) -> f32 {
        self.angle_min + index as f32 * self.angle_increment
    }

    /// Check if a range value is a usable return.
    #[inline]
    pub fn is_valid_range(&self, range: f32) -> bool {
        range.is_finite() && range > 0.0 && range >= self.range_min
    }

    /// Check if a range value is an actual obstacle hit (not a max-range miss).
    #[inline]
    pub fn is_hit(&self, range: f32) -> bool {
        self.is_valid_range(range) && range < self.range_max
    }

    /// Iterate over (angle, range) pairs of usable returns.
    pub fn iter_valid(&self) -> impl Iterator<Item = (f32, f32)> + '_ {
        self.ranges
            .iter()
            .enumerate()
            .filter(|(_, r)| self.is_valid_range(**r))
            .map(|(i, &r)| (self.angle_at(i), r))
    }

    /// Count valid points.
    pub fn valid_count(&self) -> usize {
        self.ranges
            .iter()
            .filter(|&&r| self.is_valid_range(r))
            .count()
    }

    /// Convert obstacle hits to a Cartesian point cloud in the sensor frame.
    ///
    /// Max-range readings carry no obstacle and are skipped.
    pub fn to_point_cloud(&self) -> PointCloud2D {
        let mut cloud = PointCloud2D::with_capacity(self.ranges.len());
        for (angle, range) in self.iter_valid() {
            if range >= self.range_max {
                continue;
            }
            let (sin_a, cos_a) = angle.sin_cos();
            cloud.push(Point2D::new(range * cos_a, range * sin_a));
        }
        cloud
    }
}

/// 2D point cloud in Cartesian coordinates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointCloud2D {
    /// Points in meters.
    pub points: Vec<Point2D>,
}

impl PointCloud2D {
    /// Create an empty point cloud.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
        }
    }

    /// Create from existing points.
    pub fn from_points(points: Vec<Point2D>) -> Self {
        Self { points }
    }

    /// Add a point.
    #[inline]
    pub fn push(&mut self, point: Point2D) {
        self.points.push(point);
    }

    /// Number of points.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Iterate over points.
    pub fn iter(&self) -> impl Iterator<Item = &Point2D> + '_ {
        self.points.iter()
    }

    /// Transform every point by a pose (local → global).
    pub fn transform(&self, pose: &Pose2D) -> PointCloud2D {
        PointCloud2D {
            points: self.points.iter().map(|p| pose.transform_point(p)).collect(),
        }
    }
}

/// A scan paired with the robot pose estimate at capture time.
///
/// Created by admission control, consumed exactly once by the ingestion
/// thread.
#[derive(Debug, Clone)]
pub struct PosedScan {
    /// The sensor reading.
    pub scan: Arc<LaserScan>,
    /// Robot pose in the odometry frame at capture time.
    pub pose: Pose2D,
}

impl PosedScan {
    /// Pair a scan with its capture pose.
    pub fn new(scan: LaserScan, pose: Pose2D) -> Self {
        Self {
            scan: Arc::new(scan),
            pose,
        }
    }
}
