//! Laser descriptors: per-sensor geometry and mounting.
//!
//! A scan can only become a vertex once its frame has a calibrated
//! descriptor. Unknown frames are rejected and warned about once per frame.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::manager::AddScanRejection;
use crate::core::types::{LaserScan, Pose2D};

/// Geometry of one range sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaserGeometry {
    /// Sensor frame id the scans carry.
    pub frame_id: String,
    /// First beam angle (radians).
    pub angle_min: f32,
    /// Last beam angle (radians).
    pub angle_max: f32,
    /// Angle between beams (radians).
    pub angle_increment: f32,
    /// Minimum usable range (meters).
    pub range_min: f32,
    /// Maximum usable range (meters).
    pub range_max: f32,
    /// Sensor mounted upside down (beam order mirrored).
    pub inverted: bool,
    /// Sensor pose relative to the robot.
    pub mount: Pose2D,
}

impl Default for LaserGeometry {
    fn default() -> Self {
        Self {
            frame_id: "laser".to_string(),
            angle_min: -std::f32::consts::PI,
            angle_max: std::f32::consts::PI,
            angle_increment: std::f32::consts::PI / 180.0,
            range_min: 0.15,
            range_max: 12.0,
            inverted: false,
            mount: Pose2D::identity(),
        }
    }
}

impl LaserGeometry {
    /// Whether the descriptor describes a usable sensor.
    pub fn is_calibrated(&self) -> bool {
        self.angle_increment.is_finite()
            && self.angle_increment > 0.0
            && self.angle_max > self.angle_min
            && self.range_min >= 0.0
            && self.range_max > self.range_min
    }

    /// Expected beam count per scan.
    pub fn expected_readings(&self) -> usize {
        ((self.angle_max - self.angle_min) / self.angle_increment).round() as usize + 1
    }

    /// Whether a scan was produced by a sensor with this geometry.
    ///
    /// One beam of slack absorbs drivers that include or drop the closing
    /// beam of a full sweep.
    pub fn accepts(&self, scan: &LaserScan) -> bool {
        let expected = self.expected_readings();
        (scan.angle_min - self.angle_min).abs() < 1e-3
            && (scan.angle_increment - self.angle_increment).abs() < 1e-5
            && scan.len().abs_diff(expected) <= 1
    }

    /// Normalize a raw scan to this sensor's conventions.
    ///
    /// Range limits come from the descriptor; an inverted mount mirrors the
    /// beam order.
    pub fn prepare(&self, scan: &LaserScan) -> LaserScan {
        let mut out = scan.clone();
        out.range_min = self.range_min;
        out.range_max = self.range_max;
        if self.inverted {
            out.angle_min = -scan.angle_max();
            out.ranges.reverse();
        }
        out
    }
}

/// Descriptors keyed by frame id.
#[derive(Debug, Default)]
pub struct LaserRegistry {
    lasers: HashMap<String, LaserGeometry>,
    warned: HashSet<String>,
}

impl LaserRegistry {
    /// Create a registry from configured descriptors.
    pub fn new(lasers: impl IntoIterator<Item = LaserGeometry>) -> Self {
        let mut registry = Self::default();
        for laser in lasers {
            registry.register(laser);
        }
        registry
    }

    /// Add or replace a descriptor.
    pub fn register(&mut self, geometry: LaserGeometry) {
        log::info!(
            "Registered laser '{}': {:.3}..{:.3} rad, {:.2}..{:.2} m{}",
            geometry.frame_id,
            geometry.angle_min,
            geometry.angle_max,
            geometry.range_min,
            geometry.range_max,
            if geometry.inverted { ", inverted" } else { "" }
        );
        self.warned.remove(&geometry.frame_id);
        self.lasers.insert(geometry.frame_id.clone(), geometry);
    }

    /// Look up a descriptor.
    pub fn get(&self, frame_id: &str) -> Option<&LaserGeometry> {
        self.lasers.get(frame_id)
    }

    /// Number of registered sensors.
    pub fn len(&self) -> usize {
        self.lasers.len()
    }

    /// Whether no sensor is registered.
    pub fn is_empty(&self) -> bool {
        self.lasers.is_empty()
    }

    /// Resolve the descriptor for a scan.
    ///
    /// Logs a warning the first time each frame fails.
    pub fn resolve(&mut self, scan: &LaserScan) -> Result<&LaserGeometry, AddScanRejection> {
        let frame = scan.frame_id.as_str();
        let rejection = match self.lasers.get(frame) {
            Some(g) if g.is_calibrated() && g.accepts(scan) => None,
            Some(_) => Some(AddScanRejection::UncalibratedLaser(frame.to_string())),
            None => Some(AddScanRejection::UnknownLaserGeometry(frame.to_string())),
        };

        if let Some(rejection) = rejection {
            if self.warned.insert(frame.to_string()) {
                log::warn!("Discarding scans from '{}': {}", frame, rejection);
            }
            return Err(rejection);
        }

        self.lasers
            .get(frame)
            .ok_or_else(|| AddScanRejection::UnknownLaserGeometry(frame.to_string()))
    }
}
