//! Sensor callback side: pose lookup at capture time, then admission.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use super::queue::{Admission, ScanQueue};
use crate::core::types::{LaserScan, Pose2D, Timestamped};
use crate::error::SlamError;

/// Why a transform lookup failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    /// No transform between the frames is known.
    #[error("no transform from '{frame}' to '{target}'")]
    Unavailable { frame: String, target: String },

    /// The requested time lies outside the buffered history.
    #[error("timestamp {requested_us} us outside [{oldest_us}, {newest_us}]")]
    Extrapolation {
        requested_us: u64,
        oldest_us: u64,
        newest_us: u64,
    },
}

/// Pose of `frame` expressed in `target_frame` at a point in time.
pub trait TransformProvider: Send + Sync {
    fn lookup(
        &self,
        frame: &str,
        target_frame: &str,
        timestamp_us: u64,
    ) -> Result<Pose2D, TransformError>;
}

/// Bounded odometry history that interpolates between samples.
///
/// Answers lookups of `base_frame` in `odom_frame` only.
#[derive(Debug)]
pub struct OdometryBuffer {
    base_frame: String,
    odom_frame: String,
    capacity: usize,
    samples: Mutex<VecDeque<Timestamped<Pose2D>>>,
}

impl OdometryBuffer {
    /// Create an empty buffer holding at most `capacity` samples.
    pub fn new(base_frame: impl Into<String>, odom_frame: impl Into<String>, capacity: usize) -> Self {
        Self {
            base_frame: base_frame.into(),
            odom_frame: odom_frame.into(),
            capacity: capacity.max(2),
            samples: Mutex::new(VecDeque::new()),
        }
    }

    /// Record an odometry sample. Out-of-order samples are dropped.
    pub fn push(&self, sample: Timestamped<Pose2D>) {
        let mut samples = self.samples.lock();
        if samples
            .back()
            .is_some_and(|last| sample.timestamp_us < last.timestamp_us)
        {
            log::debug!("Dropping out-of-order odometry at {} us", sample.timestamp_us);
            return;
        }
        samples.push_back(sample);
        while samples.len() > self.capacity {
            samples.pop_front();
        }
    }

    /// Buffered sample count.
    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    /// Whether no sample has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TransformProvider for OdometryBuffer {
    fn lookup(
        &self,
        frame: &str,
        target_frame: &str,
        timestamp_us: u64,
    ) -> Result<Pose2D, TransformError> {
        let unavailable = || TransformError::Unavailable {
            frame: frame.to_string(),
            target: target_frame.to_string(),
        };
        if frame != self.base_frame || target_frame != self.odom_frame {
            return Err(unavailable());
        }

        let samples = self.samples.lock();
        let (Some(oldest), Some(newest)) = (samples.front(), samples.back()) else {
            return Err(unavailable());
        };
        if timestamp_us < oldest.timestamp_us || timestamp_us > newest.timestamp_us {
            return Err(TransformError::Extrapolation {
                requested_us: timestamp_us,
                oldest_us: oldest.timestamp_us,
                newest_us: newest.timestamp_us,
            });
        }

        // First sample at or after the requested time.
        let after = samples.partition_point(|s| s.timestamp_us < timestamp_us);
        let end = &samples[after];
        if end.timestamp_us == timestamp_us || after == 0 {
            return Ok(end.data);
        }
        Pose2D::interpolate(&samples[after - 1], end, timestamp_us).ok_or_else(unavailable)
    }
}

/// Entry point for sensor callbacks.
pub struct SensorFrontend {
    queue: Arc<ScanQueue>,
    transforms: Arc<dyn TransformProvider>,
    base_frame: String,
    odom_frame: String,
}

impl SensorFrontend {
    pub fn new(
        queue: Arc<ScanQueue>,
        transforms: Arc<dyn TransformProvider>,
        base_frame: impl Into<String>,
        odom_frame: impl Into<String>,
    ) -> Self {
        Self {
            queue,
            transforms,
            base_frame: base_frame.into(),
            odom_frame: odom_frame.into(),
        }
    }

    /// Look up the capture pose and submit the scan for admission.
    ///
    /// A failed lookup drops the scan. Never blocks on the graph.
    pub fn on_scan(&self, scan: LaserScan) -> Result<(), SlamError> {
        let timestamp_us = scan.timestamp_us;
        let pose = self
            .transforms
            .lookup(&self.base_frame, &self.odom_frame, timestamp_us)
            .inspect_err(|e| log::debug!("Dropping scan at {} us: {}", timestamp_us, e))?;

        match self.queue.try_admit(scan, pose, timestamp_us) {
            Admission::Accepted => Ok(()),
            Admission::Rejected(reason) => Err(SlamError::AdmissionRejected(reason)),
        }
    }

    /// The queue scans are admitted into.
    pub fn queue(&self) -> &Arc<ScanQueue> {
        &self.queue
    }
}
