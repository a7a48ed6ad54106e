//! Bounded admission queue.
//!
//! One lock guards the pending items, the pause gate, the shutdown flag and
//! the admission bookkeeping. It is held only for the duration of a single
//! queue operation.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::{LaserScan, Pose2D, PosedScan};

/// Admission thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Minimum time since the last accepted scan (seconds).
    pub minimum_time_interval: f64,

    /// Travel since the last accepted scan must exceed this (meters).
    pub minimum_travel_distance: f32,

    /// Rotation since the last accepted scan that admits a scan even
    /// without enough travel (radians).
    pub minimum_travel_heading: f32,

    /// Only every Nth scan is considered.
    pub throttle_scans: u32,

    /// Maximum pending scans (0 = unbounded).
    pub max_queue_size: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            minimum_time_interval: 0.5,
            minimum_travel_distance: 0.5,
            minimum_travel_heading: 0.5,
            throttle_scans: 1,
            max_queue_size: 64,
        }
    }
}

/// Why a scan was not admitted.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectionReason {
    #[error("ingestion paused")]
    Paused,
    #[error("too soon after the last accepted scan")]
    BelowTimeThreshold,
    #[error("not enough travel since the last accepted scan")]
    BelowDistanceThreshold,
    #[error("queue full")]
    QueueFull,
    #[error("throttled")]
    ThrottledByCount,
    #[error("shutting down")]
    ShuttingDown,
}

/// Result of an admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    Rejected(RejectionReason),
}

impl Admission {
    /// Whether the scan was queued.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Admission::Accepted)
    }
}

/// Counters for the operator surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub admitted: u64,
    pub rejected: u64,
    pub cleared: u64,
    pub pending: usize,
}

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<PosedScan>,
    paused: bool,
    shutdown: bool,
    /// Capture time and pose of the last accepted scan.
    last_accepted: Option<(u64, Pose2D)>,
    /// Scans seen while not paused (throttle counter).
    seen: u64,
    stats: QueueStats,
}

/// FIFO of admitted scans with exactly one consumer.
#[derive(Debug)]
pub struct ScanQueue {
    config: AdmissionConfig,
    state: Mutex<QueueState>,
    available: Condvar,
}

impl ScanQueue {
    /// Create an empty, running queue.
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            config,
            state: Mutex::new(QueueState::default()),
            available: Condvar::new(),
        }
    }

    /// Admission thresholds in use.
    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Apply admission control and enqueue on success.
    ///
    /// `now_us` is the capture time of the scan.
    pub fn try_admit(&self, scan: LaserScan, pose: Pose2D, now_us: u64) -> Admission {
        let mut state = self.state.lock();
        let admission = self.evaluate(&mut state, &pose, now_us);

        match admission {
            Admission::Accepted => {
                state.last_accepted = Some((now_us, pose));
                state.items.push_back(PosedScan::new(scan, pose));
                state.stats.admitted += 1;
                drop(state);
                self.available.notify_one();
            }
            Admission::Rejected(reason) => {
                state.stats.rejected += 1;
                log::debug!("Scan at {} us rejected: {}", now_us, reason);
            }
        }
        admission
    }

    fn evaluate(&self, state: &mut QueueState, pose: &Pose2D, now_us: u64) -> Admission {
        use RejectionReason::*;

        if state.shutdown {
            return Admission::Rejected(ShuttingDown);
        }
        if state.paused {
            return Admission::Rejected(Paused);
        }
        state.seen += 1;

        let full = self.config.max_queue_size > 0 && state.items.len() >= self.config.max_queue_size;

        let Some((last_us, last_pose)) = state.last_accepted else {
            return if full {
                Admission::Rejected(QueueFull)
            } else {
                Admission::Accepted
            };
        };

        let throttle = u64::from(self.config.throttle_scans.max(1));
        if state.seen % throttle != 0 {
            return Admission::Rejected(ThrottledByCount);
        }

        let elapsed = now_us.saturating_sub(last_us) as f64 * 1e-6;
        if elapsed < self.config.minimum_time_interval {
            return Admission::Rejected(BelowTimeThreshold);
        }

        let moved = last_pose.distance(pose) > self.config.minimum_travel_distance;
        let turned = last_pose.heading_change(pose) > self.config.minimum_travel_heading;
        if !moved && !turned {
            return Admission::Rejected(BelowDistanceThreshold);
        }

        if full {
            return Admission::Rejected(QueueFull);
        }
        Admission::Accepted
    }

    /// Block until a scan is available, returning `None` on shutdown.
    ///
    /// While paused the consumer idles even if scans are pending.
    pub fn dequeue(&self) -> Option<PosedScan> {
        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                return None;
            }
            if !state.paused
                && let Some(item) = state.items.pop_front()
            {
                return Some(item);
            }
            self.available.wait(&mut state);
        }
    }

    /// Like [`dequeue`](Self::dequeue) but gives up after `timeout`.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<PosedScan> {
        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                return None;
            }
            if !state.paused
                && let Some(item) = state.items.pop_front()
            {
                return Some(item);
            }
            if self.available.wait_for(&mut state, timeout).timed_out() {
                return None;
            }
        }
    }

    /// Drop every pending scan. Returns how many were discarded.
    pub fn clear_queue(&self) -> usize {
        let mut state = self.state.lock();
        let n = state.items.len();
        state.items.clear();
        state.stats.cleared += n as u64;
        if n > 0 {
            log::info!("Cleared {} pending scans", n);
        }
        n
    }

    /// Close the admission gate. Pending scans are kept.
    pub fn pause(&self) {
        self.state.lock().paused = true;
        log::info!("Scan ingestion paused");
    }

    /// Reopen the admission gate and wake the consumer.
    pub fn resume(&self) {
        self.state.lock().paused = false;
        self.available.notify_all();
        log::info!("Scan ingestion resumed");
    }

    /// Whether the gate is closed.
    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    /// Reject all further scans and wake a blocked consumer.
    pub fn shutdown(&self) {
        self.state.lock().shutdown = true;
        self.available.notify_all();
    }

    /// Whether shutdown was requested.
    pub fn is_shutdown(&self) -> bool {
        self.state.lock().shutdown
    }

    /// Pending scans.
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counter snapshot.
    pub fn stats(&self) -> QueueStats {
        let state = self.state.lock();
        QueueStats {
            pending: state.items.len(),
            ..state.stats
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn scan(ts: u64) -> LaserScan {
        LaserScan::new("laser", ts, 0.0, 0.1, 0.1, 10.0, vec![1.0; 4])
    }

    fn queue(config: AdmissionConfig) -> ScanQueue {
        ScanQueue::new(config)
    }

    fn distance_only(min_distance: f32) -> AdmissionConfig {
        AdmissionConfig {
            minimum_time_interval: 0.0,
            minimum_travel_distance: min_distance,
            minimum_travel_heading: std::f32::consts::PI,
            throttle_scans: 1,
            max_queue_size: 0,
        }
    }

    #[test]
    fn test_distance_gate_uses_last_accepted() {
        let q = queue(distance_only(1.0));
        let results: Vec<bool> = [0.0, 0.5, 1.2]
            .iter()
            .enumerate()
            .map(|(i, x)| {
                q.try_admit(scan(i as u64), Pose2D::new(*x, 0.0, 0.0), i as u64 * 1_000_000)
                    .is_accepted()
            })
            .collect();
        assert_eq!(results, vec![true, false, true]);
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn test_exact_distance_is_rejected() {
        let q = queue(distance_only(1.0));
        q.try_admit(scan(0), Pose2D::identity(), 0);
        assert_eq!(
            q.try_admit(scan(1), Pose2D::new(1.0, 0.0, 0.0), 1_000_000),
            Admission::Rejected(RejectionReason::BelowDistanceThreshold)
        );
    }

    #[test]
    fn test_heading_change_admits_without_travel() {
        let q = queue(AdmissionConfig {
            minimum_travel_heading: 0.5,
            ..distance_only(1.0)
        });
        q.try_admit(scan(0), Pose2D::identity(), 0);
        assert!(q.try_admit(scan(1), Pose2D::new(0.0, 0.0, 0.6), 1).is_accepted());
    }

    #[test]
    fn test_time_gate() {
        let q = queue(AdmissionConfig {
            minimum_time_interval: 1.0,
            ..distance_only(0.0)
        });
        q.try_admit(scan(0), Pose2D::identity(), 0);
        assert_eq!(
            q.try_admit(scan(1), Pose2D::new(2.0, 0.0, 0.0), 500_000),
            Admission::Rejected(RejectionReason::BelowTimeThreshold)
        );
        assert!(
            q.try_admit(scan(2), Pose2D::new(2.0, 0.0, 0.0), 1_000_000)
                .is_accepted()
        );
    }

    #[test]
    fn test_throttle_every_nth() {
        let q = queue(AdmissionConfig {
            throttle_scans: 3,
            ..distance_only(0.0)
        });
        let accepted: Vec<bool> = (0..7)
            .map(|i| {
                q.try_admit(scan(i), Pose2D::new(i as f32, 0.0, 0.0), i)
                    .is_accepted()
            })
            .collect();
        // First scan always; then the 3rd and 6th seen.
        assert_eq!(accepted, vec![true, false, true, false, false, true, false]);
    }

    #[test]
    fn test_queue_full() {
        let q = queue(AdmissionConfig {
            max_queue_size: 2,
            ..distance_only(0.0)
        });
        for i in 0..2 {
            assert!(q.try_admit(scan(i), Pose2D::new(i as f32, 0.0, 0.0), i).is_accepted());
        }
        assert_eq!(
            q.try_admit(scan(2), Pose2D::new(2.0, 0.0, 0.0), 2),
            Admission::Rejected(RejectionReason::QueueFull)
        );
    }

    #[test]
    fn test_pause_rejects_until_resume_and_keeps_items() {
        let q = queue(distance_only(0.0));
        q.try_admit(scan(0), Pose2D::identity(), 0);
        q.pause();
        for i in 1..4 {
            assert_eq!(
                q.try_admit(scan(i), Pose2D::new(i as f32, 0.0, 0.0), i),
                Admission::Rejected(RejectionReason::Paused)
            );
        }
        assert_eq!(q.len(), 1);
        assert!(q.dequeue_timeout(Duration::from_millis(10)).is_none());

        q.resume();
        assert!(q.dequeue_timeout(Duration::from_millis(10)).is_some());
        assert!(q.try_admit(scan(5), Pose2D::new(5.0, 0.0, 0.0), 5).is_accepted());
    }

    #[test]
    fn test_clear_queue() {
        let q = queue(distance_only(0.0));
        for i in 0..3 {
            q.try_admit(scan(i), Pose2D::new(i as f32, 0.0, 0.0), i);
        }
        assert_eq!(q.clear_queue(), 3);
        assert!(q.is_empty());
        assert_eq!(q.stats().cleared, 3);
    }

    #[test]
    fn test_fifo_order() {
        let q = queue(distance_only(0.0));
        for i in 0..3 {
            q.try_admit(scan(i), Pose2D::new(i as f32, 0.0, 0.0), i);
        }
        let order: Vec<u64> = (0..3)
            .filter_map(|_| q.dequeue_timeout(Duration::from_millis(10)))
            .map(|p| p.scan.timestamp_us)
            .collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_shutdown_wakes_blocked_consumer() {
        let q = Arc::new(queue(distance_only(0.0)));
        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.dequeue())
        };
        thread::sleep(Duration::from_millis(20));
        q.shutdown();
        assert!(consumer.join().unwrap().is_none());
        assert_eq!(
            q.try_admit(scan(0), Pose2D::identity(), 0),
            Admission::Rejected(RejectionReason::ShuttingDown)
        );
    }

    #[test]
    fn test_consumer_wakes_on_admit() {
        let q = Arc::new(queue(distance_only(0.0)));
        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.dequeue().map(|p| p.scan.timestamp_us))
        };
        thread::sleep(Duration::from_millis(20));
        q.try_admit(scan(42), Pose2D::identity(), 42);
        assert_eq!(consumer.join().unwrap(), Some(42));
    }
}
