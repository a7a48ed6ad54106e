//! Scan ingestion: transform lookup, admission control and the queue
//! between sensor callbacks and the single processing thread.
//!
//! ```text
//! sensor callback ─▶ SensorFrontend ─▶ TransformProvider (pose at capture)
//!                          │
//!                          ▼
//!                     ScanQueue::try_admit ─▶ FIFO ─▶ ScanQueue::dequeue
//!                                                        (ingestion thread)
//! ```

mod frontend;
mod queue;

pub use frontend::{OdometryBuffer, SensorFrontend, TransformError, TransformProvider};
pub use queue::{Admission, AdmissionConfig, QueueStats, RejectionReason, ScanQueue};
