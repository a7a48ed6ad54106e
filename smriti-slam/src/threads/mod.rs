//! Thread management for the SLAM daemon.
//!
//! - `IngestionThread`: dequeues admitted scans, owns the pose-graph manager
//!   and answers operator commands
//! - `MapPublisherThread`: periodic map regeneration for the map sinks
//!
//! Producers (sensor callbacks) run on the caller's threads and only touch
//! the scan queue.

mod ingestion_thread;
mod map_publisher;

pub use ingestion_thread::{IngestionThread, IngestionWorker};
pub use map_publisher::MapPublisherThread;
