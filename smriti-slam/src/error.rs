//! Error types for SmritiSLAM

use thiserror::Error;

use crate::engine::graph::{AddScanRejection, SolverError, VertexId};
use crate::ingestion::{RejectionReason, TransformError};
use crate::io::PersistenceError;

/// Result type alias
pub type Result<T> = std::result::Result<T, SlamError>;

/// Top-level error taxonomy.
#[derive(Debug, Error)]
pub enum SlamError {
    /// Admission control declined a scan.
    #[error("scan not admitted: {0}")]
    AdmissionRejected(RejectionReason),

    /// No pose for the scan's frame at its timestamp.
    #[error("transform unavailable: {0}")]
    TransformUnavailable(#[from] TransformError),

    /// No calibrated descriptor for a laser frame.
    #[error("unknown laser geometry: {0}")]
    UnknownLaserGeometry(String),

    /// The solver failed; the graph keeps its last good poses.
    #[error("solver failure: {0}")]
    SolverFailure(#[from] SolverError),

    /// Startup configuration cannot be used.
    #[error("configuration error: {0}")]
    ConfigurationFatal(String),

    /// A command referenced a vertex that does not exist.
    #[error("unknown vertex {0}")]
    UnknownVertex(VertexId),

    /// Reading or writing a file failed.
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// A command cannot be honored in the current mode.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// A worker thread could not be started.
    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// A worker thread panicked.
    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),
}

impl From<AddScanRejection> for SlamError {
    fn from(rejection: AddScanRejection) -> Self {
        match rejection {
            AddScanRejection::UnknownLaserGeometry(frame)
            | AddScanRejection::UncalibratedLaser(frame) => Self::UnknownLaserGeometry(frame),
            AddScanRejection::DuplicatePose => {
                Self::AdmissionRejected(RejectionReason::BelowDistanceThreshold)
            }
        }
    }
}

impl From<RejectionReason> for SlamError {
    fn from(reason: RejectionReason) -> Self {
        Self::AdmissionRejected(reason)
    }
}
