//! Scan matching.
//!
//! Aligns two laser scans to estimate the relative pose between their
//! capture frames. The pose graph manager uses the result to refine a
//! ScanMatch edge and derive its weight from the match score.
//!
//! # Example
//!
//! ```ignore
//! use smriti_slam::algorithms::matching::{IcpConfig, PointToPointIcp, ScanMatcher};
//!
//! let icp = PointToPointIcp::new(IcpConfig::default());
//! let result = icp.match_scans(&source, &target, &initial_guess);
//! if result.converged {
//!     println!("Transform: {:?}", result.transform);
//! }
//! ```

mod icp;

pub use icp::{IcpConfig, PointToPointIcp};

use crate::core::types::{PointCloud2D, Pose2D};

/// Result of a scan matching operation.
#[derive(Debug, Clone)]
pub struct ScanMatchResult {
    /// Estimated transform from source frame to target frame.
    pub transform: Pose2D,

    /// Match quality score (0.0 = bad, 1.0 = perfect).
    pub score: f32,

    /// Whether the algorithm converged successfully.
    pub converged: bool,

    /// Number of iterations performed.
    pub iterations: u32,

    /// Mean squared error of final correspondences.
    pub mse: f32,
}

impl Default for ScanMatchResult {
    fn default() -> Self {
        Self {
            transform: Pose2D::identity(),
            score: 0.0,
            converged: false,
            iterations: 0,
            mse: f32::MAX,
        }
    }
}

impl ScanMatchResult {
    /// Create a failed result with identity transform.
    pub fn failed() -> Self {
        Self::default()
    }

    /// Create a successful result.
    pub fn success(transform: Pose2D, score: f32, iterations: u32, mse: f32) -> Self {
        Self {
            transform,
            score,
            converged: true,
            iterations,
            mse,
        }
    }
}

/// Trait for scan matching algorithms.
///
/// `Send + Sync` so a matcher can live inside the pose graph manager that is
/// shared with the ingestion thread.
pub trait ScanMatcher: Send + Sync {
    /// Align source point cloud to target point cloud.
    ///
    /// # Arguments
    ///
    /// * `source` - The point cloud to be transformed
    /// * `target` - The reference point cloud
    /// * `initial_guess` - Initial transform estimate (source frame → target frame)
    fn match_scans(
        &self,
        source: &PointCloud2D,
        target: &PointCloud2D,
        initial_guess: &Pose2D,
    ) -> ScanMatchResult;
}
