//! Point-to-Point Iterative Closest Point (ICP).
//!
//! ```text
//! Input: Source cloud S, Target cloud T, Initial guess T₀
//! Output: Transform T* that aligns S to T
//!
//! 1. For each iteration:
//!    a. Transform S by the current estimate
//!    b. Find nearest neighbor in T for each point (k-d tree)
//!    c. Solve the closed-form 2D rigid alignment of the pairs
//!    d. Stop when the change between estimates is below threshold
//! ```

use kiddo::{KdTree, SquaredEuclidean};

use super::{ScanMatchResult, ScanMatcher};
use crate::core::types::{Point2D, PointCloud2D, Pose2D};

/// Configuration for Point-to-Point ICP.
#[derive(Debug, Clone)]
pub struct IcpConfig {
    /// Maximum number of iterations.
    pub max_iterations: u32,

    /// Convergence threshold for translation (meters).
    pub translation_epsilon: f32,

    /// Convergence threshold for rotation (radians).
    pub rotation_epsilon: f32,

    /// Maximum correspondence distance (meters).
    ///
    /// Point pairs farther than this are rejected as outliers.
    pub max_correspondence_distance: f32,

    /// Minimum number of valid correspondences required.
    pub min_correspondences: usize,

    /// Fraction of the worst correspondences discarded each iteration.
    pub outlier_ratio: f32,

    /// MSE above which a non-converged result is reported as failed.
    pub max_final_mse: f32,
}

impl Default for IcpConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            translation_epsilon: 0.001,       // 1mm
            rotation_epsilon: 0.001,          // ~0.06°
            max_correspondence_distance: 0.5, // 50cm
            min_correspondences: 10,
            outlier_ratio: 0.1,
            max_final_mse: 0.01,
        }
    }
}

/// Point-to-Point ICP scan matcher.
///
/// Suitable for small to medium initial pose errors (<20cm, <10°), which is
/// what odometry-seeded matching against nearby vertices provides.
#[derive(Debug, Clone)]
pub struct PointToPointIcp {
    config: IcpConfig,
}

impl Default for PointToPointIcp {
    fn default() -> Self {
        Self::new(IcpConfig::default())
    }
}

impl PointToPointIcp {
    /// Create a new ICP matcher with the given configuration.
    pub fn new(config: IcpConfig) -> Self {
        Self { config }
    }

    /// Get the current configuration.
    pub fn config(&self) -> &IcpConfig {
        &self.config
    }

    fn build_kdtree(cloud: &PointCloud2D) -> KdTree<f32, 2> {
        let mut tree: KdTree<f32, 2> = KdTree::new();
        for (i, point) in cloud.points.iter().enumerate() {
            tree.add(&[point.x, point.y], i as u64);
        }
        tree
    }

    /// Returns (source_idx, target_idx, squared_distance) triples.
    fn find_correspondences(
        &self,
        source: &PointCloud2D,
        target_tree: &KdTree<f32, 2>,
        transform: &Pose2D,
    ) -> Vec<(usize, usize, f32)> {
        let max_dist_sq = self.config.max_correspondence_distance.powi(2);
        let mut correspondences = Vec::with_capacity(source.len());

        for (i, point) in source.points.iter().enumerate() {
            let p = transform.transform_point(point);
            let nearest = target_tree.nearest_one::<SquaredEuclidean>(&[p.x, p.y]);
            if nearest.distance <= max_dist_sq {
                correspondences.push((i, nearest.item as usize, nearest.distance));
            }
        }

        if self.config.outlier_ratio > 0.0 && !correspondences.is_empty() {
            correspondences.sort_by(|a, b| a.2.total_cmp(&b.2));
            let keep_count =
                ((1.0 - self.config.outlier_ratio) * correspondences.len() as f32) as usize;
            correspondences.truncate(keep_count.max(self.config.min_correspondences));
        }

        correspondences
    }

    /// Closed-form rigid alignment of the untransformed source points onto
    /// their matched target points. Returns the absolute source→target pose.
    fn compute_transform(
        source: &PointCloud2D,
        target: &PointCloud2D,
        correspondences: &[(usize, usize, f32)],
    ) -> Option<Pose2D> {
        if correspondences.len() < 3 {
            return None;
        }

        let n = correspondences.len() as f32;
        let mut sc = Point2D::default();
        let mut tc = Point2D::default();
        for &(si, ti, _) in correspondences {
            sc.x += source.points[si].x;
            sc.y += source.points[si].y;
            tc.x += target.points[ti].x;
            tc.y += target.points[ti].y;
        }
        sc.x /= n;
        sc.y /= n;
        tc.x /= n;
        tc.y /= n;

        // Σ dot and Σ cross of the centered pairs give the optimal rotation.
        let mut dot = 0.0f32;
        let mut cross = 0.0f32;
        for &(si, ti, _) in correspondences {
            let sx = source.points[si].x - sc.x;
            let sy = source.points[si].y - sc.y;
            let tx = target.points[ti].x - tc.x;
            let ty = target.points[ti].y - tc.y;
            dot += sx * tx + sy * ty;
            cross += sx * ty - sy * tx;
        }

        let theta = cross.atan2(dot);
        let (sin_t, cos_t) = theta.sin_cos();
        Some(Pose2D::new(
            tc.x - (sc.x * cos_t - sc.y * sin_t),
            tc.y - (sc.x * sin_t + sc.y * cos_t),
            theta,
        ))
    }

    fn compute_mse(
        source: &PointCloud2D,
        target: &PointCloud2D,
        correspondences: &[(usize, usize, f32)],
        transform: &Pose2D,
    ) -> f32 {
        if correspondences.is_empty() {
            return f32::MAX;
        }

        let sum_sq: f32 = correspondences
            .iter()
            .map(|&(si, ti, _)| {
                transform
                    .transform_point(&source.points[si])
                    .distance_squared(&target.points[ti])
            })
            .sum();

        sum_sq / correspondences.len() as f32
    }

    /// Score of 1.0 at mse=0, ~0.37 at 10cm RMSE.
    fn mse_to_score(mse: f32) -> f32 {
        (-mse * 100.0).exp()
    }
}

impl ScanMatcher for PointToPointIcp {
    fn match_scans(
        &self,
        source: &PointCloud2D,
        target: &PointCloud2D,
        initial_guess: &Pose2D,
    ) -> ScanMatchResult {
        if source.is_empty() || target.is_empty() {
            return ScanMatchResult::failed();
        }

        let target_tree = Self::build_kdtree(target);

        let mut current = *initial_guess;
        let mut iterations = 0u32;
        let mut last_mse = f32::MAX;

        for iter in 0..self.config.max_iterations {
            iterations = iter + 1;

            let correspondences = self.find_correspondences(source, &target_tree, &current);
            if correspondences.len() < self.config.min_correspondences {
                return ScanMatchResult::failed();
            }

            let Some(next) = Self::compute_transform(source, target, &correspondences) else {
                return ScanMatchResult::failed();
            };
            let delta = current.between(&next);
            current = next;

            let mse = Self::compute_mse(source, target, &correspondences, &current);

            let translation_change = (delta.x * delta.x + delta.y * delta.y).sqrt();
            if translation_change < self.config.translation_epsilon
                && delta.theta.abs() < self.config.rotation_epsilon
            {
                return ScanMatchResult::success(current, Self::mse_to_score(mse), iterations, mse);
            }

            // Diverging
            if mse > last_mse * 1.1 {
                break;
            }
            last_mse = mse;
        }

        let correspondences = self.find_correspondences(source, &target_tree, &current);
        let final_mse = Self::compute_mse(source, target, &correspondences, &current);
        let score = Self::mse_to_score(final_mse);

        if correspondences.len() >= self.config.min_correspondences
            && final_mse < self.config.max_final_mse
        {
            ScanMatchResult::success(current, score, iterations, final_mse)
        } else {
            ScanMatchResult {
                transform: current,
                score,
                converged: false,
                iterations,
                mse: final_mse,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Two slightly skewed walls meeting at a corner. The skew keeps
    /// coordinates distinct along both axes.
    fn corner_cloud(n: usize, length: f32) -> PointCloud2D {
        let mut cloud = PointCloud2D::with_capacity(2 * n);
        for i in 0..n {
            let t = (i as f32 / (n - 1) as f32) * length;
            cloud.push(Point2D::new(t, 0.03 * t + 0.001 * i as f32));
        }
        for i in 1..n {
            let t = (i as f32 / (n - 1) as f32) * length;
            cloud.push(Point2D::new(-0.05 * t - 0.0013 * i as f32, t));
        }
        cloud
    }

    #[test]
    fn test_identity_transform() {
        let cloud = corner_cloud(20, 1.0);
        let icp = PointToPointIcp::default();

        let result = icp.match_scans(&cloud, &cloud, &Pose2D::identity());

        assert!(result.converged);
        assert_relative_eq!(result.transform.x, 0.0, epsilon = 0.01);
        assert_relative_eq!(result.transform.y, 0.0, epsilon = 0.01);
        assert_relative_eq!(result.transform.theta, 0.0, epsilon = 0.01);
        assert!(result.score > 0.9);
    }

    #[test]
    fn test_small_translation() {
        let source = corner_cloud(50, 2.0);
        let target = source.transform(&Pose2D::new(0.1, 0.05, 0.0));

        let result = PointToPointIcp::default().match_scans(&source, &target, &Pose2D::identity());

        assert!(result.converged, "ICP should converge");
        assert_relative_eq!(result.transform.x, 0.1, epsilon = 0.02);
        assert_relative_eq!(result.transform.y, 0.05, epsilon = 0.02);
    }

    #[test]
    fn test_combined_transform_with_guess() {
        let source = corner_cloud(50, 2.0);
        let truth = Pose2D::new(0.3, 0.2, 0.15);
        let target = source.transform(&truth);

        let result = PointToPointIcp::default().match_scans(
            &source,
            &target,
            &Pose2D::new(0.25, 0.15, 0.1),
        );

        assert!(result.converged);
        assert_relative_eq!(result.transform.x, 0.3, epsilon = 0.03);
        assert_relative_eq!(result.transform.y, 0.2, epsilon = 0.03);
        assert_relative_eq!(result.transform.theta, 0.15, epsilon = 0.02);
    }

    #[test]
    fn test_empty_clouds() {
        let empty = PointCloud2D::new();
        let cloud = corner_cloud(10, 1.0);
        let icp = PointToPointIcp::default();

        assert!(!icp.match_scans(&empty, &cloud, &Pose2D::identity()).converged);
        assert!(!icp.match_scans(&cloud, &empty, &Pose2D::identity()).converged);
    }

    #[test]
    fn test_too_few_correspondences_fails() {
        let source = corner_cloud(20, 1.0);
        let far = source.transform(&Pose2D::new(10.0, 10.0, 0.0));

        let result = PointToPointIcp::default().match_scans(&source, &far, &Pose2D::identity());
        assert!(!result.converged);
    }
}
