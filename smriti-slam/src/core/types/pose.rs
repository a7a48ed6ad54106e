//! Pose and point types for 2D SLAM.

use serde::{Deserialize, Serialize};

/// A 2D point in meters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2D {
    /// X coordinate in meters
    pub x: f32,
    /// Y coordinate in meters
    pub y: f32,
}

impl Point2D {
    /// Create a new point.
    #[inline]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Squared distance to another point (avoids sqrt).
    #[inline]
    pub fn distance_squared(&self, other: &Point2D) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Distance to another point.
    #[inline]
    pub fn distance(&self, other: &Point2D) -> f32 {
        self.distance_squared(other).sqrt()
    }
}

/// Robot pose in 2D space.
///
/// Represents position (x, y) in meters and heading (theta) in radians.
/// Theta is normalized to [-π, π].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose2D {
    /// X position in meters
    pub x: f32,
    /// Y position in meters
    pub y: f32,
    /// Heading in radians, normalized to [-π, π]
    pub theta: f32,
}

impl Pose2D {
    /// Create a new pose with theta normalized to [-π, π].
    #[inline]
    pub fn new(x: f32, y: f32, theta: f32) -> Self {
        Self {
            x,
            y,
            theta: crate::core::math::normalize_angle(theta),
        }
    }

    /// Identity pose at origin with zero heading.
    #[inline]
    pub fn identity() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            theta: 0.0,
        }
    }

    /// Position component as a point.
    #[inline]
    pub fn position(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }

    /// Compose two poses: self ⊕ other
    ///
    /// ```text
    /// C = A ⊕ B:
    ///   C.x = A.x + B.x * cos(A.θ) - B.y * sin(A.θ)
    ///   C.y = A.y + B.x * sin(A.θ) + B.y * cos(A.θ)
    ///   C.θ = normalize(A.θ + B.θ)
    /// ```
    #[inline]
    pub fn compose(&self, other: &Pose2D) -> Pose2D {
        let (sin_t, cos_t) = self.theta.sin_cos();
        Pose2D::new(
            self.x + other.x * cos_t - other.y * sin_t,
            self.y + other.x * sin_t + other.y * cos_t,
            self.theta + other.theta,
        )
    }

    /// Inverse of this pose.
    #[inline]
    pub fn inverse(&self) -> Pose2D {
        let (sin_t, cos_t) = self.theta.sin_cos();
        Pose2D::new(
            -self.x * cos_t - self.y * sin_t,
            self.x * sin_t - self.y * cos_t,
            -self.theta,
        )
    }

    /// Relative transform taking `self` to `other`: self⁻¹ ⊕ other.
    #[inline]
    pub fn between(&self, other: &Pose2D) -> Pose2D {
        self.inverse().compose(other)
    }

    /// Transform a point from local frame to global frame.
    #[inline]
    pub fn transform_point(&self, point: &Point2D) -> Point2D {
        let (sin_t, cos_t) = self.theta.sin_cos();
        Point2D::new(
            self.x + point.x * cos_t - point.y * sin_t,
            self.y + point.x * sin_t + point.y * cos_t,
        )
    }

    /// Euclidean distance between the positions of two poses.
    #[inline]
    pub fn distance(&self, other: &Pose2D) -> f32 {
        self.position().distance(&other.position())
    }

    /// Interpolate between two timestamped poses.
    ///
    /// Returns `None` if `target_time_us` is outside [start, end]. Position
    /// is interpolated linearly, heading along the shortest arc.
    pub fn interpolate(
        start: &super::Timestamped<Pose2D>,
        end: &super::Timestamped<Pose2D>,
        target_time_us: u64,
    ) -> Option<Pose2D> {
        if target_time_us < start.timestamp_us || target_time_us > end.timestamp_us {
            return None;
        }
        if start.timestamp_us == end.timestamp_us {
            return Some(start.data);
        }

        let t = (target_time_us - start.timestamp_us) as f32
            / (end.timestamp_us - start.timestamp_us) as f32;

        Some(Pose2D {
            x: start.data.x + t * (end.data.x - start.data.x),
            y: start.data.y + t * (end.data.y - start.data.y),
            theta: crate::core::math::angle_lerp(start.data.theta, end.data.theta, t),
        })
    }

    /// Absolute heading change between two poses (radians, in [0, π]).
    #[inline]
    pub fn heading_change(&self, other: &Pose2D) -> f32 {
        crate::core::math::angle_diff(self.theta, other.theta).abs()
    }
}

impl Default for Pose2D {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_point2d_distance() {
        let a = Point2D::new(0.0, 0.0);
        let b = Point2D::new(3.0, 4.0);
        assert_relative_eq!(a.distance(&b), 5.0);
        assert_relative_eq!(a.distance_squared(&b), 25.0);
    }

    #[test]
    fn test_pose_compose_identity() {
        let p = Pose2D::new(1.0, 2.0, 0.5);
        let result = p.compose(&Pose2D::identity());
        assert_relative_eq!(result.x, p.x);
        assert_relative_eq!(result.y, p.y);
        assert_relative_eq!(result.theta, p.theta);
    }

    #[test]
    fn test_pose_compose_rotated() {
        let a = Pose2D::new(1.0, 0.0, FRAC_PI_2);
        let b = Pose2D::new(1.0, 0.0, 0.0);
        let c = a.compose(&b);
        assert_relative_eq!(c.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(c.y, 1.0, epsilon = 1e-6);
        assert_relative_eq!(c.theta, FRAC_PI_2, epsilon = 1e-6);
    }

    #[test]
    fn test_between_recovers_other() {
        let a = Pose2D::new(0.5, -1.0, 0.3);
        let b = Pose2D::new(2.0, 1.5, -1.2);
        let rel = a.between(&b);
        let back = a.compose(&rel);
        assert_relative_eq!(back.x, b.x, epsilon = 1e-5);
        assert_relative_eq!(back.y, b.y, epsilon = 1e-5);
        assert_relative_eq!(back.theta, b.theta, epsilon = 1e-5);
    }

    #[test]
    fn test_heading_change_wraps() {
        let a = Pose2D::new(0.0, 0.0, 3.1);
        let b = Pose2D::new(0.0, 0.0, -3.1);
        assert!(a.heading_change(&b) < 0.1);
    }

    #[test]
    fn test_pose_interpolation() {
        use crate::core::types::Timestamped;
        let start = Timestamped::new(Pose2D::identity(), 0);
        let end = Timestamped::new(Pose2D::new(2.0, 0.0, 1.0), 1000);

        let mid = Pose2D::interpolate(&start, &end, 500).unwrap();
        assert_relative_eq!(mid.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(mid.theta, 0.5, epsilon = 1e-6);
        assert!(Pose2D::interpolate(&start, &end, 1001).is_none());
    }
}
