//! Mathematical primitives for 2D SLAM operations.
//!
//! Functions for angle normalization and angular arithmetic.

use std::f32::consts::PI;

/// Normalize angle to [-π, π].
///
/// # Example
/// ```
/// use smriti_slam::core::math::normalize_angle;
/// use std::f32::consts::PI;
///
/// assert!((normalize_angle(3.0 * PI) - PI).abs() < 1e-6);
/// assert!((normalize_angle(-3.0 * PI) - (-PI)).abs() < 1e-6);
/// ```
#[inline]
pub fn normalize_angle(angle: f32) -> f32 {
    let mut a = angle % (2.0 * PI);
    if a > PI {
        a -= 2.0 * PI;
    } else if a < -PI {
        a += 2.0 * PI;
    }
    a
}

/// Normalize angle to [-π, π] in double precision.
///
/// Used by the optimizer, which accumulates its linear system in f64.
#[inline]
pub fn normalize_angle_f64(angle: f64) -> f64 {
    use std::f64::consts::PI;
    let mut a = angle % (2.0 * PI);
    if a > PI {
        a -= 2.0 * PI;
    } else if a < -PI {
        a += 2.0 * PI;
    }
    a
}

/// Shortest angular difference from angle `a` to angle `b`.
///
/// Returns the signed angle you need to add to `a` to reach `b`,
/// taking the shortest path around the circle.
///
/// # Example
/// ```
/// use smriti_slam::core::math::angle_diff;
/// use std::f32::consts::PI;
///
/// let diff = angle_diff(PI - 0.1, -PI + 0.1);
/// assert!((diff - 0.2).abs() < 1e-5);
/// ```
#[inline]
pub fn angle_diff(a: f32, b: f32) -> f32 {
    normalize_angle(b - a)
}

/// Interpolate between two angles along the shortest arc.
///
/// `t = 0` returns `a`, `t = 1` returns `b`.
#[inline]
pub fn angle_lerp(a: f32, b: f32, t: f32) -> f32 {
    normalize_angle(a + angle_diff(a, b) * t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_normalize_angle_zero() {
        assert_relative_eq!(normalize_angle(0.0), 0.0);
    }

    #[test]
    fn test_normalize_angle_wrap() {
        assert_relative_eq!(normalize_angle(2.0 * PI), 0.0, epsilon = 1e-6);
        assert_relative_eq!(normalize_angle(3.0 * PI), PI, epsilon = 1e-6);
        assert_relative_eq!(normalize_angle(-2.5 * PI), -0.5 * PI, epsilon = 1e-6);
    }

    #[test]
    fn test_normalize_angle_f64_matches_f32() {
        for &a in &[0.0f32, 1.0, -4.0, 7.5, -12.25] {
            assert_relative_eq!(
                normalize_angle_f64(a as f64) as f32,
                normalize_angle(a),
                epsilon = 1e-5
            );
        }
    }

    #[test]
    fn test_angle_diff_crosses_boundary() {
        assert_relative_eq!(angle_diff(0.0, PI / 2.0), PI / 2.0, epsilon = 1e-6);
        assert_relative_eq!(angle_diff(-PI + 0.1, PI - 0.1), -0.2, epsilon = 1e-5);
    }

    #[test]
    fn test_angle_lerp_wraps_shortest_path() {
        assert_relative_eq!(angle_lerp(0.0, 1.0, 0.5), 0.5, epsilon = 1e-6);
        let mid = angle_lerp(PI - 0.1, -PI + 0.1, 0.5);
        assert_relative_eq!(mid.abs(), PI, epsilon = 1e-5);
    }
}
