//! Closed polyline the simulated robot drives around.

use crate::core::types::{Point2D, Pose2D};

/// A closed loop through waypoints, driven at constant speed.
#[derive(Debug, Clone)]
pub struct LoopRoute {
    waypoints: Vec<Point2D>,
    length: f32,
}

impl LoopRoute {
    /// Loop through `waypoints` and back to the first one.
    ///
    /// Returns `None` with fewer than two distinct waypoints.
    pub fn new(waypoints: Vec<Point2D>) -> Option<Self> {
        if waypoints.len() < 2 {
            return None;
        }
        let length = (0..waypoints.len())
            .map(|i| waypoints[i].distance(&waypoints[(i + 1) % waypoints.len()]))
            .sum::<f32>();
        (length > 0.0).then_some(Self { waypoints, length })
    }

    /// Rectangular loop inset `margin` from the walls of a
    /// `width` x `height` room.
    pub fn rectangle(width: f32, height: f32, margin: f32) -> Option<Self> {
        Self::new(vec![
            Point2D::new(margin, margin),
            Point2D::new(width - margin, margin),
            Point2D::new(width - margin, height - margin),
            Point2D::new(margin, height - margin),
        ])
    }

    /// Length of one lap.
    pub fn length(&self) -> f32 {
        self.length
    }

    /// Pose after driving `distance` meters from the first waypoint.
    ///
    /// Heading follows the current segment.
    pub fn pose_at(&self, distance: f32) -> Pose2D {
        let mut remaining = distance.rem_euclid(self.length);
        let n = self.waypoints.len();
        for i in 0..n {
            let a = self.waypoints[i];
            let b = self.waypoints[(i + 1) % n];
            let segment = a.distance(&b);
            if remaining <= segment || i == n - 1 {
                let t = if segment > 0.0 { (remaining / segment).min(1.0) } else { 0.0 };
                let heading = (b.y - a.y).atan2(b.x - a.x);
                return Pose2D::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t, heading);
            }
            remaining -= segment;
        }
        Pose2D::new(self.waypoints[0].x, self.waypoints[0].y, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rectangle_route() {
        let route = LoopRoute::rectangle(6.0, 4.0, 1.0).unwrap();
        assert_relative_eq!(route.length(), 12.0);

        let start = route.pose_at(0.0);
        assert_relative_eq!(start.x, 1.0);
        assert_relative_eq!(start.y, 1.0);

        let side = route.pose_at(5.0);
        assert_relative_eq!(side.x, 5.0, epsilon = 1e-5);
        assert_relative_eq!(side.y, 2.0, epsilon = 1e-5);
        assert_relative_eq!(side.theta, std::f32::consts::FRAC_PI_2, epsilon = 1e-5);

        let wrapped = route.pose_at(12.5);
        assert_relative_eq!(wrapped.x, 1.5, epsilon = 1e-5);
        assert_relative_eq!(wrapped.y, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_degenerate_route_rejected() {
        assert!(LoopRoute::new(vec![Point2D::new(1.0, 1.0)]).is_none());
        assert!(LoopRoute::new(vec![Point2D::new(1.0, 1.0), Point2D::new(1.0, 1.0)]).is_none());
    }
}
