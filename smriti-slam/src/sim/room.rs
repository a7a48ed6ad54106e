//! Wall-segment world for ray casting.

use crate::core::types::Point2D;

/// A set of wall segments.
#[derive(Debug, Clone, Default)]
pub struct Room {
    walls: Vec<(Point2D, Point2D)>,
}

impl Room {
    /// Empty world.
    pub fn new() -> Self {
        Self::default()
    }

    /// Axis-aligned rectangular room with its lower-left corner at the origin.
    pub fn rectangle(width: f32, height: f32) -> Self {
        let mut room = Self::new();
        room.add_polygon(&[
            Point2D::new(0.0, 0.0),
            Point2D::new(width, 0.0),
            Point2D::new(width, height),
            Point2D::new(0.0, height),
        ]);
        room
    }

    /// Add one wall segment.
    pub fn add_wall(&mut self, a: Point2D, b: Point2D) {
        self.walls.push((a, b));
    }

    /// Add a closed polygon (obstacle or outline).
    pub fn add_polygon(&mut self, corners: &[Point2D]) {
        for (i, a) in corners.iter().enumerate() {
            let b = corners[(i + 1) % corners.len()];
            self.add_wall(*a, b);
        }
    }

    /// Axis-aligned box obstacle.
    pub fn add_box(&mut self, min: Point2D, max: Point2D) {
        self.add_polygon(&[
            min,
            Point2D::new(max.x, min.y),
            max,
            Point2D::new(min.x, max.y),
        ]);
    }

    /// Number of wall segments.
    pub fn num_walls(&self) -> usize {
        self.walls.len()
    }

    /// Distance along a ray to the first wall, or `max_range` on a miss.
    pub fn ray_cast(&self, origin: Point2D, angle: f32, max_range: f32) -> f32 {
        let (dx, dy) = (angle.cos(), angle.sin());
        let mut best = max_range;

        for (a, b) in &self.walls {
            let (ex, ey) = (b.x - a.x, b.y - a.y);
            let denom = dx * ey - dy * ex;
            if denom.abs() < 1e-9 {
                continue;
            }
            let (wx, wy) = (a.x - origin.x, a.y - origin.y);
            let t = (wx * ey - wy * ex) / denom;
            let u = (wx * dy - wy * dx) / denom;
            if t > 0.0 && (0.0..=1.0).contains(&u) && t < best {
                best = t;
            }
        }
        best
    }
}
