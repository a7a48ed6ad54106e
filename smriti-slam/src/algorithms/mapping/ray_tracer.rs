//! Bresenham ray tracing into the hit/pass counting grid.
//!
//! Every cell between the sensor and a return is counted as passed; the
//! cell containing the return is counted as both passed and hit.

use super::HitCountGrid;

/// Ray tracer feeding a [`HitCountGrid`].
#[derive(Debug, Clone)]
pub struct RayTracer {
    /// Maximum ray length in cells.
    max_ray_length: usize,
}

impl Default for RayTracer {
    fn default() -> Self {
        Self {
            max_ray_length: 2000, // 100m at 5cm resolution
        }
    }
}

impl RayTracer {
    /// Create a ray tracer with custom max length.
    pub fn new(max_ray_length: usize) -> Self {
        Self { max_ray_length }
    }

    /// Trace a ray from start to end in world coordinates.
    ///
    /// If `mark_endpoint` is false the endpoint cell is left untouched
    /// (max-range readings carry free space but no obstacle).
    pub fn trace_ray(
        &self,
        grid: &mut HitCountGrid,
        start_x: f32,
        start_y: f32,
        end_x: f32,
        end_y: f32,
        mark_endpoint: bool,
    ) {
        let (sx, sy) = grid.world_to_cell_signed(start_x, start_y);
        let (ex, ey) = grid.world_to_cell_signed(end_x, end_y);
        self.bresenham(grid, sx, sy, ex, ey, mark_endpoint);
    }

    fn bresenham(
        &self,
        grid: &mut HitCountGrid,
        x0: i32,
        y0: i32,
        x1: i32,
        y1: i32,
        mark_endpoint: bool,
    ) {
        let dx = (x1 - x0).abs();
        let dy = (y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };

        let mut x = x0;
        let mut y = y0;
        let mut err = dx - dy;
        let mut steps = 0;

        loop {
            if x == x1 && y == y1 {
                if mark_endpoint {
                    grid.update_cell_signed(x, y, true);
                }
                break;
            }

            grid.update_cell_signed(x, y, false);

            steps += 1;
            if steps >= self.max_ray_length {
                break;
            }

            let e2 = 2 * err;
            if e2 > -dy {
                err -= dy;
                x += sx;
            }
            if e2 < dx {
                err += dx;
                y += sy;
            }
        }
    }

    /// Trace a ray from start along `angle` for `distance` meters.
    pub fn trace_ray_polar(
        &self,
        grid: &mut HitCountGrid,
        start_x: f32,
        start_y: f32,
        angle: f32,
        distance: f32,
        mark_endpoint: bool,
    ) {
        let (sin_a, cos_a) = angle.sin_cos();
        self.trace_ray(
            grid,
            start_x,
            start_y,
            start_x + distance * cos_a,
            start_y + distance * sin_a,
            mark_endpoint,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{BoundingBox2D, Point2D};

    fn grid() -> HitCountGrid {
        let bounds = BoundingBox2D::new(Point2D::new(0.0, 0.0), Point2D::new(2.0, 2.0));
        HitCountGrid::covering(&bounds, 0.1, 0.0)
    }

    #[test]
    fn test_horizontal_ray() {
        let mut g = grid();
        RayTracer::default().trace_ray(&mut g, 0.05, 0.05, 1.05, 0.05, true);

        for x in 0..10 {
            assert_eq!(g.counts(x, 0), Some((0, 1)), "cell {x} should be passed");
        }
        assert_eq!(g.counts(10, 0), Some((1, 1)));
        assert_eq!(g.counts(11, 0), Some((0, 0)));
    }

    #[test]
    fn test_endpoint_not_marked_for_miss() {
        let mut g = grid();
        RayTracer::default().trace_ray(&mut g, 0.05, 0.05, 0.55, 0.05, false);
        assert_eq!(g.counts(5, 0), Some((0, 0)));
        assert_eq!(g.counts(4, 0), Some((0, 1)));
    }

    #[test]
    fn test_diagonal_polar_ray_reaches_endpoint() {
        let mut g = grid();
        RayTracer::default().trace_ray_polar(
            &mut g,
            0.05,
            0.05,
            std::f32::consts::FRAC_PI_4,
            1.0,
            true,
        );
        let (ex, ey) = g.world_to_cell_signed(0.05 + 0.7071, 0.05 + 0.7071);
        assert_eq!(g.counts(ex, ey).map(|c| c.0), Some(1));
    }

    #[test]
    fn test_max_length_caps_traversal() {
        let mut g = grid();
        RayTracer::new(3).trace_ray(&mut g, 0.05, 0.05, 1.95, 0.05, true);
        assert_eq!(g.counts(2, 0), Some((0, 1)));
        assert_eq!(g.counts(3, 0), Some((0, 0)));
    }
}
