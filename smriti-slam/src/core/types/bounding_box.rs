//! Axis-aligned bounding boxes for scan footprints.

use serde::{Deserialize, Serialize};

use super::pose::Point2D;

/// Axis-aligned 2D bounding box in the fixed frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox2D {
    /// Lower-left corner.
    pub min: Point2D,
    /// Upper-right corner.
    pub max: Point2D,
}

impl BoundingBox2D {
    /// Create from explicit corners. Corners are reordered if swapped.
    pub fn new(a: Point2D, b: Point2D) -> Self {
        Self {
            min: Point2D::new(a.x.min(b.x), a.y.min(b.y)),
            max: Point2D::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    /// Degenerate box containing a single point.
    pub fn from_point(p: Point2D) -> Self {
        Self { min: p, max: p }
    }

    /// Smallest box containing every point, or `None` for an empty input.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point2D>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bb = Self::from_point(*first);
        for p in iter {
            bb.expand_to_include(p);
        }
        Some(bb)
    }

    /// Grow the box to contain a point.
    pub fn expand_to_include(&mut self, p: &Point2D) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
    }

    /// Width along x (meters).
    #[inline]
    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    /// Height along y (meters).
    #[inline]
    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    /// Enclosed area (m²).
    #[inline]
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Length of the diagonal (meters).
    #[inline]
    pub fn diagonal(&self) -> f32 {
        (self.width() * self.width() + self.height() * self.height()).sqrt()
    }

    /// Center point.
    #[inline]
    pub fn center(&self) -> Point2D {
        Point2D::new(
            0.5 * (self.min.x + self.max.x),
            0.5 * (self.min.y + self.max.y),
        )
    }

    /// Area of the overlap with another box (0 when disjoint).
    pub fn intersection_area(&self, other: &BoundingBox2D) -> f32 {
        let w = self.max.x.min(other.max.x) - self.min.x.max(other.min.x);
        let h = self.max.y.min(other.max.y) - self.min.y.max(other.min.y);
        if w <= 0.0 || h <= 0.0 { 0.0 } else { w * h }
    }

    /// Intersection-over-union with another box, in [0, 1].
    ///
    /// Boxes with zero union area score 0.
    pub fn iou(&self, other: &BoundingBox2D) -> f32 {
        let inter = self.intersection_area(other);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            return 0.0;
        }
        (inter / union).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn bb(x0: f32, y0: f32, x1: f32, y1: f32) -> BoundingBox2D {
        BoundingBox2D::new(Point2D::new(x0, y0), Point2D::new(x1, y1))
    }

    #[test]
    fn test_iou_identical_is_one() {
        let a = bb(0.0, 0.0, 2.0, 3.0);
        assert_relative_eq!(a.iou(&a), 1.0);
    }

    #[test]
    fn test_iou_disjoint_is_zero() {
        let a = bb(0.0, 0.0, 1.0, 1.0);
        let b = bb(2.0, 2.0, 3.0, 3.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_half_overlap() {
        // Overlap 1x2 = 2, union 4 + 4 - 2 = 6
        let a = bb(0.0, 0.0, 2.0, 2.0);
        let b = bb(1.0, 0.0, 3.0, 2.0);
        assert_relative_eq!(a.iou(&b), 2.0 / 6.0, epsilon = 1e-6);
    }

    #[test]
    fn test_iou_symmetric() {
        let boxes = [
            bb(0.0, 0.0, 2.0, 2.0),
            bb(1.5, -0.5, 4.0, 1.0),
            bb(-3.0, -3.0, 0.5, 0.5),
            bb(0.2, 0.2, 0.4, 0.9),
        ];
        for a in &boxes {
            for b in &boxes {
                assert_eq!(a.iou(b), b.iou(a));
            }
        }
    }

    #[test]
    fn test_degenerate_box_scores_zero() {
        let p = BoundingBox2D::from_point(Point2D::new(1.0, 1.0));
        assert_eq!(p.iou(&p), 0.0);
    }

    #[test]
    fn test_from_points_and_diagonal() {
        let pts = [
            Point2D::new(0.0, 0.0),
            Point2D::new(3.0, -1.0),
            Point2D::new(1.0, 3.0),
        ];
        let b = BoundingBox2D::from_points(pts.iter()).unwrap();
        assert_relative_eq!(b.width(), 3.0);
        assert_relative_eq!(b.height(), 4.0);
        assert_relative_eq!(b.diagonal(), 5.0);
        assert!(BoundingBox2D::from_points(std::iter::empty()).is_none());
    }
}
