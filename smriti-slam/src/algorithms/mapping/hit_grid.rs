//! Hit/pass counting grid.

use crate::core::types::BoundingBox2D;

/// Classified cell state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    /// Never crossed by a ray often enough to decide
    Unknown,
    /// Crossed but rarely terminated a ray
    Free,
    /// Terminated a large enough share of the rays crossing it
    Occupied,
}

impl CellState {
    /// ROS `OccupancyGrid` cell value (-1 unknown, 0 free, 100 occupied).
    pub fn as_i8(self) -> i8 {
        match self {
            CellState::Unknown => -1,
            CellState::Free => 0,
            CellState::Occupied => 100,
        }
    }
}

/// Fixed-extent grid of hit and pass counters.
///
/// Row-major storage: index = y * width + x. Cell (0, 0) has its lower-left
/// corner at the origin.
#[derive(Debug, Clone)]
pub struct HitCountGrid {
    resolution: f32,
    width: usize,
    height: usize,
    origin_x: f32,
    origin_y: f32,
    hits: Vec<u32>,
    passes: Vec<u32>,
}

impl HitCountGrid {
    /// Create a grid covering `bounds` plus `margin` meters on every side.
    pub fn covering(bounds: &BoundingBox2D, resolution: f32, margin: f32) -> Self {
        let origin_x = bounds.min.x - margin;
        let origin_y = bounds.min.y - margin;
        let width = ((bounds.width() + 2.0 * margin) / resolution).ceil().max(1.0) as usize;
        let height = ((bounds.height() + 2.0 * margin) / resolution).ceil().max(1.0) as usize;

        Self {
            resolution,
            width,
            height,
            origin_x,
            origin_y,
            hits: vec![0; width * height],
            passes: vec![0; width * height],
        }
    }

    /// Grid width in cells.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Grid height in cells.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Meters per cell.
    pub fn resolution(&self) -> f32 {
        self.resolution
    }

    /// World coordinates of the lower-left corner of cell (0, 0).
    pub fn origin(&self) -> (f32, f32) {
        (self.origin_x, self.origin_y)
    }

    /// Convert world coordinates to (possibly out-of-range) cell indices.
    #[inline]
    pub fn world_to_cell_signed(&self, x: f32, y: f32) -> (i32, i32) {
        (
            ((x - self.origin_x) / self.resolution).floor() as i32,
            ((y - self.origin_y) / self.resolution).floor() as i32,
        )
    }

    #[inline]
    fn index(&self, cx: i32, cy: i32) -> Option<usize> {
        if cx < 0 || cy < 0 || cx as usize >= self.width || cy as usize >= self.height {
            return None;
        }
        Some(cy as usize * self.width + cx as usize)
    }

    /// Record a ray crossing a cell, and optionally terminating in it.
    ///
    /// Out-of-range cells are ignored.
    #[inline]
    pub fn update_cell_signed(&mut self, cx: i32, cy: i32, hit: bool) {
        if let Some(i) = self.index(cx, cy) {
            self.passes[i] += 1;
            if hit {
                self.hits[i] += 1;
            }
        }
    }

    /// (hits, passes) of a cell, or `None` outside the grid.
    pub fn counts(&self, cx: i32, cy: i32) -> Option<(u32, u32)> {
        self.index(cx, cy).map(|i| (self.hits[i], self.passes[i]))
    }

    /// Classify one cell.
    ///
    /// Occupied when at least `min_pass_through` rays crossed it and the
    /// hit ratio exceeds `occupied_threshold`.
    pub fn classify(
        &self,
        cx: i32,
        cy: i32,
        min_pass_through: u32,
        occupied_threshold: f32,
    ) -> CellState {
        match self.counts(cx, cy) {
            Some((hits, passes)) => Self::classify_counts(hits, passes, min_pass_through, occupied_threshold),
            None => CellState::Unknown,
        }
    }

    fn classify_counts(hits: u32, passes: u32, min_pass_through: u32, occupied_threshold: f32) -> CellState {
        if passes == 0 || passes < min_pass_through {
            return CellState::Unknown;
        }
        if hits as f32 / passes as f32 > occupied_threshold {
            CellState::Occupied
        } else {
            CellState::Free
        }
    }

    /// Classify every cell into ROS cell values, row-major.
    pub fn to_cells(&self, min_pass_through: u32, occupied_threshold: f32) -> Vec<i8> {
        self.hits
            .iter()
            .zip(&self.passes)
            .map(|(&h, &p)| Self::classify_counts(h, p, min_pass_through, occupied_threshold).as_i8())
            .collect()
    }
}
