use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::types::Point2D;

/// Immutable occupancy grid produced by one rebuild.
///
/// Cells are row-major from the lower-left corner, using ROS values:
/// -1 unknown, 0 free, 100 occupied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Graph revision the snapshot was built from.
    pub revision: u64,
    /// Vertices rasterized.
    pub vertex_count: usize,
    /// Meters per cell.
    pub resolution: f32,
    /// Width in cells.
    pub width: usize,
    /// Height in cells.
    pub height: usize,
    /// World position of the lower-left corner of cell (0, 0).
    pub origin: Point2D,
    /// Cell values.
    pub cells: Vec<i8>,
}

impl Snapshot {
    /// Value of cell (x, y), `None` outside the grid.
    pub fn cell(&self, x: usize, y: usize) -> Option<i8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.cells.get(y * self.width + x).copied()
    }

    /// Value of the cell containing a world point.
    pub fn cell_at(&self, point: Point2D) -> Option<i8> {
        let cx = ((point.x - self.origin.x) / self.resolution).floor();
        let cy = ((point.y - self.origin.y) / self.resolution).floor();
        if cx < 0.0 || cy < 0.0 {
            return None;
        }
        self.cell(cx as usize, cy as usize)
    }

    /// Number of cells with the given value.
    pub fn count(&self, value: i8) -> usize {
        self.cells.iter().filter(|c| **c == value).count()
    }

    /// Mapped area (free + occupied) in square meters.
    pub fn known_area(&self) -> f32 {
        let known = self.cells.len() - self.count(-1);
        known as f32 * self.resolution * self.resolution
    }
}

/// Consumer of published maps. Fire-and-forget.
pub trait MapSink: Send + Sync {
    /// Accept a newly built map.
    fn publish(&self, snapshot: Arc<Snapshot>);
}
