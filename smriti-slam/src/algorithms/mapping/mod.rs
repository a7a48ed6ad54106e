//! Grid mapping primitives.
//!
//! - [`HitCountGrid`]: per-cell hit/pass counters over a fixed extent
//! - [`RayTracer`]: Bresenham traversal that feeds the counters
//!
//! Counting (rather than log-odds) lets the map be rebuilt from scratch
//! after every optimization: the result depends only on the current set of
//! poses and scans, not on the order updates arrived in.

mod hit_grid;
mod ray_tracer;

pub use hit_grid::{CellState, HitCountGrid};
pub use ray_tracer::RayTracer;
