//! Occupancy map regeneration from the optimized pose graph.
//!
//! The regenerator copies what it needs from the graph under a short read
//! lock, then rasterizes without holding it. Each rebuild yields a fresh
//! immutable [`Snapshot`]; published snapshots are replaced, never edited.

mod regenerator;
mod snapshot;

pub use regenerator::{MapConfig, MapRegenerator};
pub use snapshot::{MapSink, Snapshot};
