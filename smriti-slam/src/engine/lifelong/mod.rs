//! Lifelong node depreciation.
//!
//! Keeps the pose graph bounded during unbounded operation. Every newly
//! inserted vertex is compared against the vertices around it; overlap
//! between scan footprints decays the retention score of the older
//! vertices, and vertices whose score falls below the retention threshold
//! are evicted.
//!
//! ```text
//!   new vertex ──▶ SpatialIndex.query(pose, bbox diagonal)
//!                        │
//!                        ▼
//!            IoU per candidate, largest first,
//!            capped so the sum never exceeds 1.0
//!                        │
//!          ┌─────────────┴──────────────┐
//!          ▼                            ▼
//!   novelty < threshold          novelty ≥ threshold
//!   evict the new vertex         decay candidates, evict
//!                                those below threshold
//! ```

mod eviction;
mod pruner;
mod scoring;

pub use eviction::{Eviction, evict_with_transfer};
pub use pruner::{LifelongConfig, LifelongPruner, PruneReport};
pub use scoring::{OverlapScore, decayed_overlaps, retention_verdict};
