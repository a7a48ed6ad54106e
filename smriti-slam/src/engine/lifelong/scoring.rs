//! Overlap scoring between scan footprints.

use crate::core::types::BoundingBox2D;
use crate::engine::graph::{RetentionState, VertexId};

/// Overlap of one candidate with the vertex under evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlapScore {
    /// Candidate vertex.
    pub vertex: VertexId,
    /// Raw intersection-over-union of the two footprints.
    pub iou: f32,
    /// IoU after decay for overlap already claimed by larger overlaps.
    pub effective: f32,
}

/// Score every candidate footprint against `target`.
///
/// Candidates are ranked by IoU (largest first, ties by id). Each one only
/// claims the overlap still unclaimed by the candidates ahead of it, so the
/// effective scores sum to at most 1.0. Returns the ranked scores and their
/// sum.
pub fn decayed_overlaps(
    target: &BoundingBox2D,
    candidates: impl IntoIterator<Item = (VertexId, BoundingBox2D)>,
) -> (Vec<OverlapScore>, f32) {
    let mut scores: Vec<OverlapScore> = candidates
        .into_iter()
        .map(|(vertex, bb)| OverlapScore {
            vertex,
            iou: target.iou(&bb),
            effective: 0.0,
        })
        .collect();
    scores.sort_by(|a, b| b.iou.total_cmp(&a.iou).then(a.vertex.cmp(&b.vertex)));

    let mut claimed = 0.0f32;
    for s in &mut scores {
        s.effective = s.iou.min(1.0 - claimed).max(0.0);
        claimed = (claimed + s.effective).min(1.0);
    }
    (scores, claimed)
}

/// Decide a vertex's fate from its score. The threshold itself retains.
#[inline]
pub fn retention_verdict(score: f32, threshold: f32) -> RetentionState {
    if score < threshold {
        RetentionState::Evicted
    } else {
        RetentionState::Retained
    }
}
