//! Per-vertex depreciation pass.

use serde::{Deserialize, Serialize};

use super::eviction::{Eviction, evict_with_transfer};
use super::scoring::{decayed_overlaps, retention_verdict};
use crate::engine::graph::{Edge, PoseGraph, RetentionState, SearchStrategy, SpatialIndex, VertexId};

/// Lifelong pruning configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifelongConfig {
    /// Run the depreciation pass after each inserted vertex.
    pub enabled: bool,

    /// Use the k-d tree instead of link traversal for candidate search.
    pub use_tree: bool,

    /// Hop limit for link traversal (unlimited when absent).
    pub max_hops: Option<usize>,

    /// Scores below this evict the vertex; the threshold itself retains.
    pub retention_threshold: f32,
}

impl Default for LifelongConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            use_tree: false,
            max_hops: None,
            retention_threshold: 0.1,
        }
    }
}

impl LifelongConfig {
    /// Spatial index strategy selected by this configuration.
    pub fn search_strategy(&self) -> SearchStrategy {
        if self.use_tree {
            SearchStrategy::Tree
        } else {
            SearchStrategy::LinkTraversal {
                max_hops: self.max_hops,
            }
        }
    }
}

/// Result of evaluating one new vertex.
#[derive(Debug, Clone, Default)]
pub struct PruneReport {
    /// The vertex that was evaluated.
    pub vertex: VertexId,
    /// Search radius (footprint diagonal).
    pub radius: f32,
    /// Number of nearby candidates compared.
    pub candidates: usize,
    /// Share of the new footprint not already covered by candidates.
    pub novelty: f32,
    /// Evicted vertices, in eviction order.
    pub evicted: Vec<VertexId>,
    /// Candidates that survived, with their updated scores.
    pub retained: Vec<(VertexId, f32)>,
    /// Edges created by constraint transfer.
    pub added_edges: Vec<Edge>,
}

impl PruneReport {
    /// Whether the evaluated vertex itself was evicted as redundant.
    pub fn new_vertex_evicted(&self) -> bool {
        self.evicted.contains(&self.vertex)
    }

    fn absorb(&mut self, eviction: Eviction) {
        self.evicted.push(eviction.vertex.id);
        self.added_edges.extend(eviction.added_edges);
    }
}

/// Scores new vertices against their neighborhood and evicts redundant ones.
///
/// A new vertex whose footprint is already covered by its neighbors
/// (novelty below threshold) is evicted immediately and its neighbors keep
/// their scores. Otherwise the new vertex is scored with its novelty and
/// each overlapping neighbor's score is multiplied by the share of its
/// overlap left unclaimed, `1 - effective`. Unscored neighbors start at 1.0.
#[derive(Debug, Clone, Default)]
pub struct LifelongPruner {
    config: LifelongConfig,
}

impl LifelongPruner {
    /// Create a pruner.
    pub fn new(config: LifelongConfig) -> Self {
        Self { config }
    }

    /// Active configuration.
    pub fn config(&self) -> &LifelongConfig {
        &self.config
    }

    /// Evaluate a newly inserted vertex.
    ///
    /// The caller keeps `index` and any solver mirror in sync with the
    /// returned report. Returns `None` if the vertex no longer exists.
    pub fn evaluate(
        &self,
        graph: &mut PoseGraph,
        index: &SpatialIndex,
        id: VertexId,
    ) -> Option<PruneReport> {
        let threshold = self.config.retention_threshold;
        let (center, footprint) = {
            let v = graph.vertex(id)?;
            (v.pose.position(), v.bounding_box)
        };
        let radius = footprint.diagonal();

        let nearby = index.query(graph, id, center, radius);
        let (scores, claimed) = decayed_overlaps(
            &footprint,
            nearby
                .iter()
                .filter_map(|c| graph.vertex(*c).map(|v| (v.id, v.bounding_box))),
        );

        let mut report = PruneReport {
            vertex: id,
            radius,
            candidates: scores.len(),
            novelty: (1.0 - claimed).max(0.0),
            ..PruneReport::default()
        };

        if report.novelty < threshold {
            if let Some(eviction) = evict_with_transfer(graph, id) {
                report.absorb(eviction);
            }
            return Some(report);
        }

        graph.set_retention(id, report.novelty, RetentionState::Scored);

        for overlap in scores.iter().filter(|s| s.effective > 0.0) {
            let Some(prior) = graph
                .vertex(overlap.vertex)
                .map(|v| v.retention_score.unwrap_or(1.0))
            else {
                continue;
            };
            let score = prior * (1.0 - overlap.effective);

            match retention_verdict(score, threshold) {
                RetentionState::Evicted => {
                    if let Some(eviction) = evict_with_transfer(graph, overlap.vertex) {
                        report.absorb(eviction);
                    }
                }
                state => {
                    graph.set_retention(overlap.vertex, score, state);
                    report.retained.push((overlap.vertex, score));
                }
            }
        }

        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{BoundingBox2D, Point2D, Pose2D};
    use crate::engine::graph::pose_graph::tests::new_vertex;
    use crate::engine::graph::{Constraint, EdgeKind, Information2D, NewVertex};

    fn vertex_with_box(x: f32, half: f32) -> NewVertex {
        let mut v = new_vertex(Pose2D::new(x, 0.0, 0.0));
        v.bounding_box =
            BoundingBox2D::new(Point2D::new(x - half, -half), Point2D::new(x + half, half));
        v
    }

    fn link(graph: &mut PoseGraph, a: VertexId, b: VertexId) {
        graph.add_edge(
            a,
            b,
            Constraint::new(EdgeKind::Odometry, Pose2D::identity(), Information2D::default()),
        );
    }

    fn tree_index(graph: &PoseGraph) -> SpatialIndex {
        let mut index = SpatialIndex::new(SearchStrategy::Tree);
        index.rebuild(graph);
        index
    }

    #[test]
    fn test_coinciding_footprint_evicts_new_vertex() {
        let mut graph = PoseGraph::new();
        let old = graph.add_vertex(vertex_with_box(0.0, 1.0));
        let new = graph.add_vertex(vertex_with_box(0.0, 1.0));
        link(&mut graph, old, new);
        let index = tree_index(&graph);

        let report = LifelongPruner::default()
            .evaluate(&mut graph, &index, new)
            .unwrap();

        assert!(report.new_vertex_evicted());
        assert_eq!(report.novelty, 0.0);
        assert!(!graph.contains(new));
        let survivor = graph.vertex(old).unwrap();
        assert_eq!(survivor.retention_state, RetentionState::Unscored);
    }

    #[test]
    fn test_partial_overlap_decays_neighbor() {
        let mut graph = PoseGraph::new();
        let old = graph.add_vertex(vertex_with_box(0.0, 1.0));
        // Shifted by half a box: IoU = 1/3.
        let new = graph.add_vertex(vertex_with_box(1.0, 1.0));
        link(&mut graph, old, new);
        let index = tree_index(&graph);

        let report = LifelongPruner::default()
            .evaluate(&mut graph, &index, new)
            .unwrap();

        assert!(report.evicted.is_empty());
        assert!((report.novelty - 2.0 / 3.0).abs() < 1e-5);
        let new_v = graph.vertex(new).unwrap();
        assert_eq!(new_v.retention_state, RetentionState::Scored);
        let old_v = graph.vertex(old).unwrap();
        assert_eq!(old_v.retention_state, RetentionState::Retained);
        assert!((old_v.retention_score.unwrap() - 2.0 / 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_decayed_neighbor_below_threshold_is_evicted() {
        let mut graph = PoseGraph::new();
        let old = graph.add_vertex(vertex_with_box(0.0, 1.0));
        let mid = graph.add_vertex(vertex_with_box(-3.0, 1.0));
        link(&mut graph, old, mid);
        // Already decayed by earlier passes.
        graph.set_retention(old, 0.12, RetentionState::Retained);
        let new = graph.add_vertex(vertex_with_box(1.0, 1.0));
        link(&mut graph, old, new);
        let index = tree_index(&graph);

        // 0.12 * (1 - 1/3) = 0.08 < 0.1
        let report = LifelongPruner::default()
            .evaluate(&mut graph, &index, new)
            .unwrap();

        assert_eq!(report.evicted, vec![old]);
        assert!(!graph.contains(old));
        // old's edges were transferred, keeping mid connected to new.
        assert_eq!(report.added_edges.len(), 1);
        assert!(graph.neighbors(mid).any(|(n, _)| n == new));
    }

    #[test]
    fn test_disjoint_vertex_untouched() {
        let mut graph = PoseGraph::new();
        let far = graph.add_vertex(vertex_with_box(50.0, 1.0));
        let new = graph.add_vertex(vertex_with_box(0.0, 1.0));
        link(&mut graph, far, new);
        let index = tree_index(&graph);

        let report = LifelongPruner::default()
            .evaluate(&mut graph, &index, new)
            .unwrap();

        assert_eq!(report.candidates, 0);
        assert_eq!(report.novelty, 1.0);
        assert_eq!(
            graph.vertex(far).unwrap().retention_state,
            RetentionState::Unscored
        );
    }

    #[test]
    fn test_missing_vertex_returns_none() {
        let mut graph = PoseGraph::new();
        let index = tree_index(&graph);
        assert!(LifelongPruner::default().evaluate(&mut graph, &index, 9).is_none());
    }
}
