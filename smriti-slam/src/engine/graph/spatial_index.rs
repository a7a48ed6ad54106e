//! Radius queries over graph vertices.
//!
//! Two strategies answer "which vertices lie within R of P":
//!
//! - **Link traversal**: breadth-first walk over edges starting at a
//!   vertex. The walk passes through vertices outside the radius and keeps
//!   only those inside it, so a revisited place is found through the long
//!   way around a loop. Cost grows with the connected component, or with
//!   `max_hops` when set.
//! - **Tree**: a k-d tree over vertex positions. Cost grows with the
//!   number of vertices in range.
//!
//! With unlimited hops both return every connected vertex in range.

use std::collections::{BTreeSet, HashMap, VecDeque};

use kiddo::SquaredEuclidean;
use kiddo::float::kdtree::KdTree;

use super::pose_graph::{PoseGraph, VertexId};
use crate::core::types::Point2D;

/// Leaf capacity of the position tree.
///
/// kiddo cannot split a leaf whose points all share one coordinate on the
/// split axis. Identical positions share a single tree entry, so this only
/// bounds distinct positions lying on one exact axis line.
const BUCKET_SIZE: usize = 256;

type PositionTree = KdTree<f32, u64, 2, BUCKET_SIZE, u32>;

/// Tree item for an exact position.
fn position_key(p: Point2D) -> u64 {
    ((p.x.to_bits() as u64) << 32) | p.y.to_bits() as u64
}

/// Query strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStrategy {
    /// Breadth-first traversal over edges, optionally limited in depth.
    LinkTraversal {
        /// Maximum hops from the start vertex (`None` = unlimited).
        max_hops: Option<usize>,
    },
    /// k-d tree lookup over vertex positions.
    Tree,
}

/// Spatial index over vertex positions.
///
/// Kept in sync by the pose graph manager: vertices are inserted when
/// added, removed when evicted, and the whole index is rebuilt after an
/// optimization moves poses. The tree is only maintained for
/// [`SearchStrategy::Tree`].
pub struct SpatialIndex {
    strategy: SearchStrategy,
    tree: PositionTree,
    /// Vertices at each exact position held in the tree.
    occupants: HashMap<u64, Vec<VertexId>>,
    positions: HashMap<VertexId, Point2D>,
}

impl std::fmt::Debug for SpatialIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("strategy", &self.strategy)
            .field("len", &self.positions.len())
            .field("distinct_positions", &self.occupants.len())
            .finish()
    }
}

impl SpatialIndex {
    /// Create an empty index.
    pub fn new(strategy: SearchStrategy) -> Self {
        Self {
            strategy,
            tree: PositionTree::new(),
            occupants: HashMap::new(),
            positions: HashMap::new(),
        }
    }

    /// Active query strategy.
    pub fn strategy(&self) -> SearchStrategy {
        self.strategy
    }

    /// Number of indexed vertices.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Index a vertex at a position (replaces any previous entry).
    pub fn insert(&mut self, id: VertexId, position: Point2D) {
        self.remove(id);
        self.positions.insert(id, position);
        if self.strategy != SearchStrategy::Tree
            || !position.x.is_finite()
            || !position.y.is_finite()
        {
            return;
        }

        let key = position_key(position);
        let ids = self.occupants.entry(key).or_default();
        if ids.is_empty() {
            self.tree.add(&[position.x, position.y], key);
        }
        ids.push(id);
    }

    /// Drop a vertex from the index.
    pub fn remove(&mut self, id: VertexId) {
        let Some(old) = self.positions.remove(&id) else {
            return;
        };
        let key = position_key(old);
        let Some(ids) = self.occupants.get_mut(&key) else {
            return;
        };
        ids.retain(|v| *v != id);
        if ids.is_empty() {
            self.occupants.remove(&key);
            self.tree.remove(&[old.x, old.y], key);
        }
    }

    /// Rebuild from the current vertex poses.
    pub fn rebuild(&mut self, graph: &PoseGraph) {
        self.clear();
        for v in graph.vertices() {
            self.insert(v.id, v.pose.position());
        }
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.tree = PositionTree::new();
        self.occupants.clear();
        self.positions.clear();
    }

    /// Vertices within `radius` of `center`, excluding `origin`.
    ///
    /// `origin` is the vertex the query is made for; link traversal starts
    /// from it. Results are sorted by id.
    pub fn query(
        &self,
        graph: &PoseGraph,
        origin: VertexId,
        center: Point2D,
        radius: f32,
    ) -> Vec<VertexId> {
        match self.strategy {
            SearchStrategy::Tree => self.query_tree(origin, center, radius),
            SearchStrategy::LinkTraversal { max_hops } => {
                Self::query_links(graph, origin, center, radius, max_hops)
            }
        }
    }

    fn query_tree(&self, origin: VertexId, center: Point2D, radius: f32) -> Vec<VertexId> {
        let r_sq = radius * radius;
        // Widen the tree query slightly; the exact test below decides.
        let found = self
            .tree
            .within::<SquaredEuclidean>(&[center.x, center.y], r_sq * 1.001 + 1e-6);

        let mut ids: Vec<VertexId> = found
            .into_iter()
            .filter_map(|n| self.occupants.get(&n.item))
            .flatten()
            .copied()
            .filter(|id| *id != origin)
            .filter(|id| {
                self.positions
                    .get(id)
                    .is_some_and(|p| p.distance_squared(&center) <= r_sq)
            })
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    fn query_links(
        graph: &PoseGraph,
        origin: VertexId,
        center: Point2D,
        radius: f32,
        max_hops: Option<usize>,
    ) -> Vec<VertexId> {
        let r_sq = radius * radius;
        let mut visited = BTreeSet::from([origin]);
        let mut found = BTreeSet::new();
        let mut frontier = VecDeque::from([(origin, 0usize)]);

        while let Some((id, depth)) = frontier.pop_front() {
            if max_hops.is_some_and(|h| depth >= h) {
                continue;
            }
            for (neighbor, _) in graph.neighbors(id) {
                if !visited.insert(neighbor) {
                    continue;
                }
                let Some(v) = graph.vertex(neighbor) else {
                    continue;
                };
                if v.pose.position().distance_squared(&center) <= r_sq {
                    found.insert(neighbor);
                }
                frontier.push_back((neighbor, depth + 1));
            }
        }

        found.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Pose2D;
    use crate::engine::graph::pose_graph::tests::new_vertex;
    use crate::engine::graph::{Constraint, EdgeKind, Information2D};

    /// Chain of vertices along x with small y jitter, linked by odometry.
    fn chain(n: usize, spacing: f32) -> PoseGraph {
        let mut graph = PoseGraph::new();
        let mut prev = None;
        for i in 0..n {
            let pose = Pose2D::new(i as f32 * spacing, 0.01 * (i % 3) as f32, 0.0);
            let id = graph.add_vertex(new_vertex(pose));
            if let Some(p) = prev {
                graph.add_edge(
                    p,
                    id,
                    Constraint::new(
                        EdgeKind::Odometry,
                        Pose2D::new(spacing, 0.0, 0.0),
                        Information2D::default(),
                    ),
                );
            }
            prev = Some(id);
        }
        graph
    }

    #[test]
    fn test_strategies_agree_on_linked_chain() {
        let graph = chain(12, 0.5);
        let mut tree = SpatialIndex::new(SearchStrategy::Tree);
        tree.rebuild(&graph);
        let links = SpatialIndex::new(SearchStrategy::LinkTraversal { max_hops: None });

        let origin = 5;
        let center = graph.vertex(origin).unwrap().pose.position();
        for radius in [0.4, 1.1, 2.3, 10.0] {
            assert_eq!(
                tree.query(&graph, origin, center, radius),
                links.query(&graph, origin, center, radius),
                "radius {radius}"
            );
        }
    }

    #[test]
    fn test_query_excludes_origin() {
        let graph = chain(3, 0.5);
        let mut tree = SpatialIndex::new(SearchStrategy::Tree);
        tree.rebuild(&graph);
        let center = graph.vertex(1).unwrap().pose.position();
        assert_eq!(tree.query(&graph, 1, center, 1.0), vec![0, 2]);
    }

    #[test]
    fn test_removed_vertices_never_returned() {
        let mut graph = chain(6, 0.5);
        let mut tree = SpatialIndex::new(SearchStrategy::Tree);
        tree.rebuild(&graph);

        graph.remove_vertex(3);
        tree.remove(3);

        let center = graph.vertex(2).unwrap().pose.position();
        let links = SpatialIndex::new(SearchStrategy::LinkTraversal { max_hops: None });
        assert!(!tree.query(&graph, 2, center, 5.0).contains(&3));
        assert!(!links.query(&graph, 2, center, 5.0).contains(&3));
    }

    #[test]
    fn test_max_hops_limits_traversal() {
        let graph = chain(8, 0.5);
        let links = SpatialIndex::new(SearchStrategy::LinkTraversal { max_hops: Some(1) });
        let center = graph.vertex(4).unwrap().pose.position();
        assert_eq!(links.query(&graph, 4, center, 10.0), vec![3, 5]);
    }

    #[test]
    fn test_max_hops_counts_out_of_range_vertices() {
        let graph = chain(5, 2.0);
        let center = graph.vertex(0).unwrap().pose.position();
        let near_end = Point2D::new(center.x + 8.0, center.y);

        // Vertex 4 is four hops away; vertices between are out of range.
        let unlimited = SpatialIndex::new(SearchStrategy::LinkTraversal { max_hops: None });
        assert_eq!(unlimited.query(&graph, 0, near_end, 0.5), vec![4]);
        let short = SpatialIndex::new(SearchStrategy::LinkTraversal { max_hops: Some(3) });
        assert!(short.query(&graph, 0, near_end, 0.5).is_empty());
    }

    /// Square loop of `per_side * 4` vertices, then a second lap start
    /// placed back at the first vertex and linked only to the last one.
    fn closed_loop(side: f32, per_side: usize) -> (PoseGraph, VertexId) {
        let mut graph = PoseGraph::new();
        let step = side / per_side as f32;
        let mut prev: Option<VertexId> = None;
        let corners = [(0.0, 0.0), (side, 0.0), (side, side), (0.0, side)];
        let dirs = [(1.0, 0.0), (0.0, 1.0), (-1.0, 0.0), (0.0, -1.0)];
        let link = |graph: &mut PoseGraph, id: VertexId, prev: &mut Option<VertexId>| {
            if let Some(p) = *prev {
                graph.add_edge(
                    p,
                    id,
                    Constraint::new(
                        EdgeKind::Odometry,
                        Pose2D::new(step, 0.0, 0.0),
                        Information2D::default(),
                    ),
                );
            }
            *prev = Some(id);
        };
        for (k, ((cx, cy), (dx, dy))) in corners.into_iter().zip(dirs).enumerate() {
            for i in 0..per_side {
                let t = i as f32 * step;
                // Jitter keeps coordinates distinct.
                let jitter = 0.003 * ((k * per_side + i) % 5) as f32;
                let pose = Pose2D::new(cx + dx * t + jitter, cy + dy * t - jitter, 0.0);
                let id = graph.add_vertex(new_vertex(pose));
                link(&mut graph, id, &mut prev);
            }
        }
        let revisit = graph.add_vertex(new_vertex(Pose2D::new(0.05, 0.02, 0.0)));
        link(&mut graph, revisit, &mut prev);
        (graph, revisit)
    }

    #[test]
    fn test_strategies_agree_on_closed_loop() {
        let (graph, revisit) = closed_loop(6.0, 12);
        let mut tree = SpatialIndex::new(SearchStrategy::Tree);
        tree.rebuild(&graph);
        let links = SpatialIndex::new(SearchStrategy::LinkTraversal { max_hops: None });

        let center = graph.vertex(revisit).unwrap().pose.position();
        let from_tree = tree.query(&graph, revisit, center, 1.0);
        let from_links = links.query(&graph, revisit, center, 1.0);

        // The first-lap start is only reachable the long way around.
        assert!(from_tree.contains(&0), "{from_tree:?}");
        assert_eq!(from_tree, from_links);
    }

    #[test]
    fn test_coincident_vertices_share_tree_entry() {
        let mut index = SpatialIndex::new(SearchStrategy::Tree);
        let spot = Point2D::new(1.0, 2.0);
        for id in 0..100 {
            index.insert(id, spot);
        }
        // A column of distinct positions on one exact x.
        for i in 0..100 {
            index.insert(100 + i, Point2D::new(1.0, 2.5 + i as f32 * 0.01));
        }
        assert_eq!(index.len(), 200);

        let graph = PoseGraph::new();
        let found = index.query(&graph, 0, spot, 0.01);
        assert_eq!(found, (1..100).collect::<Vec<_>>());

        for id in 0..50 {
            index.remove(id);
        }
        assert_eq!(index.query(&graph, 50, spot, 0.01), (51..100).collect::<Vec<_>>());
        for id in 50..100 {
            index.remove(id);
        }
        assert!(index.query(&graph, 100, spot, 0.01).is_empty());
        assert_eq!(index.len(), 100);
    }

    #[test]
    fn test_link_strategy_skips_tree() {
        let mut index = SpatialIndex::new(SearchStrategy::LinkTraversal { max_hops: None });
        for id in 0..100 {
            index.insert(id, Point2D::new(1.0, 2.0));
        }
        assert_eq!(index.len(), 100);
        index.remove(7);
        assert_eq!(index.len(), 99);
    }
}
