//! Pose graph storage: vertices carrying scans, edges carrying constraints.
//!
//! The graph enforces its structural invariants on every insertion: an edge
//! must connect two distinct existing vertices, and vertex ids come from a
//! monotone allocator that is never rewound (not even by [`PoseGraph::clear`]).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::types::{BoundingBox2D, LaserScan, PointCloud2D, Pose2D};

/// Vertex identifier. Strictly increasing, never reused.
pub type VertexId = u64;

/// Edge identifier. Strictly increasing, never reused.
pub type EdgeId = u64;

/// Information matrix (inverse covariance) for a 2D pose constraint.
///
/// Stored as the upper triangle of a 3x3 symmetric matrix:
/// ```text
/// | xx  xy  xt |
/// | xy  yy  yt |
/// | xt  yt  tt |
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Information2D {
    /// Information for x-x
    pub xx: f32,
    /// Information for x-y
    pub xy: f32,
    /// Information for x-theta
    pub xt: f32,
    /// Information for y-y
    pub yy: f32,
    /// Information for y-theta
    pub yt: f32,
    /// Information for theta-theta
    pub tt: f32,
}

impl Information2D {
    /// Create a diagonal information matrix.
    pub fn diagonal(xx: f32, yy: f32, tt: f32) -> Self {
        Self {
            xx,
            xy: 0.0,
            xt: 0.0,
            yy,
            yt: 0.0,
            tt,
        }
    }

    /// Create from standard deviations.
    pub fn from_std_dev(sigma_x: f32, sigma_y: f32, sigma_t: f32) -> Self {
        Self::diagonal(
            1.0 / (sigma_x * sigma_x),
            1.0 / (sigma_y * sigma_y),
            1.0 / (sigma_t * sigma_t),
        )
    }

    /// Multiply every entry by `factor`.
    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            xx: self.xx * factor,
            xy: self.xy * factor,
            xt: self.xt * factor,
            yy: self.yy * factor,
            yt: self.yt * factor,
            tt: self.tt * factor,
        }
    }

    /// Information of two constraints chained in series.
    ///
    /// Covariances add along a chain, so each diagonal entry becomes
    /// `1 / (1/a + 1/b)`. Cross terms are dropped.
    pub fn series(&self, other: &Information2D) -> Self {
        fn combine(a: f32, b: f32) -> f32 {
            if a <= 0.0 || b <= 0.0 {
                0.0
            } else {
                (a * b) / (a + b)
            }
        }
        Self::diagonal(
            combine(self.xx, other.xx),
            combine(self.yy, other.yy),
            combine(self.tt, other.tt),
        )
    }

    /// Scalar strength used to rank edges (trace of the matrix).
    #[inline]
    pub fn strength(&self) -> f32 {
        self.xx + self.yy + self.tt
    }
}

impl Default for Information2D {
    fn default() -> Self {
        // 10cm position std dev, ~5 degree heading std dev
        Self::from_std_dev(0.1, 0.1, 0.087)
    }
}

/// Origin of an edge's constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    /// Raw odometry delta between consecutive scans.
    Odometry,
    /// Relative pose refined by scan matching.
    ScanMatch,
    /// Operator-requested loop closure.
    ManualLoopClosure,
    /// Operator relocation of a vertex, anchored to the fixed vertex.
    ManualCorrection,
}

/// Relative pose measurement between two vertices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    /// Kind of constraint.
    pub kind: EdgeKind,
    /// Measured relative pose: T_from⁻¹ ⊕ T_to.
    pub measurement: Pose2D,
    /// Confidence in the measurement.
    pub information: Information2D,
}

impl Constraint {
    /// Create a new constraint.
    pub fn new(kind: EdgeKind, measurement: Pose2D, information: Information2D) -> Self {
        Self {
            kind,
            measurement,
            information,
        }
    }
}

/// An edge between two vertices.
///
/// Storage is directionless (both endpoints list the edge) but the
/// measurement is read from `from` to `to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Edge id.
    pub id: EdgeId,
    /// Source vertex.
    pub from: VertexId,
    /// Target vertex.
    pub to: VertexId,
    /// Constraint carried by the edge.
    pub constraint: Constraint,
}

impl Edge {
    /// The endpoint opposite `id`, if `id` is an endpoint.
    pub fn other(&self, id: VertexId) -> Option<VertexId> {
        if self.from == id {
            Some(self.to)
        } else if self.to == id {
            Some(self.from)
        } else {
            None
        }
    }

    /// Measurement read starting at `id` (inverted if `id` is the target).
    pub fn measurement_from(&self, id: VertexId) -> Option<Pose2D> {
        if self.from == id {
            Some(self.constraint.measurement)
        } else if self.to == id {
            Some(self.constraint.measurement.inverse())
        } else {
            None
        }
    }
}

/// Lifelong retention state of a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RetentionState {
    /// Inserted but not yet evaluated.
    #[default]
    Unscored,
    /// Evaluated as a new vertex; its score is its novelty.
    Scored,
    /// Survived a comparison against a newer overlapping vertex.
    Retained,
    /// Removed from the graph.
    Evicted,
}

/// A graph vertex: one accepted scan and its optimized pose.
#[derive(Debug, Clone)]
pub struct Vertex {
    /// Vertex id.
    pub id: VertexId,
    /// Optimized robot pose in the fixed frame.
    pub pose: Pose2D,
    /// Raw pose estimate at capture (odometry frame).
    pub odom_pose: Pose2D,
    /// Sensor mounting offset relative to the robot.
    pub sensor_offset: Pose2D,
    /// The scan captured at this vertex. Never mutated.
    pub scan: Arc<LaserScan>,
    /// Scan hits in the robot frame (mounting offset applied).
    pub cloud: Arc<PointCloud2D>,
    /// Footprint in the fixed frame, computed at insertion.
    pub bounding_box: BoundingBox2D,
    /// Lifelong retention score (`None` while unscored).
    pub retention_score: Option<f32>,
    /// Lifelong retention state.
    pub retention_state: RetentionState,
    /// Incident edges.
    pub edges: BTreeSet<EdgeId>,
}

impl Vertex {
    /// Pose of the sensor in the fixed frame.
    #[inline]
    pub fn sensor_pose(&self) -> Pose2D {
        self.pose.compose(&self.sensor_offset)
    }
}

/// Fields needed to insert a vertex; the graph assigns the id.
#[derive(Debug, Clone)]
pub struct NewVertex {
    /// Initial pose estimate in the fixed frame.
    pub pose: Pose2D,
    /// Raw pose estimate at capture.
    pub odom_pose: Pose2D,
    /// Sensor mounting offset.
    pub sensor_offset: Pose2D,
    /// Captured scan.
    pub scan: Arc<LaserScan>,
    /// Robot-frame hits.
    pub cloud: Arc<PointCloud2D>,
    /// Fixed-frame footprint.
    pub bounding_box: BoundingBox2D,
}

/// The pose graph.
///
/// Vertices are kept ordered by id, so the first vertex is always the
/// oldest survivor (the gauge anchor) and the last is the newest.
#[derive(Debug, Default)]
pub struct PoseGraph {
    vertices: BTreeMap<VertexId, Vertex>,
    edges: BTreeMap<EdgeId, Edge>,
    next_vertex_id: VertexId,
    next_edge_id: EdgeId,
    /// Bumped on every mutation; snapshots record the revision they saw.
    revision: u64,
}

impl PoseGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a vertex with a freshly allocated id.
    pub fn add_vertex(&mut self, new: NewVertex) -> VertexId {
        let id = self.next_vertex_id;
        self.next_vertex_id += 1;
        self.vertices.insert(
            id,
            Vertex {
                id,
                pose: new.pose,
                odom_pose: new.odom_pose,
                sensor_offset: new.sensor_offset,
                scan: new.scan,
                cloud: new.cloud,
                bounding_box: new.bounding_box,
                retention_score: None,
                retention_state: RetentionState::Unscored,
                edges: BTreeSet::new(),
            },
        );
        self.revision += 1;
        id
    }

    /// Insert a vertex with a known id (graph restore).
    ///
    /// The allocator is advanced past `vertex.id`. Incident edge ids are
    /// cleared; they are re-linked by [`PoseGraph::restore_edge`].
    ///
    /// # Panics
    ///
    /// Panics if the id is already present.
    pub(crate) fn restore_vertex(&mut self, mut vertex: Vertex) {
        assert!(
            !self.vertices.contains_key(&vertex.id),
            "graph integrity violation: duplicate vertex id {}",
            vertex.id
        );
        vertex.edges.clear();
        self.next_vertex_id = self.next_vertex_id.max(vertex.id + 1);
        self.vertices.insert(vertex.id, vertex);
        self.revision += 1;
    }

    /// Insert an edge with a known id (graph restore).
    pub(crate) fn restore_edge(&mut self, edge: Edge) {
        self.next_edge_id = self.next_edge_id.max(edge.id + 1);
        self.link_edge(edge);
    }

    /// Add an edge between two existing, distinct vertices.
    ///
    /// # Panics
    ///
    /// Panics if either endpoint is missing or `from == to`. Callers
    /// validate ids first; reaching the panic means the graph is corrupt.
    pub fn add_edge(&mut self, from: VertexId, to: VertexId, constraint: Constraint) -> EdgeId {
        let id = self.next_edge_id;
        self.next_edge_id += 1;
        self.link_edge(Edge {
            id,
            from,
            to,
            constraint,
        });
        id
    }

    fn link_edge(&mut self, edge: Edge) {
        assert!(
            edge.from != edge.to,
            "graph integrity violation: self-loop on vertex {}",
            edge.from
        );
        assert!(
            self.vertices.contains_key(&edge.from) && self.vertices.contains_key(&edge.to),
            "graph integrity violation: edge {} references missing vertex ({} -> {})",
            edge.id,
            edge.from,
            edge.to
        );
        for endpoint in [edge.from, edge.to] {
            if let Some(v) = self.vertices.get_mut(&endpoint) {
                v.edges.insert(edge.id);
            }
        }
        self.edges.insert(edge.id, edge);
        self.revision += 1;
    }

    /// Remove one edge.
    pub fn remove_edge(&mut self, id: EdgeId) -> Option<Edge> {
        let edge = self.edges.remove(&id)?;
        for endpoint in [edge.from, edge.to] {
            if let Some(v) = self.vertices.get_mut(&endpoint) {
                v.edges.remove(&id);
            }
        }
        self.revision += 1;
        Some(edge)
    }

    /// Remove a vertex together with all incident edges.
    pub fn remove_vertex(&mut self, id: VertexId) -> Option<(Vertex, Vec<Edge>)> {
        let edge_ids: Vec<EdgeId> = self.vertices.get(&id)?.edges.iter().copied().collect();
        let removed_edges: Vec<Edge> = edge_ids
            .into_iter()
            .filter_map(|e| self.remove_edge(e))
            .collect();
        let mut vertex = self.vertices.remove(&id)?;
        vertex.retention_state = RetentionState::Evicted;
        self.revision += 1;
        Some((vertex, removed_edges))
    }

    /// Get a vertex.
    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.vertices.get(&id)
    }

    /// Whether a vertex exists.
    pub fn contains(&self, id: VertexId) -> bool {
        self.vertices.contains_key(&id)
    }

    /// Get an edge.
    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(&id)
    }

    /// All vertices in id order.
    pub fn vertices(&self) -> impl Iterator<Item = &Vertex> + '_ {
        self.vertices.values()
    }

    /// All edges in id order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.values()
    }

    /// Edges incident to a vertex, paired with the opposite endpoint.
    pub fn neighbors(&self, id: VertexId) -> impl Iterator<Item = (VertexId, &Edge)> + '_ {
        self.vertices
            .get(&id)
            .into_iter()
            .flat_map(|v| v.edges.iter())
            .filter_map(move |eid| {
                let edge = self.edges.get(eid)?;
                Some((edge.other(id)?, edge))
            })
    }

    /// Number of vertices.
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Number of edges.
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Number of edges of one kind.
    pub fn num_edges_of(&self, kind: EdgeKind) -> usize {
        self.edges
            .values()
            .filter(|e| e.constraint.kind == kind)
            .count()
    }

    /// Whether the graph has no vertices.
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Oldest surviving vertex (held fixed during optimization).
    pub fn anchor(&self) -> Option<&Vertex> {
        self.vertices.values().next()
    }

    /// Newest surviving vertex.
    pub fn latest(&self) -> Option<&Vertex> {
        self.vertices.values().next_back()
    }

    /// Id the next inserted vertex will receive.
    pub fn next_vertex_id(&self) -> VertexId {
        self.next_vertex_id
    }

    /// Id the next inserted edge will receive.
    pub fn next_edge_id(&self) -> EdgeId {
        self.next_edge_id
    }

    /// Mutation counter.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Overwrite one vertex pose. Returns false if the vertex is gone.
    pub fn set_pose(&mut self, id: VertexId, pose: Pose2D) -> bool {
        match self.vertices.get_mut(&id) {
            Some(v) => {
                v.pose = pose;
                self.revision += 1;
                true
            }
            None => false,
        }
    }

    /// Apply a batch of corrected poses. Unknown ids are skipped.
    ///
    /// Returns the number of vertices updated.
    pub fn apply_corrections<'a>(
        &mut self,
        corrections: impl IntoIterator<Item = (&'a VertexId, &'a Pose2D)>,
    ) -> usize {
        let mut updated = 0;
        for (id, pose) in corrections {
            if let Some(v) = self.vertices.get_mut(id) {
                v.pose = *pose;
                updated += 1;
            }
        }
        self.revision += 1;
        updated
    }

    /// Record a lifelong score.
    ///
    /// Scores do not change map geometry, so the revision stays put.
    pub fn set_retention(&mut self, id: VertexId, score: f32, state: RetentionState) -> bool {
        match self.vertices.get_mut(&id) {
            Some(v) => {
                v.retention_score = Some(score);
                v.retention_state = state;
                true
            }
            None => false,
        }
    }

    /// Move the id allocators forward to at least the given values.
    pub(crate) fn advance_allocators(&mut self, next_vertex: VertexId, next_edge: EdgeId) {
        self.next_vertex_id = self.next_vertex_id.max(next_vertex);
        self.next_edge_id = self.next_edge_id.max(next_edge);
    }

    /// Drop all vertices and edges. Id allocators keep counting.
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.edges.clear();
        self.revision += 1;
    }
}
