//! Incremental pose-graph manager.
//!
//! Owns the graph (behind a shared lock so map regeneration can read it),
//! the solver mirror, the spatial index, the laser descriptors, and the
//! lifelong pruner. Exactly one thread drives a manager; every graph write
//! happens through it, and no lock is held while the solver or the scan
//! matcher runs.
//!
//! ```text
//! PosedScan ─▶ add_scan ──▶ vertex + Odometry edge + ScanMatch edges
//!                 │
//!                 ▼
//!             optimize ───▶ solver.solve() (no lock) ─▶ apply under one write
//!                 │
//!                 ▼
//!          lifelong pruner ─▶ evictions mirrored into solver and index
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::laser::{LaserGeometry, LaserRegistry};
use super::pose_graph::{
    Constraint, Edge, EdgeId, EdgeKind, Information2D, NewVertex, PoseGraph, VertexId,
};
use super::solver::{ScanSolver, SolverError, SolverSettings, create_solver};
use super::spatial_index::{SearchStrategy, SpatialIndex};
use crate::algorithms::matching::{PointToPointIcp, ScanMatcher};
use crate::core::types::{BoundingBox2D, PointCloud2D, Pose2D, PosedScan};
use crate::engine::lifelong::{LifelongConfig, LifelongPruner, PruneReport};
use crate::error::SlamError;

/// Graph shared between the ingestion thread (writer) and readers.
pub type SharedGraph = Arc<RwLock<PoseGraph>>;

/// Why a scan did not become a vertex.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AddScanRejection {
    /// No descriptor is registered for the scan's frame.
    #[error("unknown laser geometry for frame '{0}'")]
    UnknownLaserGeometry(String),

    /// The descriptor is invalid or does not match the scan.
    #[error("laser '{0}' is not calibrated for this scan")]
    UncalibratedLaser(String),

    /// The pose is within epsilon of the previous accepted scan.
    #[error("scan duplicates the previous accepted pose")]
    DuplicatePose,
}

/// Pose graph manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseGraphConfig {
    /// Solver backend name (see [`super::available_solvers`]).
    pub solver: String,

    /// Position change below which a scan is a duplicate (meters).
    pub duplicate_distance_epsilon: f32,

    /// Heading change below which a scan is a duplicate (radians).
    pub duplicate_heading_epsilon: f32,

    /// Radius searched for scan-match candidates (meters).
    pub scan_match_radius: f32,

    /// Maximum scan-match edges per new vertex.
    pub max_match_candidates: usize,

    /// Minimum match score for a ScanMatch edge.
    pub min_match_score: f32,

    /// Optimize after every N accepted scans.
    pub optimize_every_n_scans: u32,

    /// Odometry position std dev (meters).
    pub odometry_sigma_xy: f32,
    /// Odometry heading std dev (radians).
    pub odometry_sigma_theta: f32,

    /// Scan-match position std dev at score 1.0 (meters).
    pub scan_match_sigma_xy: f32,
    /// Scan-match heading std dev at score 1.0 (radians).
    pub scan_match_sigma_theta: f32,

    /// Manual constraint position std dev (meters).
    pub manual_sigma_xy: f32,
    /// Manual constraint heading std dev (radians).
    pub manual_sigma_theta: f32,
}

impl Default for PoseGraphConfig {
    fn default() -> Self {
        Self {
            solver: "levenberg_marquardt".to_string(),
            duplicate_distance_epsilon: 1e-3,
            duplicate_heading_epsilon: 1e-3,
            scan_match_radius: 2.0,
            max_match_candidates: 3,
            min_match_score: 0.3,
            optimize_every_n_scans: 1,
            odometry_sigma_xy: 0.05,
            odometry_sigma_theta: 0.05,
            scan_match_sigma_xy: 0.02,
            scan_match_sigma_theta: 0.02,
            manual_sigma_xy: 0.005,
            manual_sigma_theta: 0.005,
        }
    }
}

impl PoseGraphConfig {
    fn odometry_information(&self) -> Information2D {
        Information2D::from_std_dev(
            self.odometry_sigma_xy,
            self.odometry_sigma_xy,
            self.odometry_sigma_theta,
        )
    }

    fn scan_match_information(&self, score: f32) -> Information2D {
        Information2D::from_std_dev(
            self.scan_match_sigma_xy,
            self.scan_match_sigma_xy,
            self.scan_match_sigma_theta,
        )
        .scaled(score.clamp(0.0, 1.0))
    }

    fn manual_information(&self) -> Information2D {
        Information2D::from_std_dev(self.manual_sigma_xy, self.manual_sigma_xy, self.manual_sigma_theta)
    }
}

/// How a deserialized graph is joined to the live sensor stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DeserializeMode {
    /// The robot restarts where the oldest vertex was captured.
    StartAtFirstNode,
    /// The robot restarts at a known pose in the map frame.
    StartAtGivenPose(Pose2D),
    /// Pure localization against a frozen map. Not available while mapping.
    LocalizeAtPose(Pose2D),
}

/// Counters exposed on the operator surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    /// Surviving vertices.
    pub vertices: usize,
    /// Surviving edges.
    pub edges: usize,
    /// Id the next vertex will receive.
    pub next_vertex_id: VertexId,
    /// Scans turned into vertices.
    pub scans_added: u64,
    /// Scans rejected by `add_scan`.
    pub scans_rejected: u64,
    /// Vertices evicted by lifelong pruning.
    pub evictions: u64,
    /// ScanMatch plus manual loop-closure edges in the graph.
    pub loop_closures: usize,
    /// Successful optimizations.
    pub optimizations: u64,
    /// Failed optimizations.
    pub solver_failures: u64,
    /// Whether the most recent optimization succeeded.
    pub last_optimization_ok: Option<bool>,
    /// Relocations staged in interactive mode.
    pub staged_moves: usize,
    /// Interactive mode flag.
    pub interactive: bool,
}

/// Result of processing one queued scan end to end.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// The inserted vertex.
    pub vertex: VertexId,
    /// ScanMatch edges created.
    pub scan_matches: usize,
    /// Optimization result, if one ran.
    pub optimization: Option<Result<usize, SolverError>>,
    /// Lifelong report, if pruning ran.
    pub prune: Option<PruneReport>,
}

/// Solver mutation recorded under the graph lock and forwarded once the
/// lock is released.
#[derive(Debug)]
enum SolverOp {
    AddVertex(VertexId, Pose2D),
    AddEdge(Edge),
    RemoveVertex(VertexId),
    RemoveEdge(EdgeId),
    SetPose(VertexId, Pose2D),
}

/// Incremental pose-graph manager.
pub struct PoseGraphManager {
    config: PoseGraphConfig,
    graph: SharedGraph,
    solver: Box<dyn ScanSolver>,
    matcher: Box<dyn ScanMatcher>,
    index: SpatialIndex,
    lasers: LaserRegistry,
    pruner: Option<LifelongPruner>,

    /// Map ← odometry correction applied to raw poses.
    odom_correction: Pose2D,
    last_odom_pose: Option<Pose2D>,
    /// First vertex id whose odometry belongs to the current session.
    session_start: VertexId,
    /// Map pose of the first scan after a deserialize.
    continuation: Option<Pose2D>,
    scans_since_optimize: u32,

    interactive: bool,
    staged_moves: BTreeMap<VertexId, Pose2D>,
    stats: GraphStats,
}

impl std::fmt::Debug for PoseGraphManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoseGraphManager")
            .field("solver", &self.solver.name())
            .field("index", &self.index)
            .field("stats", &self.stats)
            .finish()
    }
}

impl PoseGraphManager {
    /// Create a manager, resolving the solver by name.
    ///
    /// An unknown solver name is a [`SlamError::ConfigurationFatal`].
    pub fn new(
        config: PoseGraphConfig,
        solver_settings: &SolverSettings,
        lifelong: &LifelongConfig,
        lasers: impl IntoIterator<Item = LaserGeometry>,
    ) -> Result<Self, SlamError> {
        let solver = create_solver(&config.solver, solver_settings)?;
        log::info!("Pose graph solver: {}", solver.name());
        Ok(Self::with_components(
            config,
            solver,
            Box::new(PointToPointIcp::default()),
            lifelong,
            lasers,
        ))
    }

    /// Create a manager from explicit components.
    pub fn with_components(
        config: PoseGraphConfig,
        solver: Box<dyn ScanSolver>,
        matcher: Box<dyn ScanMatcher>,
        lifelong: &LifelongConfig,
        lasers: impl IntoIterator<Item = LaserGeometry>,
    ) -> Self {
        Self {
            config,
            graph: Arc::new(RwLock::new(PoseGraph::new())),
            solver,
            matcher,
            index: SpatialIndex::new(lifelong.search_strategy()),
            lasers: LaserRegistry::new(lasers),
            pruner: lifelong
                .enabled
                .then(|| LifelongPruner::new(lifelong.clone())),
            odom_correction: Pose2D::identity(),
            last_odom_pose: None,
            session_start: 0,
            continuation: None,
            scans_since_optimize: 0,
            interactive: false,
            staged_moves: BTreeMap::new(),
            stats: GraphStats::default(),
        }
    }

    /// Shared handle to the graph for readers.
    pub fn graph(&self) -> SharedGraph {
        Arc::clone(&self.graph)
    }

    /// Spatial index strategy in use.
    pub fn search_strategy(&self) -> SearchStrategy {
        self.index.strategy()
    }

    /// Register or replace a laser descriptor.
    pub fn register_laser(&mut self, geometry: LaserGeometry) {
        self.lasers.register(geometry);
    }

    /// Insert a scan as a new vertex.
    ///
    /// Adds an Odometry edge to the previous vertex of this session (raw
    /// pose delta) and ScanMatch edges to nearby vertices whose match score
    /// clears the configured minimum. The full delta is mirrored into the
    /// solver. Does not optimize.
    pub fn add_scan(&mut self, posed: &PosedScan) -> Result<VertexId, AddScanRejection> {
        self.insert_scan(posed).map(|(id, _)| id)
    }

    fn insert_scan(&mut self, posed: &PosedScan) -> Result<(VertexId, usize), AddScanRejection> {
        let geometry = match self.lasers.resolve(&posed.scan) {
            Ok(g) => g.clone(),
            Err(rejection) => {
                self.stats.scans_rejected += 1;
                return Err(rejection);
            }
        };

        if let Some(last) = self.last_odom_pose
            && last.distance(&posed.pose) < self.config.duplicate_distance_epsilon
            && last.heading_change(&posed.pose) < self.config.duplicate_heading_epsilon
        {
            self.stats.scans_rejected += 1;
            log::debug!("Rejected duplicate scan at {:?}", posed.pose);
            return Err(AddScanRejection::DuplicatePose);
        }

        let scan = Arc::new(geometry.prepare(&posed.scan));
        let cloud = Arc::new(scan.to_point_cloud().transform(&geometry.mount));

        let mut ops = Vec::new();
        let id = {
            let mut graph = self.graph.write();

            // Predecessor: newest surviving vertex captured this session.
            let predecessor = graph
                .latest()
                .filter(|v| v.id >= self.session_start)
                .map(|v| (v.id, v.pose, v.odom_pose));

            let (pose, link) = match predecessor {
                Some((pid, ppose, podom)) => {
                    let delta = podom.between(&posed.pose);
                    (ppose.compose(&delta), Some((pid, delta)))
                }
                None => {
                    // New session: join the nearest existing vertex, if any.
                    let pose = self
                        .continuation
                        .take()
                        .unwrap_or_else(|| self.odom_correction.compose(&posed.pose));
                    let link = nearest_vertex(&graph, &pose)
                        .map(|(rid, rpose)| (rid, rpose.between(&pose)));
                    (pose, link)
                }
            };

            let bounding_box = footprint(&cloud, &pose);
            let id = graph.add_vertex(NewVertex {
                pose,
                odom_pose: posed.pose,
                sensor_offset: geometry.mount,
                scan: Arc::clone(&scan),
                cloud: Arc::clone(&cloud),
                bounding_box,
            });
            ops.push(SolverOp::AddVertex(id, pose));

            if let Some((pid, delta)) = link {
                let constraint =
                    Constraint::new(EdgeKind::Odometry, delta, self.config.odometry_information());
                let eid = graph.add_edge(pid, id, constraint);
                if let Some(edge) = graph.edge(eid) {
                    ops.push(SolverOp::AddEdge(edge.clone()));
                }
            }
            self.odom_correction = pose.compose(&posed.pose.inverse());
            id
        };
        self.forward(ops);

        let position = self
            .graph
            .read()
            .vertex(id)
            .map(|v| v.pose.position())
            .unwrap_or_default();
        self.index.insert(id, position);

        let matches = self.match_nearby(id);
        self.last_odom_pose = Some(posed.pose);
        self.scans_since_optimize += 1;
        self.stats.scans_added += 1;
        log::debug!("Added vertex {} with {} scan matches", id, matches);
        Ok((id, matches))
    }

    /// Attempt ScanMatch edges from nearby vertices to `id`.
    fn match_nearby(&mut self, id: VertexId) -> usize {
        // Gather inputs under a short read lock; match without it.
        let (new_pose, new_cloud, candidates) = {
            let graph = self.graph.read();
            let Some(v) = graph.vertex(id) else {
                return 0;
            };
            let predecessors: Vec<VertexId> = graph.neighbors(id).map(|(n, _)| n).collect();
            let center = v.pose.position();
            let mut nearby: Vec<(f32, VertexId, Pose2D, Arc<PointCloud2D>)> = self
                .index
                .query(&graph, id, center, self.config.scan_match_radius)
                .into_iter()
                .filter(|c| !predecessors.contains(c))
                .filter_map(|c| graph.vertex(c))
                .map(|c| (c.pose.distance(&v.pose), c.id, c.pose, Arc::clone(&c.cloud)))
                .collect();
            nearby.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            nearby.truncate(self.config.max_match_candidates);
            (v.pose, Arc::clone(&v.cloud), nearby)
        };

        let mut accepted = Vec::new();
        for (_, cid, cpose, ccloud) in candidates {
            let guess = cpose.between(&new_pose);
            let result = self.matcher.match_scans(&new_cloud, &ccloud, &guess);
            if result.converged && result.score >= self.config.min_match_score {
                accepted.push((
                    cid,
                    Constraint::new(
                        EdgeKind::ScanMatch,
                        result.transform,
                        self.config.scan_match_information(result.score),
                    ),
                ));
            }
        }

        let mut ops = Vec::new();
        {
            let mut graph = self.graph.write();
            for (cid, constraint) in accepted {
                if !graph.contains(cid) || !graph.contains(id) {
                    continue;
                }
                let eid = graph.add_edge(cid, id, constraint);
                if let Some(edge) = graph.edge(eid) {
                    ops.push(SolverOp::AddEdge(edge.clone()));
                }
            }
        }
        let added = ops.len();
        self.forward(ops);
        added
    }

    /// Apply recorded mutations to the solver. Call without the graph lock.
    fn forward(&mut self, ops: Vec<SolverOp>) {
        for op in ops {
            match op {
                SolverOp::AddVertex(id, pose) => self.solver.add_vertex(id, pose),
                SolverOp::AddEdge(edge) => self.solver.add_edge(&edge),
                SolverOp::RemoveVertex(id) => self.solver.remove_vertex(id),
                SolverOp::RemoveEdge(id) => self.solver.remove_edge(id),
                SolverOp::SetPose(id, pose) => self.solver.set_vertex_pose(id, pose),
            }
        }
    }

    /// Run the solver and apply the corrected poses.
    ///
    /// The solver runs without the graph lock; all corrections are applied
    /// under a single write lock. On failure no vertex pose changes.
    /// Returns the number of vertices updated.
    pub fn optimize(&mut self) -> Result<usize, SolverError> {
        self.scans_since_optimize = 0;
        match self.solver.solve() {
            Ok(poses) => {
                let updated = {
                    let mut graph = self.graph.write();
                    let updated = graph.apply_corrections(&poses);
                    self.index.rebuild(&graph);
                    if let Some(c) = odometry_correction(&graph, self.session_start) {
                        self.odom_correction = c;
                    }
                    updated
                };
                self.stats.optimizations += 1;
                self.stats.last_optimization_ok = Some(true);
                Ok(updated)
            }
            Err(e) => {
                log::warn!("Optimization failed, keeping last good poses: {}", e);
                self.stats.solver_failures += 1;
                self.stats.last_optimization_ok = Some(false);
                Err(e)
            }
        }
    }

    /// Run the lifelong pruner on `id` and mirror its evictions.
    pub fn evaluate_depreciation(&mut self, id: VertexId) -> Option<PruneReport> {
        let pruner = self.pruner.as_ref()?;
        let report = {
            let mut graph = self.graph.write();
            let report = pruner.evaluate(&mut graph, &self.index, id)?;
            for evicted in &report.evicted {
                self.index.remove(*evicted);
                self.staged_moves.remove(evicted);
            }
            if !report.evicted.is_empty()
                && let Some(c) = odometry_correction(&graph, self.session_start)
            {
                self.odom_correction = c;
            }
            report
        };
        let ops = report
            .evicted
            .iter()
            .map(|v| SolverOp::RemoveVertex(*v))
            .chain(report.added_edges.iter().cloned().map(SolverOp::AddEdge))
            .collect();
        self.forward(ops);

        self.stats.evictions += report.evicted.len() as u64;
        if !report.evicted.is_empty() {
            log::info!(
                "Lifelong pass on vertex {}: novelty {:.2}, {} candidates, evicted {:?}",
                id,
                report.novelty,
                report.candidates,
                report.evicted
            );
        }
        Some(report)
    }

    /// Add a scan, optimize when due, then run the lifelong pass.
    ///
    /// Optimization failure is reported in the outcome and never rejects
    /// the scan.
    pub fn process_scan(&mut self, posed: &PosedScan) -> Result<ScanOutcome, AddScanRejection> {
        let (vertex, scan_matches) = self.insert_scan(posed)?;

        let optimization = (self.scans_since_optimize >= self.config.optimize_every_n_scans.max(1))
            .then(|| self.optimize());
        let prune = self.evaluate_depreciation(vertex);

        Ok(ScanOutcome {
            vertex,
            scan_matches,
            optimization,
            prune,
        })
    }

    /// Move a vertex to `pose` and pin it there with a ManualCorrection
    /// edge from the anchor (the oldest vertex).
    ///
    /// Moving the anchor itself just moves it. A previous manual correction
    /// of the same vertex is replaced. The relocation is kept even if the
    /// optional re-optimization fails.
    pub fn relocate_vertex(
        &mut self,
        id: VertexId,
        pose: Pose2D,
        reoptimize: bool,
    ) -> Result<(), SlamError> {
        let mut ops = Vec::new();
        {
            let mut graph = self.graph.write();
            if !graph.contains(id) {
                return Err(SlamError::UnknownVertex(id));
            }
            let anchor = graph.anchor().map(|v| (v.id, v.pose));

            graph.set_pose(id, pose);
            ops.push(SolverOp::SetPose(id, pose));

            if let Some((anchor_id, anchor_pose)) = anchor
                && anchor_id != id
            {
                let stale: Vec<EdgeId> = graph
                    .neighbors(id)
                    .filter(|(n, e)| *n == anchor_id && e.constraint.kind == EdgeKind::ManualCorrection)
                    .map(|(_, e)| e.id)
                    .collect();
                for eid in stale {
                    graph.remove_edge(eid);
                    ops.push(SolverOp::RemoveEdge(eid));
                }

                let constraint = Constraint::new(
                    EdgeKind::ManualCorrection,
                    anchor_pose.between(&pose),
                    self.config.manual_information(),
                );
                let eid = graph.add_edge(anchor_id, id, constraint);
                if let Some(edge) = graph.edge(eid) {
                    ops.push(SolverOp::AddEdge(edge.clone()));
                }
            }
            self.index.insert(id, pose.position());
            if let Some(c) = odometry_correction(&graph, self.session_start) {
                self.odom_correction = c;
            }
        }
        self.forward(ops);
        log::info!("Relocated vertex {} to {:?}", id, pose);

        if reoptimize {
            self.optimize()?;
        }
        Ok(())
    }

    /// Close a loop between two vertices by operator request.
    ///
    /// The relative pose comes from scan matching seeded with the current
    /// estimate, falling back to the current estimate itself. The edge gets
    /// the fixed manual information and an optimization follows; the edge
    /// is kept even if that optimization fails.
    pub fn add_manual_loop_closure(
        &mut self,
        a: VertexId,
        b: VertexId,
    ) -> Result<EdgeId, SlamError> {
        if a == b {
            return Err(SlamError::InvalidCommand(format!(
                "loop closure needs two distinct vertices (got {a} twice)"
            )));
        }

        let (guess, cloud_a, cloud_b) = {
            let graph = self.graph.read();
            let va = graph.vertex(a).ok_or(SlamError::UnknownVertex(a))?;
            let vb = graph.vertex(b).ok_or(SlamError::UnknownVertex(b))?;
            (va.pose.between(&vb.pose), Arc::clone(&va.cloud), Arc::clone(&vb.cloud))
        };

        let result = self.matcher.match_scans(&cloud_b, &cloud_a, &guess);
        let measurement = if result.converged {
            result.transform
        } else {
            log::warn!(
                "Scan match for manual loop closure {} -> {} failed, using current estimate",
                a,
                b
            );
            guess
        };

        let (eid, edge) = {
            let mut graph = self.graph.write();
            if !graph.contains(a) || !graph.contains(b) {
                return Err(SlamError::UnknownVertex(if graph.contains(a) { b } else { a }));
            }
            let constraint = Constraint::new(
                EdgeKind::ManualLoopClosure,
                measurement,
                self.config.manual_information(),
            );
            let eid = graph.add_edge(a, b, constraint);
            (eid, graph.edge(eid).cloned())
        };
        if let Some(edge) = edge {
            self.forward(vec![SolverOp::AddEdge(edge)]);
        }
        log::info!("Added manual loop closure {} -> {}", a, b);

        self.optimize()?;
        Ok(eid)
    }

    /// Whether interactive mode is on.
    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// Flip interactive mode.
    ///
    /// Leaving interactive mode applies every staged move and optimizes
    /// once. Returns the new mode and the number of moves applied.
    pub fn toggle_interactive(&mut self) -> Result<(bool, usize), SlamError> {
        if !self.interactive {
            self.interactive = true;
            log::info!("Interactive mode enabled");
            return Ok((true, 0));
        }

        self.interactive = false;
        let moves = std::mem::take(&mut self.staged_moves);
        let mut applied = 0;
        for (id, pose) in moves {
            match self.relocate_vertex(id, pose, false) {
                Ok(()) => applied += 1,
                Err(SlamError::UnknownVertex(gone)) => {
                    log::debug!("Staged move for evicted vertex {} dropped", gone)
                }
                Err(e) => return Err(e),
            }
        }
        if applied > 0 {
            self.optimize()?;
        }
        log::info!("Interactive mode disabled, applied {} moves", applied);
        Ok((false, applied))
    }

    /// Handle a relocation event from the correction source.
    ///
    /// Staged while interactive, applied (with optimization) otherwise.
    pub fn handle_correction(&mut self, id: VertexId, pose: Pose2D) -> Result<(), SlamError> {
        if !self.interactive {
            return self.relocate_vertex(id, pose, true);
        }
        if !self.graph.read().contains(id) {
            return Err(SlamError::UnknownVertex(id));
        }
        self.staged_moves.insert(id, pose);
        Ok(())
    }

    /// Discard staged interactive moves. Returns how many were dropped.
    pub fn clear_changes(&mut self) -> usize {
        let n = self.staged_moves.len();
        self.staged_moves.clear();
        n
    }

    /// Reset graph, solver, index and lifelong state.
    ///
    /// Vertex ids keep counting from where they were.
    pub fn clear_graph(&mut self) {
        let next_vertex = {
            let mut graph = self.graph.write();
            graph.clear();
            graph.next_vertex_id()
        };
        self.solver.clear();
        self.index.clear();
        self.reset_session(next_vertex);
        log::info!("Pose graph cleared");
    }

    /// Replace the graph with a deserialized one.
    ///
    /// Every vertex and edge is replayed into the solver and the spatial
    /// index is rebuilt. Localization-only deserialization is rejected.
    pub fn restore(&mut self, restored: PoseGraph, mode: DeserializeMode) -> Result<(), SlamError> {
        if let DeserializeMode::LocalizeAtPose(_) = mode {
            return Err(SlamError::InvalidCommand(
                "localization deserialization requested while mapping".to_string(),
            ));
        }

        let mut ops = Vec::new();
        let (next_vertex, continuation) = {
            let mut graph = self.graph.write();
            let (next_vertex, next_edge) = (graph.next_vertex_id(), graph.next_edge_id());
            *graph = restored;
            graph.advance_allocators(next_vertex, next_edge);

            ops.extend(graph.vertices().map(|v| SolverOp::AddVertex(v.id, v.pose)));
            ops.extend(graph.edges().cloned().map(SolverOp::AddEdge));
            self.index.rebuild(&graph);

            log::info!(
                "Restored pose graph: {} vertices, {} edges",
                graph.num_vertices(),
                graph.num_edges()
            );
            let continuation = match mode {
                DeserializeMode::StartAtFirstNode => graph.anchor().map(|v| v.pose),
                DeserializeMode::StartAtGivenPose(p) => Some(p),
                DeserializeMode::LocalizeAtPose(_) => None,
            };
            (graph.next_vertex_id(), continuation)
        };
        self.solver.clear();
        self.forward(ops);

        self.reset_session(next_vertex);
        self.continuation = continuation;
        Ok(())
    }

    fn reset_session(&mut self, session_start: VertexId) {
        self.session_start = session_start;
        self.continuation = None;
        self.last_odom_pose = None;
        self.odom_correction = Pose2D::identity();
        self.scans_since_optimize = 0;
        self.staged_moves.clear();
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> GraphStats {
        let graph = self.graph.read();
        GraphStats {
            vertices: graph.num_vertices(),
            edges: graph.num_edges(),
            next_vertex_id: graph.next_vertex_id(),
            loop_closures: graph.num_edges_of(EdgeKind::ScanMatch)
                + graph.num_edges_of(EdgeKind::ManualLoopClosure),
            staged_moves: self.staged_moves.len(),
            interactive: self.interactive,
            ..self.stats.clone()
        }
    }
}

/// Fixed-frame footprint of a robot-frame cloud seen from `pose`.
///
/// Includes the robot position so scans with no returns still have a
/// (degenerate) footprint.
fn footprint(cloud: &PointCloud2D, pose: &Pose2D) -> BoundingBox2D {
    let mut bb = BoundingBox2D::from_point(pose.position());
    for p in cloud.iter() {
        bb.expand_to_include(&pose.transform_point(p));
    }
    bb
}

/// Map ← odom correction implied by the newest vertex of a session.
fn odometry_correction(graph: &PoseGraph, session_start: VertexId) -> Option<Pose2D> {
    graph
        .latest()
        .filter(|v| v.id >= session_start)
        .map(|v| v.pose.compose(&v.odom_pose.inverse()))
}

/// Surviving vertex closest to `pose`, ties to the older id.
fn nearest_vertex(graph: &PoseGraph, pose: &Pose2D) -> Option<(VertexId, Pose2D)> {
    graph
        .vertices()
        .min_by(|a, b| a.pose.distance(pose).total_cmp(&b.pose.distance(pose)))
        .map(|v| (v.id, v.pose))
}
