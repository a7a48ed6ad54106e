//! Pose graph: vertices, constraints, solver plugins and the manager that
//! keeps them consistent.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      POSE GRAPH                             │
//! │                                                             │
//! │    Vertices: one per accepted scan (pose, scan, footprint)  │
//! │                                                             │
//! │    Edges: relative-pose constraints                         │
//! │           - Odometry (previous vertex of the session)       │
//! │           - ScanMatch (nearby vertices)                     │
//! │           - ManualLoopClosure / ManualCorrection            │
//! │                                                             │
//! │    [V0] ──odom──▶ [V1] ──odom──▶ [V2] ──odom──▶ [V3]        │
//! │     │                              ▲                        │
//! │     └─────────── scan match ───────┘                        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 SOLVER (registered by name)                 │
//! │                                                             │
//! │    Mirrors the graph, returns corrected poses or an error.  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`PoseGraph`]: vertex/edge store with monotone id allocation
//! - [`SpatialIndex`]: radius queries by tree or link traversal
//! - [`ScanSolver`]: solver plugin seam, see [`create_solver`]
//! - [`LaserRegistry`]: per-frame laser geometry
//! - [`PoseGraphManager`]: the single writer of all of the above

mod gauss_newton;
mod laser;
mod manager;
pub(crate) mod pose_graph;
mod solver;
mod spatial_index;

pub use gauss_newton::GaussNewtonSolver;
pub use laser::{LaserGeometry, LaserRegistry};
pub use manager::{
    AddScanRejection, DeserializeMode, GraphStats, PoseGraphConfig, PoseGraphManager,
    ScanOutcome, SharedGraph,
};
pub use pose_graph::{
    Constraint, Edge, EdgeId, EdgeKind, Information2D, NewVertex, PoseGraph, RetentionState,
    Vertex, VertexId,
};
pub use solver::{
    ScanSolver, SolverError, SolverSettings, available_solvers, create_solver, is_registered,
};
pub use spatial_index::{SearchStrategy, SpatialIndex};
