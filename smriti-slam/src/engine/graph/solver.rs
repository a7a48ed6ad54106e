//! Solver port: the contract between the pose graph manager and an
//! external pose-graph optimizer.
//!
//! The manager mirrors every graph change into the solver incrementally
//! (vertices, edges, removals) and asks it to [`ScanSolver::solve`] for
//! corrected poses. Backends are looked up by name in a static registry,
//! once, at startup; an unknown name is a fatal configuration error.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::gauss_newton::GaussNewtonSolver;
use super::pose_graph::{Edge, EdgeId, VertexId};
use crate::core::types::Pose2D;
use crate::error::SlamError;

/// Reasons a solve can fail. Never fatal to ingestion.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    /// The normal equations could not be factorized.
    #[error("linear system is not positive definite")]
    SingularSystem,

    /// The error grew and damping could not recover it.
    #[error("optimization diverged after {iterations} iterations")]
    Diverged {
        /// Iterations performed before giving up.
        iterations: u32,
    },

    /// A pose became NaN or infinite.
    #[error("optimization produced non-finite poses")]
    NonFinite,

    /// An edge references a vertex the solver does not hold.
    #[error("edge {edge} references unknown vertex {vertex}")]
    MissingVertex {
        /// Offending edge.
        edge: EdgeId,
        /// Missing endpoint.
        vertex: VertexId,
    },

    /// Backend-specific failure.
    #[error("solver backend error: {0}")]
    Backend(String),
}

/// Incrementally fed pose-graph optimizer.
///
/// Implementations hold the oldest vertex they know about fixed, which
/// removes the gauge freedom of the problem. A failed [`solve`] must leave
/// the solver's own state as it was before the call.
///
/// [`solve`]: ScanSolver::solve
pub trait ScanSolver: Send {
    /// Registry name of the backend.
    fn name(&self) -> &str;

    /// Add a vertex with its initial pose estimate.
    fn add_vertex(&mut self, id: VertexId, initial: Pose2D);

    /// Add a constraint.
    fn add_edge(&mut self, edge: &Edge);

    /// Remove a vertex and every edge touching it.
    fn remove_vertex(&mut self, id: VertexId);

    /// Remove one edge.
    fn remove_edge(&mut self, id: EdgeId);

    /// Overwrite the current estimate of a vertex.
    fn set_vertex_pose(&mut self, id: VertexId, pose: Pose2D);

    /// Optimize and return the corrected pose of every held vertex.
    fn solve(&mut self) -> Result<HashMap<VertexId, Pose2D>, SolverError>;

    /// Forget everything.
    fn clear(&mut self);

    /// Number of vertices held.
    fn num_vertices(&self) -> usize;
}

/// Tuning shared by the bundled backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Maximum number of iterations.
    pub max_iterations: u32,

    /// Convergence threshold for relative error change.
    pub convergence_threshold: f64,

    /// Initial Levenberg-Marquardt damping factor.
    pub damping_factor: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            convergence_threshold: 1e-6,
            damping_factor: 1e-3,
        }
    }
}

type SolverFactory = fn(&SolverSettings) -> Box<dyn ScanSolver>;

fn gauss_newton(settings: &SolverSettings) -> Box<dyn ScanSolver> {
    Box::new(GaussNewtonSolver::new(settings.clone(), false))
}

fn levenberg_marquardt(settings: &SolverSettings) -> Box<dyn ScanSolver> {
    Box::new(GaussNewtonSolver::new(settings.clone(), true))
}

static SOLVERS: &[(&str, SolverFactory)] = &[
    ("gauss_newton", gauss_newton),
    ("levenberg_marquardt", levenberg_marquardt),
];

/// Names of all registered backends.
pub fn available_solvers() -> Vec<&'static str> {
    SOLVERS.iter().map(|(name, _)| *name).collect()
}

/// Whether a backend name is registered.
pub fn is_registered(name: &str) -> bool {
    SOLVERS.iter().any(|(n, _)| *n == name)
}

/// Instantiate a backend by name.
pub fn create_solver(
    name: &str,
    settings: &SolverSettings,
) -> Result<Box<dyn ScanSolver>, SlamError> {
    SOLVERS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, factory)| factory(settings))
        .ok_or_else(|| {
            SlamError::ConfigurationFatal(format!(
                "unknown solver '{}' (available: {})",
                name,
                available_solvers().join(", ")
            ))
        })
}
