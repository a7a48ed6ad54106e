//! Bundled solver backend: Gauss-Newton with optional Levenberg-Marquardt
//! damping.
//!
//! Minimizes
//!
//! ```text
//! F(x) = Σ e(xi, xj, zij)ᵀ · Ωij · e(xi, xj, zij)
//! ```
//!
//! by repeatedly solving `H · Δx = -b` with a dense Cholesky factorization.
//! The oldest vertex is held fixed. Iteration runs on a copy of the current
//! estimates, which is only committed when the solve succeeds.

use std::collections::{BTreeMap, HashMap};

use super::pose_graph::{Edge, EdgeId, Information2D, VertexId};
use super::solver::{ScanSolver, SolverError, SolverSettings};
use crate::core::math::{normalize_angle, normalize_angle_f64};
use crate::core::types::Pose2D;

/// Chi-squared below this is numerically zero.
const ERROR_FLOOR: f64 = 1e-9;

#[derive(Debug, Clone)]
struct SolverEdge {
    from: VertexId,
    to: VertexId,
    measurement: Pose2D,
    information: Information2D,
}

/// Dense Gauss-Newton / Levenberg-Marquardt pose-graph optimizer.
#[derive(Debug)]
pub struct GaussNewtonSolver {
    settings: SolverSettings,
    use_levenberg_marquardt: bool,
    poses: BTreeMap<VertexId, Pose2D>,
    edges: BTreeMap<EdgeId, SolverEdge>,
}

impl GaussNewtonSolver {
    /// Create a solver. `use_levenberg_marquardt` enables adaptive damping.
    pub fn new(settings: SolverSettings, use_levenberg_marquardt: bool) -> Self {
        Self {
            settings,
            use_levenberg_marquardt,
            poses: BTreeMap::new(),
            edges: BTreeMap::new(),
        }
    }

    /// Current estimate of a vertex.
    pub fn pose(&self, id: VertexId) -> Option<Pose2D> {
        self.poses.get(&id).copied()
    }

    /// Chi-squared error of the given estimates.
    fn chi_squared(&self, poses: &[Pose2D], index: &HashMap<VertexId, usize>) -> f64 {
        let mut chi2 = 0.0;
        for edge in self.edges.values() {
            let (Some(&i), Some(&j)) = (index.get(&edge.from), index.get(&edge.to)) else {
                continue;
            };
            let e = edge_error(&poses[i], &poses[j], &edge.measurement);
            let we = weight_error(&e, &edge.information);
            chi2 += e[0] * we[0] + e[1] * we[1] + e[2] * we[2];
        }
        chi2
    }

    /// Build H and b for the current estimates.
    fn build_linear_system(
        &self,
        poses: &[Pose2D],
        index: &HashMap<VertexId, usize>,
    ) -> (Vec<f64>, Vec<f64>) {
        let dim = poses.len() * 3;
        let mut h = vec![0.0; dim * dim];
        let mut b = vec![0.0; dim];

        for edge in self.edges.values() {
            let (Some(&i), Some(&j)) = (index.get(&edge.from), index.get(&edge.to)) else {
                continue;
            };
            let e = edge_error(&poses[i], &poses[j], &edge.measurement);
            let (ji, jj) = jacobians(&poses[i], &poses[j]);
            add_edge_contribution(&mut h, &mut b, dim, i, j, &ji, &jj, &e, &edge.information);
        }

        // Anchor the oldest vertex.
        if dim >= 3 {
            let large_value = 1e10;
            h[0] = large_value;
            h[dim + 1] = large_value;
            h[2 * dim + 2] = large_value;
        }

        (h, b)
    }

    fn validate_edges(&self) -> Result<(), SolverError> {
        for (id, edge) in &self.edges {
            for vertex in [edge.from, edge.to] {
                if !self.poses.contains_key(&vertex) {
                    return Err(SolverError::MissingVertex { edge: *id, vertex });
                }
            }
        }
        Ok(())
    }
}

impl ScanSolver for GaussNewtonSolver {
    fn name(&self) -> &str {
        if self.use_levenberg_marquardt {
            "levenberg_marquardt"
        } else {
            "gauss_newton"
        }
    }

    fn add_vertex(&mut self, id: VertexId, initial: Pose2D) {
        self.poses.insert(id, initial);
    }

    fn add_edge(&mut self, edge: &Edge) {
        self.edges.insert(
            edge.id,
            SolverEdge {
                from: edge.from,
                to: edge.to,
                measurement: edge.constraint.measurement,
                information: edge.constraint.information,
            },
        );
    }

    fn remove_vertex(&mut self, id: VertexId) {
        self.poses.remove(&id);
        self.edges.retain(|_, e| e.from != id && e.to != id);
    }

    fn remove_edge(&mut self, id: EdgeId) {
        self.edges.remove(&id);
    }

    fn set_vertex_pose(&mut self, id: VertexId, pose: Pose2D) {
        if let Some(p) = self.poses.get_mut(&id) {
            *p = pose;
        }
    }

    fn solve(&mut self) -> Result<HashMap<VertexId, Pose2D>, SolverError> {
        self.validate_edges()?;

        let ids: Vec<VertexId> = self.poses.keys().copied().collect();
        let index: HashMap<VertexId, usize> =
            ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let mut poses: Vec<Pose2D> = self.poses.values().copied().collect();

        if self.edges.is_empty() || poses.len() < 2 {
            return Ok(ids.into_iter().zip(poses).collect());
        }

        let dim = poses.len() * 3;
        let mut current_error = self.chi_squared(&poses, &index);
        let mut lambda = self.settings.damping_factor;
        let mut iterations = 0;

        for iter in 0..self.settings.max_iterations {
            if current_error < ERROR_FLOOR {
                break;
            }
            iterations = iter + 1;

            let (mut h, b) = self.build_linear_system(&poses, &index);
            if self.use_levenberg_marquardt {
                apply_damping(&mut h, lambda, dim);
            }

            let dx = solve_cholesky(&h, &b, dim).ok_or(SolverError::SingularSystem)?;
            let candidate = apply_update(&poses, &dx);
            let new_error = self.chi_squared(&candidate, &index);

            if !new_error.is_finite() {
                return Err(SolverError::NonFinite);
            }

            if new_error > current_error * 1.1 + ERROR_FLOOR {
                if self.use_levenberg_marquardt {
                    lambda *= 10.0;
                    if lambda > 1e10 {
                        return Err(SolverError::Diverged { iterations });
                    }
                    continue;
                }
                return Err(SolverError::Diverged { iterations });
            }

            if self.use_levenberg_marquardt {
                lambda = (lambda * 0.1).max(1e-10);
            }

            let relative_change = (current_error - new_error).abs() / current_error.max(1e-10);
            poses = candidate;
            current_error = new_error;

            if relative_change < self.settings.convergence_threshold {
                break;
            }
        }

        if poses
            .iter()
            .any(|p| !(p.x.is_finite() && p.y.is_finite() && p.theta.is_finite()))
        {
            return Err(SolverError::NonFinite);
        }

        log::debug!(
            "{} solve: {} vertices, {} edges, {} iterations, chi2 {:.4}",
            self.name(),
            poses.len(),
            self.edges.len(),
            iterations,
            current_error
        );

        // Warm start the next solve from this solution.
        for (id, pose) in ids.iter().zip(&poses) {
            self.poses.insert(*id, *pose);
        }
        Ok(ids.into_iter().zip(poses).collect())
    }

    fn clear(&mut self) {
        self.poses.clear();
        self.edges.clear();
    }

    fn num_vertices(&self) -> usize {
        self.poses.len()
    }
}

/// Error = (xi⁻¹ ⊕ xj) - zij
fn edge_error(xi: &Pose2D, xj: &Pose2D, measurement: &Pose2D) -> [f64; 3] {
    let predicted = xi.inverse().compose(xj);
    [
        (predicted.x - measurement.x) as f64,
        (predicted.y - measurement.y) as f64,
        normalize_angle_f64((predicted.theta - measurement.theta) as f64),
    ]
}

fn weight_error(error: &[f64; 3], info: &Information2D) -> [f64; 3] {
    let o = omega(info);
    [
        o[0] * error[0] + o[1] * error[1] + o[2] * error[2],
        o[3] * error[0] + o[4] * error[1] + o[5] * error[2],
        o[6] * error[0] + o[7] * error[1] + o[8] * error[2],
    ]
}

fn omega(info: &Information2D) -> [f64; 9] {
    [
        info.xx as f64,
        info.xy as f64,
        info.xt as f64,
        info.xy as f64,
        info.yy as f64,
        info.yt as f64,
        info.xt as f64,
        info.yt as f64,
        info.tt as f64,
    ]
}

/// Returns (∂e/∂xi, ∂e/∂xj) as row-major 3x3 matrices.
fn jacobians(xi: &Pose2D, xj: &Pose2D) -> ([f64; 9], [f64; 9]) {
    let (sin_i, cos_i) = (xi.theta as f64).sin_cos();
    let dx = (xj.x - xi.x) as f64;
    let dy = (xj.y - xi.y) as f64;

    let ji = [
        -cos_i,
        -sin_i,
        -sin_i * dx + cos_i * dy,
        sin_i,
        -cos_i,
        -cos_i * dx - sin_i * dy,
        0.0,
        0.0,
        -1.0,
    ];
    let jj = [
        cos_i, sin_i, 0.0, //
        -sin_i, cos_i, 0.0, //
        0.0, 0.0, 1.0,
    ];
    (ji, jj)
}

#[allow(clippy::too_many_arguments)]
fn add_edge_contribution(
    h: &mut [f64],
    b: &mut [f64],
    dim: usize,
    idx_i: usize,
    idx_j: usize,
    ji: &[f64; 9],
    jj: &[f64; 9],
    error: &[f64; 3],
    info: &Information2D,
) {
    let omega = omega(info);
    let base_i = idx_i * 3;
    let base_j = idx_j * 3;

    let omega_ji = mat3_mul(&omega, ji);
    let omega_jj = mat3_mul(&omega, jj);
    let h_ii = mat3_transpose_mul(ji, &omega_ji);
    let h_ij = mat3_transpose_mul(ji, &omega_jj);
    let h_jj = mat3_transpose_mul(jj, &omega_jj);

    for r in 0..3 {
        for c in 0..3 {
            h[(base_i + r) * dim + base_i + c] += h_ii[r * 3 + c];
            h[(base_i + r) * dim + base_j + c] += h_ij[r * 3 + c];
            h[(base_j + r) * dim + base_i + c] += h_ij[c * 3 + r];
            h[(base_j + r) * dim + base_j + c] += h_jj[r * 3 + c];
        }
    }

    let omega_e = weight_error(error, info);
    for r in 0..3 {
        b[base_i + r] += ji[r] * omega_e[0] + ji[3 + r] * omega_e[1] + ji[6 + r] * omega_e[2];
        b[base_j + r] += jj[r] * omega_e[0] + jj[3 + r] * omega_e[1] + jj[6 + r] * omega_e[2];
    }
}

fn apply_damping(h: &mut [f64], lambda: f64, dim: usize) {
    for i in 0..dim {
        h[i * dim + i] += lambda * h[i * dim + i].max(1.0);
    }
}

/// Solve H · dx = -b by dense Cholesky. `None` if H is not positive definite.
fn solve_cholesky(h: &[f64], b: &[f64], dim: usize) -> Option<Vec<f64>> {
    let mut l = vec![0.0; dim * dim];

    for i in 0..dim {
        for j in 0..=i {
            let mut sum = h[i * dim + j];
            for k in 0..j {
                sum -= l[i * dim + k] * l[j * dim + k];
            }
            if i == j {
                if sum <= 0.0 {
                    return None;
                }
                l[i * dim + j] = sum.sqrt();
            } else {
                l[i * dim + j] = sum / l[j * dim + j];
            }
        }
    }

    let mut y = vec![0.0; dim];
    for i in 0..dim {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i * dim + j] * y[j];
        }
        y[i] = sum / l[i * dim + i];
    }

    let mut x = vec![0.0; dim];
    for i in (0..dim).rev() {
        let mut sum = y[i];
        for j in (i + 1)..dim {
            sum -= l[j * dim + i] * x[j];
        }
        x[i] = sum / l[i * dim + i];
    }

    Some(x.into_iter().map(|v| -v).collect())
}

/// Apply dx to every pose except the anchor at index 0.
fn apply_update(poses: &[Pose2D], dx: &[f64]) -> Vec<Pose2D> {
    poses
        .iter()
        .enumerate()
        .map(|(idx, pose)| {
            if idx == 0 {
                return *pose;
            }
            let base = idx * 3;
            Pose2D {
                x: pose.x + dx[base] as f32,
                y: pose.y + dx[base + 1] as f32,
                theta: normalize_angle(pose.theta + dx[base + 2] as f32),
            }
        })
        .collect()
}

fn mat3_mul(a: &[f64; 9], b: &[f64; 9]) -> [f64; 9] {
    let mut c = [0.0; 9];
    for i in 0..3 {
        for j in 0..3 {
            for k in 0..3 {
                c[i * 3 + j] += a[i * 3 + k] * b[k * 3 + j];
            }
        }
    }
    c
}

/// Aᵀ · B
fn mat3_transpose_mul(a: &[f64; 9], b: &[f64; 9]) -> [f64; 9] {
    let mut c = [0.0; 9];
    for i in 0..3 {
        for j in 0..3 {
            for k in 0..3 {
                c[i * 3 + j] += a[k * 3 + i] * b[k * 3 + j];
            }
        }
    }
    c
}
