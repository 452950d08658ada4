//! NLP solver seam and the default Gauss-Newton SQP solver.
//!
//! Each SQP iteration linearizes the program and solves the QP subproblem
//! with Clarabel (pure Rust interior-point solver):
//!
//! ```text
//! minimize    1/2 d^T (2 J^T J + D) d + (2 J^T r)^T d
//! subject to  c + A_eq d  = 0
//!             g + A_in d >= 0
//! ```
//!
//! `D` is a Levenberg-Marquardt diagonal, raised whenever Clarabel cannot
//! finish a subproblem. The step is then scaled by a backtracking line
//! search on the l1 merit `||r||^2 + rho (||c||_1 + sum max(0, -g))`.

use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettings, DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus,
    SupportedConeT::{self, NonnegativeConeT, ZeroConeT},
};
use nalgebra::DVector;
use std::collections::BTreeMap;
use strider_core::{HessianMode, SolverConfiguration, SolverError};
use tracing::{debug, info, warn};

use crate::nlp::{BlockKind, Linearization, Nlp, NlpEvaluation, inf_norm};

/// Linear-solver backends accepted for the QP subproblems.
pub const SUPPORTED_LINEAR_SOLVERS: &[&str] = &["qdldl"];

/// Levenberg-Marquardt damping levels tried in turn on each QP subproblem.
///
/// Level `lambda` adds `lambda * max(H_ii, 1)` to every diagonal entry of
/// the Gauss-Newton block.
const QP_DAMPING: [f64; 4] = [1e-8, 1e-6, 1e-4, 1e-2];
/// Interior-point iteration cap of each QP subproblem.
const QP_MAX_ITER: u32 = 200;
const QP_TOLERANCE: f64 = 1e-8;
const ARMIJO: f64 = 1e-4;
const MAX_BACKTRACKS: usize = 30;

/// Outcome of a solve that returned normally.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolveStatus {
    /// Step and constraint violation below tolerance.
    Converged,
    /// Iteration cap reached first.
    MaxIterations,
    /// The line search could not reduce the merit function.
    Stalled,
}

impl SolveStatus {
    pub const fn is_converged(self) -> bool {
        matches!(self, Self::Converged)
    }
}

/// Final iterate of a solve.
#[derive(Clone, Debug, PartialEq)]
pub struct NlpSolution {
    pub x: DVector<f64>,
    pub cost: f64,
    pub constraint_violation: f64,
    pub iterations: usize,
    pub status: SolveStatus,
}

/// A nonlinear-programming backend.
///
/// Non-convergence is a normal return with a non-converged
/// [`SolveStatus`]; `Err` is reserved for a breakdown of the solve itself.
pub trait NlpSolver: Send + Sync {
    fn solve(&self, nlp: &Nlp) -> Result<NlpSolution, SolverError>;
}

/// Gauss-Newton SQP with Clarabel QP subproblems.
#[derive(Clone, Debug, Default)]
pub struct SqpSolver {
    config: SolverConfiguration,
}

struct QpStep {
    direction: DVector<f64>,
    gradient: DVector<f64>,
    max_multiplier: f64,
}

/// QP subproblem data in Clarabel form `A d + s = b`, `s` in `cones`.
struct QpData {
    n: usize,
    /// Undamped Gauss-Newton block, upper triangle keyed `(col, row)`.
    hessian: BTreeMap<(usize, usize), f64>,
    gradient: DVector<f64>,
    q: Vec<f64>,
    a: CscMatrix<f64>,
    b: Vec<f64>,
    cones: Vec<SupportedConeT<f64>>,
}

impl QpData {
    fn assemble(nlp: &Nlp, lin: &Linearization, diagonal_only: bool) -> Self {
        let n = nlp.n_variables();
        let n_eq = nlp.n_equalities();
        let n_in = nlp.n_inequalities();

        let mut hessian: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        let mut gradient = DVector::zeros(n);
        let mut constraints: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        let mut rhs = vec![0.0; n_eq + n_in];

        for bj in &lin.jacobians {
            let vars = nlp.blocks()[bj.block].vars();
            let rows = bj.jac.nrows();
            match bj.kind {
                BlockKind::Residual => {
                    let r = lin.values.residuals.rows(bj.row_offset, rows);
                    let g = bj.jac.tr_mul(&r) * 2.0;
                    let jtj = bj.jac.tr_mul(&bj.jac) * 2.0;
                    for (a, &col) in vars.iter().enumerate() {
                        gradient[col] += g[a];
                        for (b, &row) in vars.iter().enumerate() {
                            let keep = if diagonal_only { row == col } else { row <= col };
                            if keep && jtj[(b, a)] != 0.0 {
                                *hessian.entry((col, row)).or_insert(0.0) += jtj[(b, a)];
                            }
                        }
                    }
                }
                BlockKind::Equality | BlockKind::Inequality => {
                    // Equalities: A = J, b = -c. Inequalities: A = -J, b = g,
                    // so that s = g + J d >= 0.
                    let (base, sign, values) = if bj.kind == BlockKind::Equality {
                        (0, 1.0, &lin.values.equalities)
                    } else {
                        (n_eq, -1.0, &lin.values.inequalities)
                    };
                    for r in 0..rows {
                        let row = base + bj.row_offset + r;
                        rhs[row] = -sign * values[bj.row_offset + r];
                        for (a, &col) in vars.iter().enumerate() {
                            let v = bj.jac[(r, a)];
                            if v != 0.0 {
                                *constraints.entry((col, row)).or_insert(0.0) += sign * v;
                            }
                        }
                    }
                }
            }
        }

        let mut cones: Vec<SupportedConeT<f64>> = Vec::new();
        if n_eq > 0 {
            cones.push(ZeroConeT(n_eq));
        }
        if n_in > 0 {
            cones.push(NonnegativeConeT(n_in));
        }
        Self {
            n,
            hessian,
            q: gradient.iter().copied().collect(),
            gradient,
            a: csc_from_entries(n_eq + n_in, n, &constraints),
            b: rhs,
            cones,
        }
    }

    /// Gauss-Newton block with `lambda * max(H_ii, 1)` added on the diagonal.
    fn damped_hessian(&self, lambda: f64) -> BTreeMap<(usize, usize), f64> {
        let mut damped = self.hessian.clone();
        for i in 0..self.n {
            let entry = damped.entry((i, i)).or_insert(0.0);
            let h = *entry;
            *entry = h + lambda * h.max(1.0);
        }
        damped
    }
}

impl SqpSolver {
    pub const fn new(config: SolverConfiguration) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &SolverConfiguration {
        &self.config
    }

    fn qp_settings(&self) -> Result<DefaultSettings<f64>, SolverError> {
        let method = self.config.linear_solver.as_str();
        if !SUPPORTED_LINEAR_SOLVERS.contains(&method) {
            return Err(SolverError::new(format!(
                "unsupported linear solver '{method}' (expected one of {SUPPORTED_LINEAR_SOLVERS:?})"
            )));
        }
        DefaultSettingsBuilder::default()
            .max_iter(QP_MAX_ITER)
            .verbose(self.config.verbosity >= 2)
            .tol_gap_abs(QP_TOLERANCE)
            .tol_gap_rel(QP_TOLERANCE)
            .tol_feas(QP_TOLERANCE)
            .direct_solve_method(method.to_string())
            .build()
            .map_err(|e| SolverError::new(format!("invalid QP settings: {e}")))
    }

    /// Assemble and solve the QP subproblem at `lin`.
    ///
    /// A QP the interior-point method cannot finish is solved again with
    /// stronger damping before the failure is reported.
    fn solve_qp(
        &self,
        nlp: &Nlp,
        lin: &Linearization,
        settings: &DefaultSettings<f64>,
    ) -> Result<QpStep, SolverError> {
        let qp = QpData::assemble(nlp, lin, self.config.hessian == HessianMode::Approximate);
        let mut settings = settings.clone();
        let mut last_status = String::new();
        for (attempt, &damping) in QP_DAMPING.iter().enumerate() {
            let p = csc_from_entries(qp.n, qp.n, &qp.damped_hessian(damping));
            if attempt > 0 {
                settings.static_regularization_constant *= 10.0;
            }
            let mut solver =
                DefaultSolver::new(&p, &qp.q, &qp.a, &qp.b, &qp.cones, settings.clone())
                    .map_err(|_| SolverError::new("QP subproblem setup rejected the data"))?;
            solver.solve();
            let sol = &solver.solution;
            if matches!(sol.status, SolverStatus::Solved | SolverStatus::AlmostSolved) {
                return Ok(QpStep {
                    direction: DVector::from_column_slice(&sol.x),
                    gradient: qp.gradient,
                    max_multiplier: sol.z.iter().fold(0.0_f64, |acc, z| acc.max(z.abs())),
                });
            }
            last_status = format!("{:?}", sol.status);
            warn!(attempt, damping, status = %last_status, "QP subproblem not solved");
        }
        Err(SolverError::new(format!(
            "QP subproblem ended with {last_status} at damping {:e}",
            QP_DAMPING[QP_DAMPING.len() - 1]
        )))
    }

    fn log_iteration(&self, iteration: usize, values: &NlpEvaluation, step: f64, alpha: f64) {
        let (cost, violation) = (values.cost(), values.max_violation());
        if self.config.verbosity >= 1 {
            info!(iteration, cost, violation, step, alpha, "sqp iteration");
        } else {
            debug!(iteration, cost, violation, step, alpha, "sqp iteration");
        }
    }
}

fn finish(
    x: DVector<f64>,
    values: &NlpEvaluation,
    iterations: usize,
    status: SolveStatus,
) -> NlpSolution {
    NlpSolution {
        x,
        cost: values.cost(),
        constraint_violation: values.max_violation(),
        iterations,
        status,
    }
}

impl NlpSolver for SqpSolver {
    fn solve(&self, nlp: &Nlp) -> Result<NlpSolution, SolverError> {
        let settings = self.qp_settings()?;
        let tol = self.config.tolerance;
        let max_iterations = self.config.max_iterations as usize;

        let mut z = nlp.initial_guess();
        let mut values = nlp.evaluate(&z);
        if !values.is_finite() {
            return Err(SolverError::new(
                "non-finite objective or constraints at the initial guess",
            ));
        }
        let mut penalty = 1.0_f64;

        for iteration in 0..max_iterations {
            let lin = nlp.linearize(&z);
            let step = self
                .solve_qp(nlp, &lin, &settings)
                .map_err(|e| e.with_progress(iteration, Some(values.cost())))?;

            let step_norm = inf_norm(&step.direction);
            if step_norm <= tol * (1.0 + inf_norm(&z)) && values.max_violation() <= tol {
                self.log_iteration(iteration, &values, step_norm, 0.0);
                return Ok(finish(z, &values, iteration, SolveStatus::Converged));
            }

            // The merit ignores the part of each violation below tolerance.
            penalty = penalty.max(1.1 * step.max_multiplier);
            let violation = values.l1_violation_above(tol);
            let merit = values.cost() + penalty * violation;
            let slope = (step.gradient.dot(&step.direction) - penalty * violation).min(0.0);

            let mut alpha = 1.0;
            let mut accepted = None;
            for _ in 0..MAX_BACKTRACKS {
                let trial = &z + &step.direction * alpha;
                let trial_values = nlp.evaluate(&trial);
                if trial_values.is_finite() {
                    let trial_merit =
                        trial_values.cost() + penalty * trial_values.l1_violation_above(tol);
                    if trial_merit <= merit + ARMIJO * alpha * slope {
                        accepted = Some((trial, trial_values));
                        break;
                    }
                }
                alpha *= 0.5;
            }

            let Some((trial, trial_values)) = accepted else {
                if values.max_violation() <= tol && step_norm <= tol.sqrt() * (1.0 + inf_norm(&z)) {
                    debug!(iteration, step_norm, "no merit decrease left at a feasible point");
                    return Ok(finish(z, &values, iteration, SolveStatus::Converged));
                }
                warn!(iteration, merit, "line search failed to reduce the merit function");
                return Ok(finish(z, &values, iteration, SolveStatus::Stalled));
            };
            z = trial;
            values = trial_values;
            self.log_iteration(iteration + 1, &values, step_norm, alpha);
        }

        Ok(finish(z, &values, max_iterations, SolveStatus::MaxIterations))
    }
}

/// Build a CSC matrix from entries keyed `(col, row)`, already in column-major order.
fn csc_from_entries(
    nrows: usize,
    ncols: usize,
    entries: &BTreeMap<(usize, usize), f64>,
) -> CscMatrix<f64> {
    let mut colptr = vec![0usize; ncols + 1];
    let mut rowval = Vec::with_capacity(entries.len());
    let mut nzval = Vec::with_capacity(entries.len());
    for (&(col, row), &v) in entries {
        colptr[col + 1] += 1;
        rowval.push(row);
        nzval.push(v);
    }
    for j in 0..ncols {
        colptr[j + 1] += colptr[j];
    }
    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn config() -> SolverConfiguration {
        SolverConfiguration {
            tolerance: 1e-6,
            max_iterations: 50,
            ..SolverConfiguration::default()
        }
    }

    fn solve(nlp: &Nlp) -> NlpSolution {
        SqpSolver::new(config()).solve(nlp).unwrap()
    }

    fn scalar(v: f64) -> DVector<f64> {
        DVector::from_element(1, v)
    }

    #[test]
    fn unconstrained_least_squares() {
        let mut nlp = Nlp::new();
        nlp.add_variables(&[0.0, 0.0]);
        nlp.add_residual("fit", vec![0, 1], 2, |z| {
            DVector::from_vec(vec![z[0] - 1.0, z[1] - 2.0])
        });
        let sol = solve(&nlp);
        assert_eq!(sol.status, SolveStatus::Converged);
        assert_relative_eq!(sol.x[0], 1.0, epsilon = 1e-5);
        assert_relative_eq!(sol.x[1], 2.0, epsilon = 1e-5);
    }

    #[test]
    fn equality_projection() {
        let mut nlp = Nlp::new();
        nlp.add_variables(&[0.0, 0.0]);
        nlp.add_residual("fit", vec![0, 1], 2, |z| {
            DVector::from_vec(vec![z[0] - 1.0, z[1] - 2.0])
        });
        nlp.add_equality("line", vec![0, 1], 1, |z| scalar(z[0] + z[1] - 1.0));
        let sol = solve(&nlp);
        assert!(sol.status.is_converged());
        assert_relative_eq!(sol.x[0], 0.0, epsilon = 1e-5);
        assert_relative_eq!(sol.x[1], 1.0, epsilon = 1e-5);
        assert!(sol.constraint_violation < 1e-6);
    }

    #[test]
    fn active_inequality() {
        let mut nlp = Nlp::new();
        nlp.add_variables(&[2.0]);
        nlp.add_residual("pull", vec![0], 1, |z| scalar(z[0] + 1.0));
        nlp.add_inequality("floor", vec![0], 1, |z| scalar(z[0]));
        let sol = solve(&nlp);
        assert!(sol.status.is_converged());
        assert_relative_eq!(sol.x[0], 0.0, epsilon = 1e-5);
        assert_relative_eq!(sol.cost, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn nonlinear_residual() {
        let mut nlp = Nlp::new();
        nlp.add_variables(&[1.0]);
        nlp.add_residual("root", vec![0], 1, |z| scalar(z[0] * z[0] - 2.0));
        let sol = solve(&nlp);
        assert!(sol.status.is_converged());
        assert_relative_eq!(sol.x[0], 2.0_f64.sqrt(), epsilon = 1e-5);
        assert!(sol.iterations > 1);
    }

    #[test]
    fn iteration_cap_is_not_an_error() {
        let mut nlp = Nlp::new();
        nlp.add_variables(&[1.0]);
        nlp.add_residual("root", vec![0], 1, |z| scalar(z[0] * z[0] - 2.0));
        let solver = SqpSolver::new(SolverConfiguration {
            max_iterations: 1,
            ..config()
        });
        let sol = solver.solve(&nlp).unwrap();
        assert_eq!(sol.status, SolveStatus::MaxIterations);
        assert_eq!(sol.iterations, 1);
    }

    #[test]
    fn approximate_hessian_solves_separable_problem() {
        let mut nlp = Nlp::new();
        nlp.add_variables(&[0.0, 0.0]);
        nlp.add_residual("a", vec![0], 1, |z| scalar(z[0] - 3.0));
        nlp.add_residual("b", vec![1], 1, |z| scalar(z[0] + 7.0));
        let solver = SqpSolver::new(SolverConfiguration {
            hessian: HessianMode::Approximate,
            ..config()
        });
        let sol = solver.solve(&nlp).unwrap();
        assert_relative_eq!(sol.x[0], 3.0, epsilon = 1e-3);
        assert_relative_eq!(sol.x[1], -7.0, epsilon = 1e-3);
    }

    #[test]
    fn damping_scales_with_the_gauss_newton_diagonal() {
        let mut nlp = Nlp::new();
        nlp.add_variables(&[0.0, 0.0]);
        nlp.add_residual("fit", vec![0], 1, |z| scalar(10.0 * z[0] - 1.0));
        nlp.add_equality("tie", vec![0, 1], 1, |z| scalar(z[1] - z[0]));
        let qp = QpData::assemble(&nlp, &nlp.linearize(&nlp.initial_guess()), false);
        let damped = qp.damped_hessian(1e-2);
        assert_eq!(damped.len(), 2);
        assert_relative_eq!(damped[&(0, 0)], 200.0 * 1.01, epsilon = 1e-6);
        // z1 has no Gauss-Newton curvature and gets the unit floor.
        assert_relative_eq!(damped[&(1, 1)], 1e-2, epsilon = 1e-12);
        assert_eq!(qp.b, vec![0.0]);
    }

    #[test]
    fn variables_held_only_by_stiff_equalities() {
        // Like collocation interior states: y, w enter no residual.
        let mut nlp = Nlp::new();
        nlp.add_variables(&[0.0, 0.0, 0.0]);
        nlp.add_residual("fit", vec![0], 1, |z| scalar(z[0] - 2.0));
        nlp.add_equality("stiff", vec![0, 1, 2], 2, |z| {
            DVector::from_vec(vec![1e3 * z[1] - z[0], z[2] - z[1] * z[1] * 1e6])
        });
        let sol = solve(&nlp);
        assert!(sol.status.is_converged(), "{:?}", sol.status);
        assert_relative_eq!(sol.x[0], 2.0, epsilon = 1e-5);
        assert_relative_eq!(sol.x[1], 2e-3, epsilon = 1e-7);
        assert_relative_eq!(sol.x[2], 4.0, epsilon = 1e-4);
    }

    #[test]
    fn unknown_linear_solver_is_a_failure() {
        let mut nlp = Nlp::new();
        nlp.add_variables(&[0.0]);
        nlp.add_residual("fit", vec![0], 1, |z| scalar(z[0]));
        let solver = SqpSolver::new(SolverConfiguration {
            linear_solver: "ma57".into(),
            ..config()
        });
        let err = solver.solve(&nlp).unwrap_err();
        assert!(err.message.contains("ma57"));
        assert_eq!(err.iterations, 0);
    }

    #[test]
    fn csc_layout_is_column_major() {
        let entries: BTreeMap<(usize, usize), f64> =
            [((0, 0), 1.0), ((1, 0), 2.0), ((1, 1), 3.0)].into_iter().collect();
        let m = csc_from_entries(2, 2, &entries);
        assert_eq!(m.colptr, vec![0, 1, 3]);
        assert_eq!(m.rowval, vec![0, 0, 1]);
        assert_eq!(m.nzval, vec![1.0, 2.0, 3.0]);
    }
}
