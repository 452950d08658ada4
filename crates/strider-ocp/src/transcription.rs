//! Transcription strategies: how one phase's continuous dynamics become
//! defect constraints of the NLP.
//!
//! Both strategies see the same node layout (states at `n + 1` nodes,
//! piecewise-constant controls on `n` intervals). Collocation additionally
//! owns `degree` interior states per interval.

use std::f64::consts::PI;
use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use strider_core::{InfeasibleProblemError, TranscriptionScheme};
use strider_model::PhaseModel;

use crate::nlp::Nlp;
use crate::problem::PhaseLayout;

/// One classical Runge-Kutta step of length `h`.
pub fn rk4_step(
    model: &dyn PhaseModel,
    x: &DVector<f64>,
    u: &DVector<f64>,
    h: f64,
) -> DVector<f64> {
    let k1 = model.state_derivative(x, u);
    let k2 = model.state_derivative(&(x + &k1 * (h / 2.0)), u);
    let k3 = model.state_derivative(&(x + &k2 * (h / 2.0)), u);
    let k4 = model.state_derivative(&(x + &k3 * h), u);
    x + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (h / 6.0)
}

/// Integrate over `duration` with `steps` equal RK4 steps, holding `u`.
#[allow(clippy::cast_precision_loss)]
pub fn rk4_integrate(
    model: &dyn PhaseModel,
    x: &DVector<f64>,
    u: &DVector<f64>,
    duration: f64,
    steps: usize,
) -> DVector<f64> {
    let steps = steps.max(1);
    let h = duration / steps as f64;
    (0..steps).fold(x.clone(), |x, _| rk4_step(model, &x, u, h))
}

/// Strategy that appends one phase's dynamics to the NLP.
pub trait Transcription: Send + Sync {
    fn scheme(&self) -> TranscriptionScheme;

    /// Add defect constraints (and any scheme-owned variables) for `layout`.
    fn append_phase(&self, nlp: &mut Nlp, layout: &PhaseLayout, model: &Arc<dyn PhaseModel>);
}

/// Strategy object for `scheme`, after validating its parameters.
pub fn transcription_for(
    scheme: TranscriptionScheme,
) -> Result<Box<dyn Transcription>, InfeasibleProblemError> {
    scheme.validate()?;
    Ok(match scheme {
        TranscriptionScheme::Rk4 { steps } => Box::new(Rk4 { steps }),
        TranscriptionScheme::Collocation { degree } => Box::new(Collocation::new(degree)),
    })
}

fn interval_vars(layout: &PhaseLayout, k: usize, extra: &[usize]) -> Vec<usize> {
    layout.states[k]
        .clone()
        .chain(extra.iter().copied())
        .chain(layout.controls[k].clone())
        .chain(layout.states[k + 1].clone())
        .collect()
}

// ---------------------------------------------------------------------------
// Explicit RK4
// ---------------------------------------------------------------------------

/// Multiple shooting with `steps` RK4 substeps per control interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rk4 {
    pub steps: usize,
}

impl Transcription for Rk4 {
    fn scheme(&self) -> TranscriptionScheme {
        TranscriptionScheme::Rk4 { steps: self.steps }
    }

    fn append_phase(&self, nlp: &mut Nlp, layout: &PhaseLayout, model: &Arc<dyn PhaseModel>) {
        let (nx, nu) = (layout.nx, layout.nu);
        let h = layout.timing.interval();
        for k in 0..layout.timing.shooting_nodes {
            let model = Arc::clone(model);
            let steps = self.steps;
            nlp.add_equality(
                format!("phase{}/rk4/{k}", layout.index),
                interval_vars(layout, k, &[]),
                nx,
                move |z| {
                    let x = z.rows(0, nx).into_owned();
                    let u = z.rows(nx, nu).into_owned();
                    let next = z.rows(nx + nu, nx).into_owned();
                    next - rk4_integrate(model.as_ref(), &x, &u, h, steps)
                },
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Legendre-Gauss collocation
// ---------------------------------------------------------------------------

/// `P_n(x)` and `P_n'(x)` by the three-term recurrence.
#[allow(clippy::cast_precision_loss)]
fn legendre(n: usize, x: f64) -> (f64, f64) {
    let (mut prev, mut p) = (1.0, x);
    for k in 2..=n {
        let kf = k as f64;
        let next = ((2.0 * kf - 1.0) * x * p - (kf - 1.0) * prev) / kf;
        prev = p;
        p = next;
    }
    let dp = n as f64 * (x * p - prev) / (x * x - 1.0);
    (p, dp)
}

/// Roots of the Legendre polynomial of `degree`, mapped to (0, 1), ascending.
#[allow(clippy::cast_precision_loss)]
pub fn legendre_roots(degree: usize) -> Vec<f64> {
    let n = degree as f64;
    let mut roots: Vec<f64> = (1..=degree)
        .map(|i| {
            let mut x = (PI * (i as f64 - 0.25) / (n + 0.5)).cos();
            for _ in 0..100 {
                let (p, dp) = legendre(degree, x);
                let dx = p / dp;
                x -= dx;
                if dx.abs() < 1e-15 {
                    break;
                }
            }
            0.5 * (1.0 + x)
        })
        .collect();
    roots.sort_by(f64::total_cmp);
    roots
}

fn lagrange(points: &[f64], j: usize, t: f64) -> f64 {
    points
        .iter()
        .enumerate()
        .filter(|&(m, _)| m != j)
        .map(|(_, &tm)| (t - tm) / (points[j] - tm))
        .product()
}

fn lagrange_derivative(points: &[f64], j: usize, t: f64) -> f64 {
    (0..points.len())
        .filter(|&l| l != j)
        .map(|l| {
            let rest: f64 = points
                .iter()
                .enumerate()
                .filter(|&(m, _)| m != j && m != l)
                .map(|(_, &tm)| (t - tm) / (points[j] - tm))
                .product();
            rest / (points[j] - points[l])
        })
        .sum()
}

/// Direct collocation on Legendre-Gauss points with a Lagrange state basis
/// through the interval start and the `degree` interior points.
#[derive(Clone, Debug, PartialEq)]
pub struct Collocation {
    degree: usize,
    /// `[0, tau_1, ..., tau_d]` on the unit interval.
    points: Vec<f64>,
    /// `derivative[(j, r)] = l_j'(tau_r)`.
    derivative: DMatrix<f64>,
    /// `end_weights[j] = l_j(1)`.
    end_weights: DVector<f64>,
}

impl Collocation {
    pub fn new(degree: usize) -> Self {
        let mut points = vec![0.0];
        points.extend(legendre_roots(degree));
        let size = degree + 1;
        let derivative =
            DMatrix::from_fn(size, size, |j, r| lagrange_derivative(&points, j, points[r]));
        let end_weights = DVector::from_fn(size, |j, _| lagrange(&points, j, 1.0));
        Self {
            degree,
            points,
            derivative,
            end_weights,
        }
    }

    pub const fn degree(&self) -> usize {
        self.degree
    }

    pub fn points(&self) -> &[f64] {
        &self.points
    }

    pub const fn end_weights(&self) -> &DVector<f64> {
        &self.end_weights
    }

    /// Collocation and continuity defects of one interval.
    ///
    /// `states[0]` is the interval start, `states[1..]` the interior
    /// points; rows are `[collocation_1, ..., collocation_d, continuity]`.
    pub fn defects(
        &self,
        model: &dyn PhaseModel,
        states: &[DVector<f64>],
        u: &DVector<f64>,
        next: &DVector<f64>,
        h: f64,
    ) -> DVector<f64> {
        let nx = next.len();
        let mut out = DVector::zeros(nx * (self.degree + 1));
        for r in 1..=self.degree {
            let mut slope = DVector::zeros(nx);
            for (j, xj) in states.iter().enumerate() {
                slope += xj * self.derivative[(j, r)];
            }
            let defect = slope - model.state_derivative(&states[r], u) * h;
            out.rows_mut((r - 1) * nx, nx).copy_from(&defect);
        }
        let mut end = DVector::zeros(nx);
        for (j, xj) in states.iter().enumerate() {
            end += xj * self.end_weights[j];
        }
        out.rows_mut(self.degree * nx, nx).copy_from(&(next - end));
        out
    }
}

impl Transcription for Collocation {
    fn scheme(&self) -> TranscriptionScheme {
        TranscriptionScheme::Collocation {
            degree: self.degree,
        }
    }

    fn append_phase(&self, nlp: &mut Nlp, layout: &PhaseLayout, model: &Arc<dyn PhaseModel>) {
        let (nx, nu, d) = (layout.nx, layout.nu, self.degree);
        let h = layout.timing.interval();
        for k in 0..layout.timing.shooting_nodes {
            let start = nlp.initial_values(layout.states[k].clone()).to_vec();
            let end = nlp.initial_values(layout.states[k + 1].clone()).to_vec();
            let guess: Vec<f64> = self.points[1..]
                .iter()
                .flat_map(|&tau| {
                    start
                        .iter()
                        .zip(&end)
                        .map(move |(a, b)| a + tau * (b - a))
                })
                .collect();
            let interior: Vec<usize> = nlp.add_variables(&guess).collect();

            let model = Arc::clone(model);
            let scheme = self.clone();
            nlp.add_equality(
                format!("phase{}/collocation/{k}", layout.index),
                interval_vars(layout, k, &interior),
                nx * (d + 1),
                move |z| {
                    let states: Vec<DVector<f64>> =
                        (0..=d).map(|j| z.rows(j * nx, nx).into_owned()).collect();
                    let u = z.rows((d + 1) * nx, nu).into_owned();
                    let next = z.rows((d + 1) * nx + nu, nx).into_owned();
                    scheme.defects(model.as_ref(), &states, &u, &next, h)
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use strider_model::LinearIntegratorModel;

    #[test]
    fn legendre_roots_low_degree() {
        assert_relative_eq!(legendre_roots(1)[0], 0.5, epsilon = 1e-14);
        let r2 = legendre_roots(2);
        let offset = 0.5 / 3.0_f64.sqrt();
        assert_relative_eq!(r2[0], 0.5 - offset, epsilon = 1e-14);
        assert_relative_eq!(r2[1], 0.5 + offset, epsilon = 1e-14);
    }

    #[test]
    fn roots_are_interior_and_sorted() {
        for degree in 1..=TranscriptionScheme::MAX_COLLOCATION_DEGREE {
            let roots = legendre_roots(degree);
            assert_eq!(roots.len(), degree);
            assert!(roots.windows(2).all(|w| w[0] < w[1]));
            assert!(roots.iter().all(|&t| t > 0.0 && t < 1.0));
        }
    }

    #[test]
    fn lagrange_basis_identities() {
        let c = Collocation::new(4);
        assert_relative_eq!(c.end_weights().sum(), 1.0, epsilon = 1e-12);
        for r in 0..=4 {
            let column_sum: f64 = (0..=4).map(|j| c.derivative[(j, r)]).sum();
            assert_relative_eq!(column_sum, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn rk4_exact_for_double_integrator() {
        let model = LinearIntegratorModel::new(1);
        let x = DVector::from_vec(vec![1.0, 0.5]);
        let u = DVector::from_element(1, 2.0);
        let out = rk4_integrate(&model, &x, &u, 0.3, 1);
        assert_relative_eq!(out[0], 1.0 + 0.5 * 0.3 + 0.3 * 0.3, epsilon = 1e-14);
        assert_relative_eq!(out[1], 0.5 + 2.0 * 0.3, epsilon = 1e-14);
    }

    #[test]
    fn collocation_defects_vanish_on_exact_trajectory() {
        let model = LinearIntegratorModel::new(1);
        let c = Collocation::new(3);
        let (h, a) = (0.2, -1.5);
        let exact = |t: f64| DVector::from_vec(vec![0.3 + 0.1 * t + 0.5 * a * t * t, 0.1 + a * t]);
        let states: Vec<DVector<f64>> = c.points().iter().map(|&tau| exact(tau * h)).collect();
        let defects = c.defects(&model, &states, &DVector::from_element(1, a), &exact(h), h);
        assert_eq!(defects.len(), 2 * 4);
        assert!(defects.amax() < 1e-12);
    }

    #[test]
    fn factory_rejects_invalid_scheme() {
        assert!(transcription_for(TranscriptionScheme::Rk4 { steps: 0 }).is_err());
        let ok = transcription_for(TranscriptionScheme::Collocation { degree: 2 }).unwrap();
        assert_eq!(ok.scheme(), TranscriptionScheme::Collocation { degree: 2 });
    }
}
