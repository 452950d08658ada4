//! Single-shooting dynamic-consistency check.
//!
//! The optimised controls are replayed open-loop from the optimised
//! initial state, phase after phase, and the re-simulated final
//! configuration is compared with the optimised one. A transcription whose
//! defects do not reflect the true dynamics drifts away here.

use nalgebra::DVector;
use strider_model::{DofKind, PhaseModelSet};

use crate::solution::OcpSolution;
use crate::transcription::rk4_integrate;

/// RMS difference of `q` at the final node between re-simulated and
/// optimised trajectories.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShootingError {
    /// Over all generalized coordinates, in mixed units.
    pub total: f64,
    /// Over translational coordinates (m).
    pub translation: f64,
    /// Over rotational coordinates (deg).
    pub rotation_deg: f64,
}

fn rms(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = values.len() as f64;
    (values.iter().map(|v| v * v).sum::<f64>() / n).sqrt()
}

/// Re-integrate `solution` with `substeps` RK4 steps per interval through
/// `models` and measure the final-node discrepancy.
///
/// Returns `None` when the solution has no phases or the model set does not
/// match it phase for phase.
pub fn single_shooting_error(
    solution: &OcpSolution,
    models: &PhaseModelSet,
    substeps: usize,
) -> Option<ShootingError> {
    if solution.phases().is_empty() || solution.phases().len() != models.len() {
        return None;
    }
    let mut x: DVector<f64> = solution.initial_state()?;
    for (phase, model) in solution.phases().iter().zip(models.iter()) {
        if phase.states.nrows() != model.nx() || phase.controls.nrows() != model.nu() {
            return None;
        }
        for k in 0..phase.n_intervals() {
            let h = phase.times[k + 1] - phase.times[k];
            x = rk4_integrate(model.as_ref(), &x, &phase.control(k), h, substeps);
        }
    }

    let last_model = models.get(models.len() - 1)?;
    let nq = last_model.nq();
    let target = solution.final_state()?;
    let diff: Vec<f64> = (0..nq).map(|j| x[j] - target[j]).collect();
    let kinds = last_model.dof_kinds();
    let by_kind = |kind: DofKind, scale: f64| -> Vec<f64> {
        diff.iter()
            .zip(&kinds)
            .filter(|&(_, &k)| k == kind)
            .map(|(d, _)| d * scale)
            .collect()
    };
    Some(ShootingError {
        total: rms(&diff),
        translation: rms(&by_kind(DofKind::Translation, 1.0)),
        rotation_deg: rms(&by_kind(DofKind::Rotation, 180.0 / std::f64::consts::PI)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solution::PhaseSolution;
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;
    use std::sync::Arc;
    use strider_core::ContactConfiguration;
    use strider_model::{LinearIntegratorModel, PhaseModel};

    /// One phase of `q'' = u` with u = 1 for 1 s from rest: q(1) = 0.5.
    fn ballistic(final_q: f64) -> OcpSolution {
        OcpSolution::new(vec![PhaseSolution {
            index: 0,
            contact: ContactConfiguration::Swing,
            times: vec![0.0, 0.5, 1.0],
            states: DMatrix::from_column_slice(2, 3, &[0.0, 0.0, 0.125, 0.5, final_q, 1.0]),
            controls: DMatrix::from_element(1, 2, 1.0),
        }])
    }

    fn models(gain: f64) -> PhaseModelSet {
        PhaseModelSet::new(vec![
            Arc::new(LinearIntegratorModel::new(1).with_gain(gain)) as Arc<dyn PhaseModel>,
        ])
    }

    #[test]
    fn consistent_trajectory_has_no_error() {
        let err = single_shooting_error(&ballistic(0.5), &models(1.0), 4).unwrap();
        assert_relative_eq!(err.total, 0.0, epsilon = 1e-12);
        assert_relative_eq!(err.rotation_deg, 0.0);
    }

    #[test]
    fn inconsistent_model_diverges() {
        let err = single_shooting_error(&ballistic(0.5), &models(2.0), 4).unwrap();
        assert_relative_eq!(err.total, 0.5, epsilon = 1e-12);
        assert_relative_eq!(err.translation, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn mismatched_models_are_rejected() {
        let set = PhaseModelSet::new(vec![
            Arc::new(LinearIntegratorModel::new(2)) as Arc<dyn PhaseModel>,
        ]);
        assert!(single_shooting_error(&ballistic(0.5), &set, 4).is_none());
        let empty = single_shooting_error(&OcpSolution::default(), &PhaseModelSet::default(), 4);
        assert!(empty.is_none());
    }
}
