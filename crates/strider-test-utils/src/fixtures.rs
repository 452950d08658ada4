//! Small multi-phase problems built on the linear double integrator.
//!
//! References follow `q_j(t) = (j + 1) t^2 / 2`, which the integrator
//! reproduces exactly with the constant control `u_j = j + 1`.

use std::sync::Arc;

use nalgebra::DMatrix;
use strider_core::{PhaseTiming, PhaseTimingPlan};
use strider_data::{PhaseReference, ReferenceSignalSet};
use strider_model::{LinearIntegratorModel, ModelFactory, PhaseModel, PhaseModelSet};

use crate::rng::deterministic_vec;

/// Builds `phases` fresh integrator models on every call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IntegratorFactory {
    pub phases: usize,
    pub dofs: usize,
    pub gain: f64,
}

impl IntegratorFactory {
    pub const fn new(phases: usize, dofs: usize) -> Self {
        Self {
            phases,
            dofs,
            gain: 1.0,
        }
    }

    /// Same factory with a different input gain.
    #[must_use]
    pub const fn with_gain(mut self, gain: f64) -> Self {
        self.gain = gain;
        self
    }
}

impl ModelFactory for IntegratorFactory {
    fn build(&self) -> PhaseModelSet {
        PhaseModelSet::new(
            (0..self.phases)
                .map(|_| {
                    Arc::new(LinearIntegratorModel::new(self.dofs).with_gain(self.gain))
                        as Arc<dyn PhaseModel>
                })
                .collect(),
        )
    }
}

/// Timing plan plus aligned references for an integrator problem.
#[derive(Clone, Debug)]
pub struct TwoPhaseFixture {
    pub dofs: usize,
    pub plan: PhaseTimingPlan,
    pub references: ReferenceSignalSet,
}

impl TwoPhaseFixture {
    /// Phases over `[0, 0.2]` and `[0.2, 0.5]` with 4 and 6 intervals.
    pub fn new(dofs: usize) -> Self {
        let plan = PhaseTimingPlan::new(vec![
            PhaseTiming {
                start: 0.0,
                duration: 0.2,
                shooting_nodes: 4,
            },
            PhaseTiming {
                start: 0.2,
                duration: 0.3,
                shooting_nodes: 6,
            },
        ]);
        let references = analytic_references(&plan, dofs);
        Self {
            dofs,
            plan,
            references,
        }
    }

    pub const fn factory(&self) -> IntegratorFactory {
        IntegratorFactory::new(2, self.dofs)
    }

    /// Add uniform noise of `amplitude` to the position references.
    #[must_use]
    pub fn with_position_noise(mut self, amplitude: f64, seed: u64) -> Self {
        for (phase, offset) in (0..self.references.len()).zip(0u64..) {
            if let Some(q) = self.references.channel_mut(phase, strider_data::Channel::Q) {
                let noise = deterministic_vec(q.len(), amplitude, seed + offset);
                for (v, n) in q.iter_mut().zip(noise) {
                    *v += n;
                }
            }
        }
        self
    }
}

/// One degree of freedom, two phases.
pub fn two_phase_fixture() -> TwoPhaseFixture {
    TwoPhaseFixture::new(1)
}

fn analytic_references(plan: &PhaseTimingPlan, dofs: usize) -> ReferenceSignalSet {
    let rate = |j: usize| -> f64 { f64::from(u32::try_from(j + 1).unwrap_or(u32::MAX)) };
    ReferenceSignalSet::new(
        plan.phases()
            .iter()
            .map(|timing| {
                let times = timing.node_times();
                let n = times.len();
                let q = DMatrix::from_fn(dofs, n, |j, k| 0.5 * rate(j) * times[k] * times[k]);
                let qdot = DMatrix::from_fn(dofs, n, |j, k| rate(j) * times[k]);
                let markers = DMatrix::from_fn(3 * dofs, n, |r, k| {
                    if r % 3 == 0 { q[(r / 3, k)] } else { 0.0 }
                });
                PhaseReference {
                    q,
                    qdot,
                    markers,
                    grf: DMatrix::zeros(3, n),
                    moment: DMatrix::zeros(3, n),
                    cop: DMatrix::zeros(3, n),
                }
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_shapes_follow_plan() {
        let fixture = TwoPhaseFixture::new(2);
        assert_eq!(fixture.plan.shooting_nodes(), vec![4, 6]);
        let lengths: Vec<usize> = fixture
            .references
            .phases()
            .iter()
            .map(PhaseReference::node_count)
            .collect();
        assert_eq!(lengths, vec![5, 7]);
        let first = &fixture.references.phases()[0];
        assert_eq!(first.q.nrows(), 2);
        assert_eq!(first.markers.nrows(), 6);
    }

    #[test]
    fn references_are_continuous_across_boundary() {
        let fixture = two_phase_fixture();
        let phases = fixture.references.phases();
        let end = phases[0].q[(0, 4)];
        let start = phases[1].q[(0, 0)];
        assert!((end - start).abs() < 1e-12);
        assert!((end - 0.02).abs() < 1e-12);
    }

    #[test]
    fn factory_builds_fresh_sets() {
        let factory = two_phase_fixture().factory().with_gain(2.0);
        let set = factory.build();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(0).map(|m| m.nx()), Some(2));
    }

    #[test]
    fn noise_is_seeded() {
        let a = two_phase_fixture().with_position_noise(0.01, 3);
        let b = two_phase_fixture().with_position_noise(0.01, 3);
        assert_eq!(a.references.phases()[1].q, b.references.phases()[1].q);
        assert_ne!(a.references.phases()[1].q, two_phase_fixture().references.phases()[1].q);
    }
}
