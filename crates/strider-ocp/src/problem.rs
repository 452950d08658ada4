//! Multi-phase tracking optimal-control problem construction.
//!
//! # Layout
//!
//! Each phase owns its node states `x_0..=x_n` and interval controls
//! `u_0..u_{n-1}`; the transcription may append its own variables after
//! them. Phases are linked by explicit continuity constraints.
//!
//! # Objective
//!
//! Squared tracking error, each term scaled by `weight * interval`:
//! - q, qdot and markers at every node
//! - ground-reaction force, moment and centre of pressure on every control
//!   interval of phases with contact
//! - control effort on every interval
//!
//! # Constraints
//!
//! - transcription defects
//! - state continuity between consecutive phases
//! - vertical force >= 0 on every active contact point
//! - every active contact point sits on the ground (z = 0) with zero
//!   vertical velocity at each node; the first active point also has zero
//!   horizontal velocity
//! - a point lost at a boundary carries no vertical force on the last
//!   interval before it; a point gained carries no vertical force on the
//!   first interval after it and lands with zero vertical velocity

use std::ops::Range;
use std::sync::Arc;

use nalgebra::{DVector, Vector3};
use strider_core::{
    ContactConfiguration, ContactPoint, InfeasibleProblemError, ObjectiveWeights, PhaseTiming,
    PhaseTimingPlan, TranscriptionScheme,
};
use strider_data::{Channel, PhaseReference, ReferenceSignalSet};
use strider_model::{GroundReaction, PhaseModel, PhaseModelSet};
use tracing::debug;

use crate::nlp::Nlp;
use crate::solution::{OcpSolution, PhaseSolution};
use crate::transcription::transcription_for;

/// Reference vertical force below which the centre of pressure is not tracked (N).
pub const COP_TRACKING_MIN_FORCE: f64 = 10.0;

/// Variable indices of one phase.
#[derive(Clone, Debug, PartialEq)]
pub struct PhaseLayout {
    pub index: usize,
    pub timing: PhaseTiming,
    pub contact: ContactConfiguration,
    pub nx: usize,
    pub nu: usize,
    /// One range of `nx` indices per node.
    pub states: Vec<Range<usize>>,
    /// One range of `nu` indices per control interval.
    pub controls: Vec<Range<usize>>,
}

impl PhaseLayout {
    fn q_vars(&self, node: usize, nq: usize) -> Range<usize> {
        let start = self.states[node].start;
        start..start + nq
    }
}

/// Assembled problem, ready for an [`NlpSolver`](crate::solver::NlpSolver).
#[derive(Debug)]
pub struct MultiPhaseOptimalControlProblem {
    scheme: TranscriptionScheme,
    nlp: Nlp,
    layouts: Vec<PhaseLayout>,
}

impl MultiPhaseOptimalControlProblem {
    pub const fn scheme(&self) -> TranscriptionScheme {
        self.scheme
    }

    pub const fn nlp(&self) -> &Nlp {
        &self.nlp
    }

    pub fn layouts(&self) -> &[PhaseLayout] {
        &self.layouts
    }

    pub fn n_phases(&self) -> usize {
        self.layouts.len()
    }

    /// Largest state dimension over phases.
    pub fn nx(&self) -> usize {
        self.layouts.iter().map(|l| l.nx).max().unwrap_or(0)
    }

    /// Largest control dimension over phases.
    pub fn nu(&self) -> usize {
        self.layouts.iter().map(|l| l.nu).max().unwrap_or(0)
    }

    /// Total control intervals over all phases.
    pub fn n_shooting(&self) -> usize {
        self.layouts.iter().map(|l| l.timing.shooting_nodes).sum()
    }

    /// Split a decision vector into per-phase node states and controls.
    pub fn extract(&self, z: &DVector<f64>) -> OcpSolution {
        let phases = self
            .layouts
            .iter()
            .map(|layout| {
                let gather = |ranges: &[Range<usize>], rows: usize| {
                    nalgebra::DMatrix::from_fn(rows, ranges.len(), |r, c| z[ranges[c].start + r])
                };
                PhaseSolution {
                    index: layout.index,
                    contact: layout.contact,
                    times: layout.timing.node_times(),
                    states: gather(&layout.states, layout.nx),
                    controls: gather(&layout.controls, layout.nu),
                }
            })
            .collect();
        OcpSolution::new(phases)
    }
}

/// Builds a fresh [`MultiPhaseOptimalControlProblem`] per transcription.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MultiPhaseProblemBuilder {
    weights: ObjectiveWeights,
}

impl MultiPhaseProblemBuilder {
    pub const fn new(weights: ObjectiveWeights) -> Self {
        Self { weights }
    }

    pub const fn weights(&self) -> &ObjectiveWeights {
        &self.weights
    }

    /// Assemble the problem for `scheme`.
    ///
    /// Fails with [`InfeasibleProblemError`] on any phase-count, reference
    /// length, channel dimension or state-dimension mismatch.
    pub fn build(
        &self,
        models: &PhaseModelSet,
        plan: &PhaseTimingPlan,
        references: &ReferenceSignalSet,
        scheme: TranscriptionScheme,
    ) -> Result<MultiPhaseOptimalControlProblem, InfeasibleProblemError> {
        validate_inputs(models, plan, references)?;
        let transcription = transcription_for(scheme)?;

        let mut nlp = Nlp::new();
        let mut layouts = Vec::with_capacity(plan.len());
        for ((index, timing), (model, reference)) in plan
            .phases()
            .iter()
            .enumerate()
            .zip(models.iter().zip(references.phases()))
        {
            let layout = add_phase_variables(&mut nlp, index, *timing, model.as_ref(), reference);
            transcription.append_phase(&mut nlp, &layout, model);
            self.add_tracking(&mut nlp, &layout, model, reference);
            add_unilateral_contact(&mut nlp, &layout, model.as_ref());
            add_contact_kinematics(&mut nlp, &layout, model);
            layouts.push(layout);
        }

        for (i, pair) in layouts.windows(2).enumerate() {
            let (prev, next) = (&pair[0], &pair[1]);
            add_continuity(&mut nlp, prev, next);
            if let (Some(prev_model), Some(next_model)) = (models.get(i), models.get(i + 1)) {
                add_boundary_contact(&mut nlp, prev, prev_model.as_ref(), next, next_model);
            }
        }

        debug!(
            scheme = %scheme,
            variables = nlp.n_variables(),
            equalities = nlp.n_equalities(),
            inequalities = nlp.n_inequalities(),
            residuals = nlp.n_residuals(),
            "built multi-phase problem"
        );
        Ok(MultiPhaseOptimalControlProblem {
            scheme,
            nlp,
            layouts,
        })
    }

    fn add_tracking(
        &self,
        nlp: &mut Nlp,
        layout: &PhaseLayout,
        model: &Arc<dyn PhaseModel>,
        reference: &PhaseReference,
    ) {
        let w = &self.weights;
        let h = layout.timing.interval();
        let nq = model.nq();
        let nm = 3 * model.n_markers();
        let (sq, sqd, sm) = ((w.q * h).sqrt(), (w.qdot * h).sqrt(), (w.markers * h).sqrt());

        for node in 0..layout.states.len() {
            let q_ref = reference.q.column(node).into_owned();
            let qdot_ref = reference.qdot.column(node).into_owned();
            let markers_ref = reference.markers.column(node).into_owned();
            let model = Arc::clone(model);
            nlp.add_residual(
                format!("phase{}/kinematics/{node}", layout.index),
                layout.states[node].clone().collect(),
                2 * nq + nm,
                move |x| {
                    let q = x.rows(0, nq).into_owned();
                    let mut r = DVector::zeros(2 * nq + nm);
                    r.rows_mut(0, nq).copy_from(&((&q - &q_ref) * sq));
                    let qdot = x.rows(nq, nq).into_owned();
                    r.rows_mut(nq, nq).copy_from(&((qdot - &qdot_ref) * sqd));
                    for (m, pos) in model.markers(&q).iter().enumerate() {
                        for axis in 0..3 {
                            let row = 3 * m + axis;
                            r[2 * nq + row] = (pos[axis] - markers_ref[row]) * sm;
                        }
                    }
                    r
                },
            );
        }

        let su = (w.control * h).sqrt();
        for (k, controls) in layout.controls.iter().enumerate() {
            nlp.add_residual(
                format!("phase{}/effort/{k}", layout.index),
                controls.clone().collect(),
                layout.nu,
                move |u| u * su,
            );
        }

        if !layout.contact.has_contact() {
            return;
        }
        let (sf, smo, sc) = ((w.grf * h).sqrt(), (w.moment * h).sqrt(), (w.cop * h).sqrt());
        for (k, controls) in layout.controls.iter().enumerate() {
            let grf_ref = Vector3::from_iterator(reference.grf.column(k).iter().copied());
            let moment_ref = Vector3::from_iterator(reference.moment.column(k).iter().copied());
            let cop_ref = (grf_ref.z.abs() >= COP_TRACKING_MIN_FORCE)
                .then(|| Vector3::from_iterator(reference.cop.column(k).iter().copied()));
            let vars: Vec<usize> = layout.q_vars(k, nq).chain(controls.clone()).collect();
            let model = Arc::clone(model);
            nlp.add_residual(
                format!("phase{}/ground_reaction/{k}", layout.index),
                vars,
                9,
                move |z| {
                    let q = z.rows(0, nq).into_owned();
                    let u = z.rows(nq, z.len() - nq).into_owned();
                    let reaction = GroundReaction::from_loads(&model.contact_loads(&q, &u));
                    let mut r = DVector::zeros(9);
                    r.fixed_rows_mut::<3>(0).copy_from(&((reaction.force - grf_ref) * sf));
                    r.fixed_rows_mut::<3>(3)
                        .copy_from(&((reaction.moment - moment_ref) * smo));
                    if let (Some(target), Some(cop)) = (cop_ref, reaction.cop) {
                        r.fixed_rows_mut::<3>(6).copy_from(&((cop - target) * sc));
                    }
                    r
                },
            );
        }
    }
}

fn validate_inputs(
    models: &PhaseModelSet,
    plan: &PhaseTimingPlan,
    references: &ReferenceSignalSet,
) -> Result<(), InfeasibleProblemError> {
    if models.is_empty() {
        return Err(InfeasibleProblemError::NoPhases);
    }
    if models.len() != plan.len() || models.len() != references.len() {
        return Err(InfeasibleProblemError::PhaseCountMismatch {
            models: models.len(),
            timing: plan.len(),
            references: references.len(),
        });
    }
    for (phase, ((model, timing), reference)) in models
        .iter()
        .zip(plan.phases())
        .zip(references.phases())
        .enumerate()
    {
        let expected_nodes = timing.node_count();
        for channel in Channel::ALL {
            let values = reference.channel(channel);
            if values.ncols() != expected_nodes {
                return Err(InfeasibleProblemError::ReferenceLengthMismatch {
                    phase,
                    channel: channel.name().into(),
                    expected: expected_nodes,
                    got: values.ncols(),
                });
            }
            let expected_rows = match channel {
                Channel::Q | Channel::Qdot => model.nq(),
                Channel::Markers => 3 * model.n_markers(),
                Channel::Grf | Channel::Moment | Channel::Cop => 3,
            };
            if values.nrows() != expected_rows {
                return Err(InfeasibleProblemError::ChannelDimensionMismatch {
                    phase,
                    channel: channel.name().into(),
                    expected: expected_rows,
                    got: values.nrows(),
                });
            }
        }
    }
    for (phase, pair) in models.iter().collect::<Vec<_>>().windows(2).enumerate() {
        if pair[0].nx() != pair[1].nx() {
            return Err(InfeasibleProblemError::StateDimensionMismatch {
                phase,
                previous: pair[0].nx(),
                next: pair[1].nx(),
            });
        }
    }
    Ok(())
}

/// Node states seeded from the kinematic references, controls from zero.
fn add_phase_variables(
    nlp: &mut Nlp,
    index: usize,
    timing: PhaseTiming,
    model: &dyn PhaseModel,
    reference: &PhaseReference,
) -> PhaseLayout {
    let (nx, nu) = (model.nx(), model.nu());
    let states = (0..timing.node_count())
        .map(|k| {
            let mut x0 = Vec::with_capacity(nx);
            x0.extend(reference.q.column(k).iter());
            x0.extend(reference.qdot.column(k).iter());
            x0.resize(nx, 0.0);
            nlp.add_variables(&x0)
        })
        .collect();
    let controls = (0..timing.shooting_nodes)
        .map(|_| nlp.add_variables(&vec![0.0; nu]))
        .collect();
    PhaseLayout {
        index,
        timing,
        contact: model.contact(),
        nx,
        nu,
        states,
        controls,
    }
}

fn add_continuity(nlp: &mut Nlp, prev: &PhaseLayout, next: &PhaseLayout) {
    let nx = prev.nx;
    let vars = prev.states[prev.states.len() - 1]
        .clone()
        .chain(next.states[0].clone())
        .collect();
    nlp.add_equality(
        format!("phase{}->{}/continuity", prev.index, next.index),
        vars,
        nx,
        move |z| z.rows(nx, nx).into_owned() - z.rows(0, nx),
    );
}

fn add_unilateral_contact(nlp: &mut Nlp, layout: &PhaseLayout, model: &dyn PhaseModel) {
    let indices: Vec<usize> = layout
        .contact
        .active_points()
        .iter()
        .filter_map(|&p| model.vertical_force_index(p))
        .collect();
    if indices.is_empty() {
        return;
    }
    for (k, controls) in layout.controls.iter().enumerate() {
        let indices = indices.clone();
        nlp.add_inequality(
            format!("phase{}/unilateral/{k}", layout.index),
            controls.clone().collect(),
            indices.len(),
            move |u| DVector::from_iterator(indices.len(), indices.iter().map(|&i| u[i])),
        );
    }
}

/// Rigid contact of the active points.
///
/// Node 0 of a phase after the first is left out: continuity already ties
/// it to the last node of the previous phase.
fn add_contact_kinematics(nlp: &mut Nlp, layout: &PhaseLayout, model: &Arc<dyn PhaseModel>) {
    let nq = model.nq();
    let rest = DVector::zeros(nq);
    let points: Vec<ContactPoint> = layout
        .contact
        .active_points()
        .iter()
        .copied()
        .filter(|&p| {
            model.contact_point_position(p, &rest).is_some()
                && model.contact_point_velocity(p, &rest, &rest).is_some()
        })
        .collect();
    if points.is_empty() {
        return;
    }
    let rows = 2 * points.len() + 1;
    let first_node = usize::from(layout.index > 0);
    for node in first_node..layout.states.len() {
        let model = Arc::clone(model);
        let points = points.clone();
        nlp.add_equality(
            format!("phase{}/contact/{node}", layout.index),
            layout.states[node].clone().collect(),
            rows,
            move |x| {
                let q = x.rows(0, nq).into_owned();
                let qdot = x.rows(nq, nq).into_owned();
                let mut c = DVector::zeros(rows);
                for (i, &point) in points.iter().enumerate() {
                    c[2 * i] = model.contact_point_position(point, &q).map_or(0.0, |p| p.z);
                    if let Some(v) = model.contact_point_velocity(point, &q, &qdot) {
                        c[2 * i + 1] = v.z;
                        if i == 0 {
                            c[rows - 1] = v.x;
                        }
                    }
                }
                c
            },
        );
    }
}

fn zero_vertical_force(
    nlp: &mut Nlp,
    label: String,
    controls: &Range<usize>,
    index: usize,
) {
    nlp.add_equality(label, controls.clone().collect(), 1, move |u| {
        DVector::from_element(1, u[index])
    });
}

fn add_boundary_contact(
    nlp: &mut Nlp,
    prev: &PhaseLayout,
    prev_model: &dyn PhaseModel,
    next: &PhaseLayout,
    next_model: &Arc<dyn PhaseModel>,
) {
    for point in prev.contact.lost_points(next.contact) {
        if let (Some(index), Some(controls)) =
            (prev_model.vertical_force_index(point), prev.controls.last())
        {
            let label = format!("phase{}/lift_off/{}", prev.index, point.name());
            zero_vertical_force(nlp, label, controls, index);
        }
    }
    for point in prev.contact.gained_points(next.contact) {
        if let (Some(index), Some(controls)) =
            (next_model.vertical_force_index(point), next.controls.first())
        {
            let label = format!("phase{}/touch_down_force/{}", next.index, point.name());
            zero_vertical_force(nlp, label, controls, index);
        }
        add_landing_velocity(nlp, next, next_model, point);
    }
}

fn add_landing_velocity(
    nlp: &mut Nlp,
    layout: &PhaseLayout,
    model: &Arc<dyn PhaseModel>,
    point: ContactPoint,
) {
    let nq = model.nq();
    let rest = DVector::zeros(nq);
    if model.contact_point_velocity(point, &rest, &rest).is_none() {
        return;
    }
    let model = Arc::clone(model);
    nlp.add_equality(
        format!("phase{}/touch_down_velocity/{}", layout.index, point.name()),
        layout.states[0].clone().collect(),
        1,
        move |x| {
            let q = x.rows(0, nq).into_owned();
            let qdot = x.rows(nq, nq).into_owned();
            let vz = model
                .contact_point_velocity(point, &q, &qdot)
                .map_or(0.0, |v| v.z);
            DVector::from_element(1, vz)
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::{NlpSolver, SqpSolver};
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;
    use strider_core::SolverConfiguration;
    use strider_model::{
        GaitModelFactory, LegParameters, LinearIntegratorModel, ModelFactory, PlanarLegModel,
    };

    fn integrator_set(phases: usize, dofs: usize) -> PhaseModelSet {
        PhaseModelSet::new(
            (0..phases)
                .map(|_| Arc::new(LinearIntegratorModel::new(dofs)) as Arc<dyn PhaseModel>)
                .collect(),
        )
    }

    fn plan(nodes: &[usize]) -> PhaseTimingPlan {
        let mut start = 0.0;
        let phases = nodes
            .iter()
            .map(|&n| {
                let timing = PhaseTiming {
                    start,
                    duration: 0.1,
                    shooting_nodes: n,
                };
                start += 0.1;
                timing
            })
            .collect();
        PhaseTimingPlan::new(phases)
    }

    fn references(nodes: &[usize], nq: usize, n_markers: usize) -> ReferenceSignalSet {
        ReferenceSignalSet::new(
            nodes
                .iter()
                .map(|&n| PhaseReference {
                    q: DMatrix::zeros(nq, n + 1),
                    qdot: DMatrix::zeros(nq, n + 1),
                    markers: DMatrix::zeros(3 * n_markers, n + 1),
                    grf: DMatrix::zeros(3, n + 1),
                    moment: DMatrix::zeros(3, n + 1),
                    cop: DMatrix::zeros(3, n + 1),
                })
                .collect(),
        )
    }

    #[test]
    fn rk4_layout_sizes() {
        let problem = MultiPhaseProblemBuilder::default()
            .build(
                &integrator_set(2, 1),
                &plan(&[3, 4]),
                &references(&[3, 4], 1, 1),
                TranscriptionScheme::rk4(),
            )
            .unwrap();
        let nlp = problem.nlp();
        // states: (4 + 5) * 2, controls: 3 + 4
        assert_eq!(nlp.n_variables(), 18 + 7);
        // defects 7 * 2, continuity 2
        assert_eq!(nlp.n_equalities(), 16);
        assert_eq!(nlp.n_inequalities(), 0);
        assert_eq!(problem.n_shooting(), 7);
        assert_eq!((problem.nx(), problem.nu()), (2, 1));
    }

    #[test]
    fn collocation_adds_interior_states() {
        let problem = MultiPhaseProblemBuilder::default()
            .build(
                &integrator_set(2, 1),
                &plan(&[3, 4]),
                &references(&[3, 4], 1, 1),
                TranscriptionScheme::Collocation { degree: 3 },
            )
            .unwrap();
        assert_eq!(problem.nlp().n_variables(), 25 + 7 * 3 * 2);
        assert_eq!(problem.nlp().n_equalities(), 7 * 2 * 4 + 2);
    }

    #[test]
    fn rejects_phase_zero_length_mismatch() {
        let mut refs = references(&[3, 4], 1, 1);
        if let Some(q) = refs.channel_mut(0, Channel::Q) {
            *q = DMatrix::zeros(1, 3);
        }
        let err = MultiPhaseProblemBuilder::default()
            .build(&integrator_set(2, 1), &plan(&[3, 4]), &refs, TranscriptionScheme::rk4())
            .unwrap_err();
        assert_eq!(
            err,
            InfeasibleProblemError::ReferenceLengthMismatch {
                phase: 0,
                channel: "q".into(),
                expected: 4,
                got: 3
            }
        );
    }

    #[test]
    fn rejects_phase_count_mismatch() {
        let err = MultiPhaseProblemBuilder::default()
            .build(
                &integrator_set(3, 1),
                &plan(&[3, 4]),
                &references(&[3, 4], 1, 1),
                TranscriptionScheme::rk4(),
            )
            .unwrap_err();
        assert!(matches!(err, InfeasibleProblemError::PhaseCountMismatch { models: 3, .. }));
    }

    #[test]
    fn rejects_state_dimension_change() {
        let models = PhaseModelSet::new(vec![
            Arc::new(LinearIntegratorModel::new(1)) as Arc<dyn PhaseModel>,
            Arc::new(LinearIntegratorModel::new(2)) as Arc<dyn PhaseModel>,
        ]);
        let mut refs = references(&[2, 2], 1, 1);
        if let Some(q) = refs.channel_mut(1, Channel::Q) {
            *q = DMatrix::zeros(2, 3);
        }
        if let Some(qdot) = refs.channel_mut(1, Channel::Qdot) {
            *qdot = DMatrix::zeros(2, 3);
        }
        if let Some(markers) = refs.channel_mut(1, Channel::Markers) {
            *markers = DMatrix::zeros(6, 3);
        }
        let err = MultiPhaseProblemBuilder::default()
            .build(&models, &plan(&[2, 2]), &refs, TranscriptionScheme::rk4())
            .unwrap_err();
        assert!(matches!(err, InfeasibleProblemError::StateDimensionMismatch { .. }));
    }

    #[test]
    fn rejects_invalid_scheme() {
        let err = MultiPhaseProblemBuilder::default()
            .build(
                &integrator_set(1, 1),
                &plan(&[2]),
                &references(&[2], 1, 1),
                TranscriptionScheme::Collocation { degree: 0 },
            )
            .unwrap_err();
        assert!(matches!(err, InfeasibleProblemError::InvalidScheme(_)));
    }

    #[test]
    fn gait_cycle_contact_constraints() {
        let models = GaitModelFactory::default().build();
        let nodes = [2, 3, 3, 2];
        let problem = MultiPhaseProblemBuilder::default()
            .build(&models, &plan(&nodes), &references(&nodes, 6, 5), TranscriptionScheme::rk4())
            .unwrap();
        let labels: Vec<&str> = problem.nlp().blocks().iter().map(|b| b.label()).collect();
        assert!(labels.contains(&"phase1/touch_down_force/toe"));
        assert!(labels.contains(&"phase1/touch_down_velocity/toe"));
        assert!(labels.contains(&"phase1/lift_off/heel"));
        assert!(labels.contains(&"phase2/lift_off/toe"));
        // unilateral rows: heel 2 + flat foot 3*2 + forefoot 3
        assert_eq!(problem.nlp().n_inequalities(), 2 + 6 + 3);
        assert_eq!(problem.nu(), 10);
    }

    #[test]
    fn stance_points_are_held_on_the_ground() {
        let models = GaitModelFactory::default().build();
        let nodes = [2, 3, 3, 2];
        let problem = MultiPhaseProblemBuilder::default()
            .build(&models, &plan(&nodes), &references(&nodes, 6, 5), TranscriptionScheme::rk4())
            .unwrap();
        let contact: Vec<(&str, usize)> = problem
            .nlp()
            .blocks()
            .iter()
            .filter(|b| b.label().contains("/contact/"))
            .map(|b| (b.label(), b.rows()))
            .collect();
        // heel: nodes 0..=2; flat foot and forefoot: nodes 1..=3
        assert_eq!(contact.len(), 3 + 3 + 3);
        assert!(contact.contains(&("phase0/contact/0", 3)));
        assert!(contact.contains(&("phase1/contact/3", 5)));
        assert!(contact.contains(&("phase2/contact/1", 3)));
        assert!(!contact.iter().any(|&(label, _)| label == "phase1/contact/0"));
        assert!(!contact.iter().any(|&(label, _)| label.starts_with("phase3/")));
        assert_eq!(contact.iter().map(|&(_, rows)| rows).sum::<usize>(), 9 + 15 + 9);
    }

    #[test]
    fn contact_free_models_get_no_contact_rows() {
        let problem = MultiPhaseProblemBuilder::default()
            .build(
                &integrator_set(2, 1),
                &plan(&[3, 4]),
                &references(&[3, 4], 1, 1),
                TranscriptionScheme::rk4(),
            )
            .unwrap();
        assert!(!problem.nlp().blocks().iter().any(|b| b.label().contains("/contact/")));
    }

    #[test]
    fn solved_heel_phase_keeps_the_heel_down() {
        let params = LegParameters::default();
        let model = PlanarLegModel::new(ContactConfiguration::Heel, params);
        // Upright leg with the sole 8 cm above the ground.
        let standing = DVector::from_vec(vec![0.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
        assert_relative_eq!(
            model.contact_point_position(ContactPoint::Heel, &standing).unwrap().z,
            0.08,
            epsilon = 1e-12
        );
        let mut refs = references(&[4], 6, 5);
        let markers: Vec<f64> = model
            .markers(&standing)
            .iter()
            .flat_map(|m| m.iter().copied())
            .collect();
        for k in 0..5 {
            if let Some(q) = refs.channel_mut(0, Channel::Q) {
                q.set_column(k, &standing);
            }
            if let Some(m) = refs.channel_mut(0, Channel::Markers) {
                m.set_column(k, &DVector::from_column_slice(&markers));
            }
        }
        let models = PhaseModelSet::new(vec![Arc::new(model.clone()) as Arc<dyn PhaseModel>]);
        let problem = MultiPhaseProblemBuilder::default()
            .build(&models, &plan(&[4]), &refs, TranscriptionScheme::rk4())
            .unwrap();
        let solution = SqpSolver::new(SolverConfiguration {
            tolerance: 1e-6,
            max_iterations: 100,
            ..SolverConfiguration::default()
        })
        .solve(problem.nlp())
        .unwrap();
        assert!(
            solution.constraint_violation < 1e-5,
            "violation {}",
            solution.constraint_violation
        );

        let extracted = problem.extract(&solution.x);
        let states = &extracted.phases()[0].states;
        for k in 0..states.ncols() {
            let q = states.column(k).rows(0, 6).into_owned();
            let heel = model.contact_point_position(ContactPoint::Heel, &q).unwrap();
            assert!(heel.z.abs() < 1e-4, "node {k}: heel at {}", heel.z);
        }
    }

    #[test]
    fn extract_returns_initial_guess_layout() {
        let mut refs = references(&[2], 1, 1);
        if let Some(q) = refs.channel_mut(0, Channel::Q) {
            *q = DMatrix::from_row_slice(1, 3, &[0.0, 0.5, 1.0]);
        }
        let problem = MultiPhaseProblemBuilder::default()
            .build(&integrator_set(1, 1), &plan(&[2]), &refs, TranscriptionScheme::rk4())
            .unwrap();
        let solution = problem.extract(&problem.nlp().initial_guess());
        let phase = &solution.phases()[0];
        assert_eq!(phase.states.shape(), (2, 3));
        assert_eq!(phase.controls.shape(), (1, 2));
        assert_eq!(phase.states[(0, 1)], 0.5);
    }
}
