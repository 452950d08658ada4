//! Contact-free linear double integrator, `qddot = gain * u`.
//!
//! Stands in for the full gait dynamics when checking transcriptions and
//! the consistency metric on problems with known exact solutions.

use nalgebra::{DVector, Vector3};
use strider_core::{ContactConfiguration, ContactPoint};

use crate::model::{ContactLoad, DofKind, PhaseModel};

#[derive(Clone, Debug, PartialEq)]
pub struct LinearIntegratorModel {
    dofs: usize,
    gain: f64,
}

impl LinearIntegratorModel {
    pub const fn new(dofs: usize) -> Self {
        Self { dofs, gain: 1.0 }
    }

    /// Same structure with a scaled input gain; a gain other than the one a
    /// trajectory was optimised with makes it dynamically inconsistent.
    #[must_use]
    pub const fn with_gain(mut self, gain: f64) -> Self {
        self.gain = gain;
        self
    }

    pub const fn gain(&self) -> f64 {
        self.gain
    }
}

impl PhaseModel for LinearIntegratorModel {
    fn name(&self) -> &str {
        "linear_integrator"
    }

    fn contact(&self) -> ContactConfiguration {
        ContactConfiguration::Swing
    }

    fn nq(&self) -> usize {
        self.dofs
    }

    fn ntau(&self) -> usize {
        self.dofs
    }

    fn n_contact_forces(&self) -> usize {
        0
    }

    fn dof_kinds(&self) -> Vec<DofKind> {
        vec![DofKind::Translation; self.dofs]
    }

    fn n_markers(&self) -> usize {
        self.dofs
    }

    /// One marker per coordinate, placed along x.
    fn markers(&self, q: &DVector<f64>) -> Vec<Vector3<f64>> {
        q.iter().map(|&v| Vector3::new(v, 0.0, 0.0)).collect()
    }

    fn state_derivative(&self, x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64> {
        let n = self.dofs;
        let mut xdot = DVector::zeros(2 * n);
        for j in 0..n {
            xdot[j] = x[n + j];
            xdot[n + j] = self.gain * u[j];
        }
        xdot
    }

    fn contact_loads(&self, _q: &DVector<f64>, _u: &DVector<f64>) -> Vec<ContactLoad> {
        Vec::new()
    }

    fn vertical_force_index(&self, _point: ContactPoint) -> Option<usize> {
        None
    }

    fn contact_point_position(
        &self,
        _point: ContactPoint,
        _q: &DVector<f64>,
    ) -> Option<Vector3<f64>> {
        None
    }

    fn contact_point_velocity(
        &self,
        _point: ContactPoint,
        _q: &DVector<f64>,
        _qdot: &DVector<f64>,
    ) -> Option<Vector3<f64>> {
        None
    }
}
