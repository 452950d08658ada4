//! The per-phase model seam consumed by the problem builder and the
//! benchmark runner.

use std::sync::Arc;

use nalgebra::{DVector, Vector3};
use strider_core::{ContactConfiguration, ContactPoint};

/// Physical kind of a generalized coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DofKind {
    /// Metres.
    Translation,
    /// Radians.
    Rotation,
}

/// Load carried by one active contact point, in the global frame.
#[derive(Clone, Debug, PartialEq)]
pub struct ContactLoad {
    pub point: ContactPoint,
    pub position: Vector3<f64>,
    pub force: Vector3<f64>,
}

/// Rigid-body dynamics for one contact phase.
///
/// State is `x = [q, qdot]`; controls are `u = [tau, contact forces]`.
/// Implementations are immutable once built and shared across threads.
pub trait PhaseModel: Send + Sync {
    /// Human-readable model name.
    fn name(&self) -> &str;

    /// Contact configuration this model encodes.
    fn contact(&self) -> ContactConfiguration;

    /// Number of generalized coordinates.
    fn nq(&self) -> usize;

    /// Number of generalized forces (actuated torques).
    fn ntau(&self) -> usize;

    /// Number of contact-force components appended to the controls.
    fn n_contact_forces(&self) -> usize;

    /// State dimension.
    fn nx(&self) -> usize {
        2 * self.nq()
    }

    /// Control dimension.
    fn nu(&self) -> usize {
        self.ntau() + self.n_contact_forces()
    }

    /// Kind of each generalized coordinate (length `nq`).
    fn dof_kinds(&self) -> Vec<DofKind>;

    fn n_markers(&self) -> usize;

    /// Global marker positions for configuration `q`.
    fn markers(&self, q: &DVector<f64>) -> Vec<Vector3<f64>>;

    /// `xdot = f(x, u)`.
    fn state_derivative(&self, x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64>;

    /// Loads of all active contact points.
    fn contact_loads(&self, q: &DVector<f64>, u: &DVector<f64>) -> Vec<ContactLoad>;

    /// Index into `u` of the vertical force on `point`, if it is active.
    fn vertical_force_index(&self, point: ContactPoint) -> Option<usize>;

    /// Global position of a contact point (active or not), `None` when the
    /// model has no such point.
    fn contact_point_position(&self, point: ContactPoint, q: &DVector<f64>) -> Option<Vector3<f64>>;

    /// Global velocity of a contact point (active or not).
    fn contact_point_velocity(
        &self,
        point: ContactPoint,
        q: &DVector<f64>,
        qdot: &DVector<f64>,
    ) -> Option<Vector3<f64>>;
}

/// Ordered, read-only set of per-phase models.
#[derive(Clone, Default)]
pub struct PhaseModelSet {
    models: Vec<Arc<dyn PhaseModel>>,
}

impl PhaseModelSet {
    pub fn new(models: Vec<Arc<dyn PhaseModel>>) -> Self {
        Self { models }
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn get(&self, phase: usize) -> Option<&Arc<dyn PhaseModel>> {
        self.models.get(phase)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn PhaseModel>> {
        self.models.iter()
    }

    pub fn contacts(&self) -> Vec<ContactConfiguration> {
        self.models.iter().map(|m| m.contact()).collect()
    }
}

impl std::fmt::Debug for PhaseModelSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.models.iter().map(|m| m.name()))
            .finish()
    }
}

/// Split a state vector into `(q, qdot)`.
pub fn split_state(x: &DVector<f64>, nq: usize) -> (DVector<f64>, DVector<f64>) {
    (x.rows(0, nq).into_owned(), x.rows(nq, nq).into_owned())
}
