//! Planar single-leg gait model with switchable foot contacts.
//!
//! Generalized coordinates (all actuated, root torques act as residuals):
//!
//! ```text
//! q = [pelvis_tx, pelvis_tz, pelvis_rot, hip, knee, ankle]
//! ```
//!
//! Segment angles accumulate along the chain: thigh = rot + hip,
//! shank = thigh + knee, foot = shank + ankle. Each active contact point
//! contributes a planar force `(fx, fz)` to the controls, mapped into
//! generalized forces through the point Jacobian:
//!
//! ```text
//! M qddot = tau + sum_i J_i^T f_i - G - B qdot
//! ```

use nalgebra::{DVector, Vector2, Vector3};
use strider_core::{ContactConfiguration, ContactPoint};

use crate::model::{ContactLoad, DofKind, PhaseModel};

/// Number of generalized coordinates of the planar leg.
pub const NQ: usize = 6;

/// Marker order produced by [`PlanarLegModel::markers`].
pub const MARKER_NAMES: [&str; 5] = ["pelvis", "knee", "ankle", "heel", "toe"];

/// Geometry and inertia of the planar leg.
#[derive(Clone, Debug, PartialEq)]
pub struct LegParameters {
    pub thigh_length: f64,
    pub shank_length: f64,
    /// Vertical distance ankle -> sole.
    pub ankle_height: f64,
    /// Horizontal distance ankle -> heel (backwards).
    pub heel_offset: f64,
    /// Horizontal distance ankle -> toe (forwards).
    pub toe_offset: f64,
    /// Total body mass (kg), carried by the pelvis translations.
    pub body_mass: f64,
    /// Generalized inertia of [rot, hip, knee, ankle] (kg m^2).
    pub rotational_inertia: [f64; 4],
    /// Viscous damping on hip, knee and ankle (N m s/rad).
    pub joint_damping: f64,
    pub gravity: f64,
}

impl Default for LegParameters {
    fn default() -> Self {
        Self {
            thigh_length: 0.42,
            shank_length: 0.42,
            ankle_height: 0.08,
            heel_offset: 0.06,
            toe_offset: 0.16,
            body_mass: 70.0,
            rotational_inertia: [3.0, 1.2, 0.4, 0.05],
            joint_damping: 0.5,
            gravity: 9.81,
        }
    }
}

/// Planar leg restricted to one contact configuration.
#[derive(Clone, Debug)]
pub struct PlanarLegModel {
    name: String,
    contact: ContactConfiguration,
    params: LegParameters,
}

impl PlanarLegModel {
    pub fn new(contact: ContactConfiguration, params: LegParameters) -> Self {
        Self {
            name: format!("planar_leg_{contact}"),
            contact,
            params,
        }
    }

    pub const fn params(&self) -> &LegParameters {
        &self.params
    }

    fn foot_offset(&self, point: ContactPoint) -> Vector2<f64> {
        match point {
            ContactPoint::Heel => Vector2::new(-self.params.heel_offset, -self.params.ankle_height),
            ContactPoint::Toe => Vector2::new(self.params.toe_offset, -self.params.ankle_height),
        }
    }

    fn segments(&self, foot: Option<Vector2<f64>>) -> Vec<Vector2<f64>> {
        let mut segs = vec![
            Vector2::new(0.0, -self.params.thigh_length),
            Vector2::new(0.0, -self.params.shank_length),
        ];
        segs.extend(foot);
        segs
    }

    /// Position and Jacobian columns of the end of a segment chain.
    ///
    /// Segment `i` rotates with `q[2] + ... + q[3 + i]`.
    fn chain_point(
        q: &DVector<f64>,
        segments: &[Vector2<f64>],
    ) -> (Vector2<f64>, [Vector2<f64>; NQ]) {
        let mut pos = Vector2::new(q[0], q[1]);
        let mut jac = [Vector2::zeros(); NQ];
        jac[0] = Vector2::new(1.0, 0.0);
        jac[1] = Vector2::new(0.0, 1.0);

        let mut angle = q[2];
        for (i, v) in segments.iter().enumerate() {
            angle += q[3 + i];
            let (s, c) = angle.sin_cos();
            pos += Vector2::new(c * v.x - s * v.y, s * v.x + c * v.y);
            let d = Vector2::new(-s * v.x - c * v.y, c * v.x - s * v.y);
            for col in jac.iter_mut().take(4 + i).skip(2) {
                *col += d;
            }
        }
        (pos, jac)
    }

    fn contact_kinematics(
        &self,
        q: &DVector<f64>,
        point: ContactPoint,
    ) -> (Vector2<f64>, [Vector2<f64>; NQ]) {
        Self::chain_point(q, &self.segments(Some(self.foot_offset(point))))
    }

    fn mass_diagonal(&self) -> [f64; NQ] {
        let m = self.params.body_mass;
        let [ir, ih, ik, ia] = self.params.rotational_inertia;
        [m, m, ir, ih, ik, ia]
    }
}

fn planar_to_global(v: Vector2<f64>) -> Vector3<f64> {
    Vector3::new(v.x, 0.0, v.y)
}

impl PhaseModel for PlanarLegModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn contact(&self) -> ContactConfiguration {
        self.contact
    }

    fn nq(&self) -> usize {
        NQ
    }

    fn ntau(&self) -> usize {
        NQ
    }

    fn n_contact_forces(&self) -> usize {
        2 * self.contact.active_points().len()
    }

    fn dof_kinds(&self) -> Vec<DofKind> {
        vec![
            DofKind::Translation,
            DofKind::Translation,
            DofKind::Rotation,
            DofKind::Rotation,
            DofKind::Rotation,
            DofKind::Rotation,
        ]
    }

    fn n_markers(&self) -> usize {
        MARKER_NAMES.len()
    }

    fn markers(&self, q: &DVector<f64>) -> Vec<Vector3<f64>> {
        let pelvis = Vector2::new(q[0], q[1]);
        let knee = Self::chain_point(q, &self.segments(None)[..1]).0;
        let ankle = Self::chain_point(q, &self.segments(None)).0;
        let heel = self.contact_kinematics(q, ContactPoint::Heel).0;
        let toe = self.contact_kinematics(q, ContactPoint::Toe).0;
        [pelvis, knee, ankle, heel, toe]
            .into_iter()
            .map(planar_to_global)
            .collect()
    }

    fn state_derivative(&self, x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64> {
        let q = x.rows(0, NQ).into_owned();
        let qdot = x.rows(NQ, NQ).into_owned();

        let mut generalized = u.rows(0, NQ).into_owned();
        generalized[1] -= self.params.body_mass * self.params.gravity;
        for j in 3..NQ {
            generalized[j] -= self.params.joint_damping * qdot[j];
        }
        for (i, &point) in self.contact.active_points().iter().enumerate() {
            let f = Vector2::new(u[NQ + 2 * i], u[NQ + 2 * i + 1]);
            let (_, jac) = self.contact_kinematics(&q, point);
            for (j, col) in jac.iter().enumerate() {
                generalized[j] += col.dot(&f);
            }
        }

        let mass = self.mass_diagonal();
        let mut xdot = DVector::zeros(2 * NQ);
        for j in 0..NQ {
            xdot[j] = qdot[j];
            xdot[NQ + j] = generalized[j] / mass[j];
        }
        xdot
    }

    fn contact_loads(&self, q: &DVector<f64>, u: &DVector<f64>) -> Vec<ContactLoad> {
        self.contact
            .active_points()
            .iter()
            .enumerate()
            .map(|(i, &point)| ContactLoad {
                point,
                position: planar_to_global(self.contact_kinematics(q, point).0),
                force: Vector3::new(u[NQ + 2 * i], 0.0, u[NQ + 2 * i + 1]),
            })
            .collect()
    }

    fn vertical_force_index(&self, point: ContactPoint) -> Option<usize> {
        self.contact
            .active_points()
            .iter()
            .position(|&p| p == point)
            .map(|i| NQ + 2 * i + 1)
    }

    fn contact_point_position(
        &self,
        point: ContactPoint,
        q: &DVector<f64>,
    ) -> Option<Vector3<f64>> {
        Some(planar_to_global(self.contact_kinematics(q, point).0))
    }

    fn contact_point_velocity(
        &self,
        point: ContactPoint,
        q: &DVector<f64>,
        qdot: &DVector<f64>,
    ) -> Option<Vector3<f64>> {
        let (_, jac) = self.contact_kinematics(q, point);
        let v = jac
            .iter()
            .enumerate()
            .fold(Vector2::zeros(), |acc, (j, col)| acc + col * qdot[j]);
        Some(planar_to_global(v))
    }
}
