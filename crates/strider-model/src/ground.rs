//! Net ground reaction from individual contact loads.

use nalgebra::Vector3;

use crate::model::ContactLoad;

/// Vertical force below which the centre of pressure is undefined (N).
pub const MIN_COP_FORCE: f64 = 1e-6;

/// Net force, moment about the global origin, and centre of pressure.
#[derive(Clone, Debug, PartialEq)]
pub struct GroundReaction {
    pub force: Vector3<f64>,
    pub moment: Vector3<f64>,
    /// Point on the ground plane (z = 0) where the net moment has no
    /// horizontal component. `None` when the foot is unloaded.
    pub cop: Option<Vector3<f64>>,
}

impl GroundReaction {
    pub fn from_loads(loads: &[ContactLoad]) -> Self {
        let mut force = Vector3::zeros();
        let mut moment = Vector3::zeros();
        for load in loads {
            force += load.force;
            moment += load.position.cross(&load.force);
        }
        Self {
            force,
            moment,
            cop: centre_of_pressure(&force, &moment),
        }
    }
}

/// Centre of pressure on z = 0 from net force and moment about the origin.
pub fn centre_of_pressure(force: &Vector3<f64>, moment: &Vector3<f64>) -> Option<Vector3<f64>> {
    if force.z.abs() < MIN_COP_FORCE {
        return None;
    }
    // M = c x F with c = (cx, cy, 0): Mx = cy Fz, My = -cx Fz
    Some(Vector3::new(-moment.y / force.z, moment.x / force.z, 0.0))
}
