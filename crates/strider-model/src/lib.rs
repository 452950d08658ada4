//! Per-phase dynamics models for multi-phase gait optimal control.
//!
//! The problem builder only sees the [`PhaseModel`] trait: one model per
//! contact phase, each evaluating `xdot = f(x, u)`, marker kinematics and
//! contact loads for its own [`ContactConfiguration`](strider_core::ContactConfiguration).
//!
//! Two implementations ship with the crate:
//!
//! 1. [`PlanarLegModel`]: pelvis + hip/knee/ankle leg with heel and toe contacts
//! 2. [`LinearIntegratorModel`]: contact-free double integrator for checks
//!    with known exact solutions
//!
//! [`ModelFactory`] hands out a fresh [`PhaseModelSet`] per run.

pub mod factory;
pub mod ground;
pub mod integrator;
pub mod model;
pub mod planar_leg;

pub use factory::{GaitModelFactory, ModelFactory};
pub use ground::{GroundReaction, centre_of_pressure};
pub use integrator::LinearIntegratorModel;
pub use model::{ContactLoad, DofKind, PhaseModel, PhaseModelSet, split_state};
pub use planar_leg::{LegParameters, MARKER_NAMES, PlanarLegModel};
