//! Fresh, independent model sets per benchmark run.

use std::sync::Arc;

use strider_core::ContactConfiguration;

use crate::model::{PhaseModel, PhaseModelSet};
use crate::planar_leg::{LegParameters, PlanarLegModel};

/// Produces a new, unshared set of phase models on every call.
///
/// Each transcription run builds its problem from its own set so that no
/// model state can leak between runs.
pub trait ModelFactory: Send + Sync {
    fn build(&self) -> PhaseModelSet;
}

impl<F> ModelFactory for F
where
    F: Fn() -> PhaseModelSet + Send + Sync,
{
    fn build(&self) -> PhaseModelSet {
        self()
    }
}

/// Four planar-leg models, one per gait contact configuration.
#[derive(Clone, Debug, Default)]
pub struct GaitModelFactory {
    params: LegParameters,
}

impl GaitModelFactory {
    pub const fn new(params: LegParameters) -> Self {
        Self { params }
    }

    pub const fn params(&self) -> &LegParameters {
        &self.params
    }
}

impl ModelFactory for GaitModelFactory {
    fn build(&self) -> PhaseModelSet {
        PhaseModelSet::new(
            ContactConfiguration::GAIT_CYCLE
                .iter()
                .map(|&contact| {
                    let model = PlanarLegModel::new(contact, self.params.clone());
                    Arc::new(model) as Arc<dyn PhaseModel>
                })
                .collect(),
        )
    }
}
