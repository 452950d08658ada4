//! Resampling of experimental channels onto each phase's node grid.

use nalgebra::DMatrix;
use strider_core::{InsufficientDataError, PhaseTimingPlan};
use tracing::debug;

use crate::dataset::{Channel, ExperimentalDataset};

/// Reference values of one phase, one column per node (`shooting_nodes + 1`).
#[derive(Clone, Debug, PartialEq)]
pub struct PhaseReference {
    pub q: DMatrix<f64>,
    pub qdot: DMatrix<f64>,
    pub markers: DMatrix<f64>,
    pub grf: DMatrix<f64>,
    pub moment: DMatrix<f64>,
    pub cop: DMatrix<f64>,
}

impl PhaseReference {
    pub const fn channel(&self, channel: Channel) -> &DMatrix<f64> {
        match channel {
            Channel::Q => &self.q,
            Channel::Qdot => &self.qdot,
            Channel::Markers => &self.markers,
            Channel::Grf => &self.grf,
            Channel::Moment => &self.moment,
            Channel::Cop => &self.cop,
        }
    }

    fn channel_mut(&mut self, channel: Channel) -> &mut DMatrix<f64> {
        match channel {
            Channel::Q => &mut self.q,
            Channel::Qdot => &mut self.qdot,
            Channel::Markers => &mut self.markers,
            Channel::Grf => &mut self.grf,
            Channel::Moment => &mut self.moment,
            Channel::Cop => &mut self.cop,
        }
    }

    /// Node count of the kinematic channel.
    pub fn node_count(&self) -> usize {
        self.q.ncols()
    }
}

/// Per-phase references, in phase order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReferenceSignalSet {
    phases: Vec<PhaseReference>,
}

impl ReferenceSignalSet {
    pub const fn new(phases: Vec<PhaseReference>) -> Self {
        Self { phases }
    }

    pub fn phases(&self) -> &[PhaseReference] {
        &self.phases
    }

    pub fn phase(&self, index: usize) -> Option<&PhaseReference> {
        self.phases.get(index)
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// Mutable access to one channel of one phase.
    pub fn channel_mut(&mut self, phase: usize, channel: Channel) -> Option<&mut DMatrix<f64>> {
        self.phases.get_mut(phase).map(|p| p.channel_mut(channel))
    }
}

/// Linear resampling of every channel to every phase's node times.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReferenceSignalAligner;

impl ReferenceSignalAligner {
    pub const fn new() -> Self {
        Self
    }

    /// Resample `dataset` onto `plan`.
    ///
    /// Phase `i` gets exactly `shooting_nodes_i + 1` columns per channel.
    /// Fails if a channel does not cover a phase window or produces a
    /// non-finite value at some node.
    pub fn align(
        &self,
        dataset: &ExperimentalDataset,
        plan: &PhaseTimingPlan,
    ) -> Result<ReferenceSignalSet, InsufficientDataError> {
        let mut phases = Vec::with_capacity(plan.len());
        for (phase, timing) in plan.phases().iter().enumerate() {
            let times = timing.node_times();
            let resample = |channel: Channel| -> Result<DMatrix<f64>, InsufficientDataError> {
                let series = dataset.channel(channel);
                let window_err = || InsufficientDataError::WindowNotCovered {
                    channel: channel.name().into(),
                    phase,
                    start: timing.start,
                    end: timing.end(),
                    available_start: series.start(),
                    available_end: series.end(),
                };
                if !series.covers(timing.start, timing.end()) {
                    return Err(window_err());
                }
                let values = series.resample(&times).ok_or_else(window_err)?;
                if let Some(node) = (0..values.ncols())
                    .find(|&k| values.column(k).iter().any(|v| !v.is_finite()))
                {
                    return Err(InsufficientDataError::Gap {
                        channel: channel.name().into(),
                        phase,
                        node,
                    });
                }
                Ok(values)
            };
            phases.push(PhaseReference {
                q: resample(Channel::Q)?,
                qdot: resample(Channel::Qdot)?,
                markers: resample(Channel::Markers)?,
                grf: resample(Channel::Grf)?,
                moment: resample(Channel::Moment)?,
                cop: resample(Channel::Cop)?,
            });
            debug!(phase, nodes = times.len(), "aligned reference signals");
        }
        Ok(ReferenceSignalSet::new(phases))
    }
}
