//! Phase timing: durations and shooting-node counts from gait events.

use strider_core::types::validate_boundaries;
use strider_core::{GaitEventTimestamps, MalformedTimingError, PhaseTiming, PhaseTimingPlan};

/// Number of control intervals for a phase of `duration` at target step
/// `dt`, rounded half-up and never less than one.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn shooting_nodes(duration: f64, dt: f64) -> usize {
    let n = (duration / dt + 0.5).floor();
    if n < 1.0 { 1 } else { n as usize }
}

/// Turns gait-event boundaries into a [`PhaseTimingPlan`] at a target
/// sampling interval.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhaseTimingPlanner {
    target_dt: f64,
}

impl PhaseTimingPlanner {
    pub fn new(target_dt: f64) -> Result<Self, MalformedTimingError> {
        if !target_dt.is_finite() || target_dt <= 0.0 {
            return Err(MalformedTimingError::InvalidSamplingInterval(target_dt));
        }
        Ok(Self { target_dt })
    }

    pub const fn target_dt(&self) -> f64 {
        self.target_dt
    }

    /// Plan the four gait phases between the five event boundaries.
    pub fn plan(
        &self,
        events: &GaitEventTimestamps,
    ) -> Result<PhaseTimingPlan, MalformedTimingError> {
        self.plan_boundaries(&events.boundaries())
    }

    /// Plan one phase per consecutive pair of `boundaries` (at least two).
    pub fn plan_boundaries(
        &self,
        boundaries: &[f64],
    ) -> Result<PhaseTimingPlan, MalformedTimingError> {
        if boundaries.len() < 2 {
            return Err(MalformedTimingError::TooFewBoundaries {
                expected: 2,
                got: boundaries.len(),
            });
        }
        validate_boundaries(boundaries)?;
        let phases = boundaries
            .windows(2)
            .map(|w| {
                let duration = w[1] - w[0];
                PhaseTiming {
                    start: w[0],
                    duration,
                    shooting_nodes: shooting_nodes(duration, self.target_dt),
                }
            })
            .collect();
        Ok(PhaseTimingPlan::new(phases))
    }
}
