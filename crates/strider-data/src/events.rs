//! Gait-event detection from force-plate signals.
//!
//! - **Heel strike**: first sample whose vertical force reaches the threshold
//! - **Flat foot / forefoot**: first stance samples where the centre of
//!   pressure has progressed the configured fraction of its heel-strike to
//!   toe-off travel
//! - **Toe-off**: first sample after heel strike where vertical force drops
//!   below the threshold
//! - **Cycle end**: next heel strike, or the last sample if the plate does
//!   not see one

use nalgebra::DVector;
use strider_core::{EventDetectionConfig, GaitEventTimestamps, InsufficientDataError};

use crate::series::TimeSeries;

fn not_found(event: &str) -> InsufficientDataError {
    InsufficientDataError::EventNotFound {
        event: event.into(),
    }
}

/// Detect the five gait-phase boundaries of the first stride in `grf`.
///
/// `grf` and `cop` are 3-component series (x, y, z); `cop` is interpolated
/// onto the force timestamps so the two may be sampled differently.
pub fn detect_gait_events(
    grf: &TimeSeries,
    cop: &TimeSeries,
    config: &EventDetectionConfig,
) -> Result<GaitEventTimestamps, InsufficientDataError> {
    if grf.dim() < 3 {
        return Err(InsufficientDataError::EmptyChannel {
            channel: grf.name().into(),
        });
    }
    let times = grf.times();
    let fz = grf.component(2);
    let loaded = |i: usize| fz[i] >= config.force_threshold;

    let heel_strike = (0..times.len())
        .find(|&i| loaded(i))
        .ok_or_else(|| not_found("heel_strike"))?;
    let toe_off = (heel_strike + 1..times.len())
        .find(|&i| !loaded(i))
        .ok_or_else(|| not_found("toe_off"))?;
    let cycle_end = (toe_off + 1..times.len())
        .find(|&i| loaded(i))
        .unwrap_or(times.len() - 1);
    if cycle_end <= toe_off {
        return Err(not_found("cycle_end"));
    }

    let cop_at = |i: usize| -> Result<DVector<f64>, InsufficientDataError> {
        cop.sample(times[i])
            .map(|c| c.rows(0, 3).into_owned())
            .ok_or_else(|| not_found("centre_of_pressure"))
    };
    let cop_start = cop_at(heel_strike)?;
    let travel = cop_at(toe_off - 1)? - &cop_start;
    let travel_sq = travel.norm_squared();
    if travel_sq < f64::EPSILON {
        return Err(not_found("flat_foot"));
    }
    let progress = |i: usize| -> Result<f64, InsufficientDataError> {
        Ok((cop_at(i)? - &cop_start).dot(&travel) / travel_sq)
    };
    let first_progress = |from: usize, fraction: f64, event: &str| {
        for i in from..toe_off {
            if progress(i)? >= fraction {
                return Ok(i);
            }
        }
        Err(not_found(event))
    };

    let flat_foot = first_progress(heel_strike + 1, config.flat_foot_fraction, "flat_foot")?;
    let forefoot = first_progress(flat_foot + 1, config.forefoot_fraction, "forefoot")?;
    if forefoot >= toe_off {
        return Err(not_found("forefoot"));
    }

    Ok(GaitEventTimestamps {
        heel_strike: times[heel_strike],
        flat_foot: times[flat_foot],
        forefoot: times[forefoot],
        toe_off: times[toe_off],
        cycle_end: times[cycle_end],
    })
}
