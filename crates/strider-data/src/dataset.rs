//! Experimental gait recordings: kinematics, markers, force plate, events.

use std::fmt;

use strider_core::{EventDetectionConfig, GaitEventTimestamps, InsufficientDataError};
use tracing::debug;

use crate::events::detect_gait_events;
use crate::series::TimeSeries;

/// Reference channels tracked by the optimal-control problem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Joint positions.
    Q,
    /// Joint velocities.
    Qdot,
    /// Stacked 3D marker positions (3 rows per marker).
    Markers,
    /// Ground-reaction force (3 rows).
    Grf,
    /// Ground-reaction moment about the global origin (3 rows).
    Moment,
    /// Centre of pressure (3 rows).
    Cop,
}

impl Channel {
    pub const ALL: [Self; 6] = [
        Self::Q,
        Self::Qdot,
        Self::Markers,
        Self::Grf,
        Self::Moment,
        Self::Cop,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Q => "q",
            Self::Qdot => "qdot",
            Self::Markers => "markers",
            Self::Grf => "grf",
            Self::Moment => "moment",
            Self::Cop => "cop",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw timestamped signals of one trial, each possibly at its own rate.
#[derive(Clone, Debug)]
pub struct RawSignals {
    pub q: TimeSeries,
    pub qdot: TimeSeries,
    pub markers: TimeSeries,
    pub grf: TimeSeries,
    pub moment: TimeSeries,
    pub cop: TimeSeries,
}

impl RawSignals {
    pub const fn channel(&self, channel: Channel) -> &TimeSeries {
        match channel {
            Channel::Q => &self.q,
            Channel::Qdot => &self.qdot,
            Channel::Markers => &self.markers,
            Channel::Grf => &self.grf,
            Channel::Moment => &self.moment,
            Channel::Cop => &self.cop,
        }
    }
}

/// Loaded trial signals plus the gait-event timestamps that segment them.
#[derive(Clone, Debug)]
pub struct ExperimentalDataset {
    signals: RawSignals,
    events: GaitEventTimestamps,
}

impl ExperimentalDataset {
    /// Dataset with externally supplied events.
    pub const fn new(signals: RawSignals, events: GaitEventTimestamps) -> Self {
        Self { signals, events }
    }

    /// Dataset whose events are detected from the force-plate channels.
    pub fn with_detected_events(
        signals: RawSignals,
        config: &EventDetectionConfig,
    ) -> Result<Self, InsufficientDataError> {
        let events = detect_gait_events(&signals.grf, &signals.cop, config)?;
        debug!(?events, "detected gait events");
        Ok(Self { signals, events })
    }

    pub const fn signals(&self) -> &RawSignals {
        &self.signals
    }

    pub const fn channel(&self, channel: Channel) -> &TimeSeries {
        self.signals.channel(channel)
    }

    pub const fn events(&self) -> &GaitEventTimestamps {
        &self.events
    }
}
