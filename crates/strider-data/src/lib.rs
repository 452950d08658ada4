//! Experimental gait data for the strider benchmark.
//!
//! - [`series`]: timestamped signals with linear resampling
//! - [`dataset`]: a trial's raw channels plus its gait events
//! - [`events`]: force-plate gait-event detection
//! - [`timing`]: [`PhaseTimingPlanner`], phase durations and node counts
//! - [`align`]: [`ReferenceSignalAligner`], per-phase reference signals
//! - [`synthetic`]: seeded synthetic trials

pub mod align;
pub mod dataset;
pub mod events;
pub mod series;
pub mod synthetic;
pub mod timing;

pub use align::{PhaseReference, ReferenceSignalAligner, ReferenceSignalSet};
pub use dataset::{Channel, ExperimentalDataset, RawSignals};
pub use events::detect_gait_events;
pub use series::TimeSeries;
pub use synthetic::SyntheticGaitConfig;
pub use timing::{PhaseTimingPlanner, shooting_nodes};
