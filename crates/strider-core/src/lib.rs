//! Shared foundations for the strider gait-reconstruction benchmark.
//!
//! - [`types`]: gait events, phase timing plans, contact configurations and
//!   transcription schemes
//! - [`config`]: TOML-backed benchmark and solver configuration
//! - [`error`]: the error taxonomy used across every crate

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    BenchmarkConfig, EventDetectionConfig, HessianMode, ObjectiveWeights, SolverConfiguration,
};
pub use error::{
    ConfigError, InfeasibleProblemError, InsufficientDataError, MalformedTimingError,
    SolveFailureError, SolverError, StriderError,
};
pub use types::{
    ContactConfiguration, ContactPoint, GAIT_PHASES, GaitEventTimestamps, PhaseTiming,
    PhaseTimingPlan, TranscriptionScheme,
};
