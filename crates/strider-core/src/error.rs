use thiserror::Error;

/// Top-level error type for the strider pipeline.
#[derive(Debug, Error)]
pub enum StriderError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Malformed timing: {0}")]
    Timing(#[from] MalformedTimingError),

    #[error("Insufficient data: {0}")]
    Data(#[from] InsufficientDataError),

    #[error("Infeasible problem: {0}")]
    Problem(#[from] InfeasibleProblemError),

    #[error("Solve failure: {0}")]
    Solve(#[from] SolveFailureError),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Bad gait-event boundaries or sampling interval.
///
/// Boundaries must be five finite, strictly increasing timestamps; the
/// sampling interval must be finite and positive.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum MalformedTimingError {
    #[error("expected {expected} phase boundaries, got {got}")]
    TooFewBoundaries { expected: usize, got: usize },

    #[error("expected {expected} phase boundaries, got {got}")]
    TooManyBoundaries { expected: usize, got: usize },

    #[error("boundary {index} is not strictly increasing ({previous} -> {next})")]
    NotStrictlyIncreasing {
        index: usize,
        previous: f64,
        next: f64,
    },

    #[error("boundary {index} is not finite")]
    NonFiniteBoundary { index: usize },

    #[error("invalid sampling interval {0} (must be finite and > 0)")]
    InvalidSamplingInterval(f64),
}

/// A raw signal does not cover what the discretization grid needs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InsufficientDataError {
    #[error(
        "channel '{channel}' covers [{available_start}, {available_end}] but phase {phase} needs [{start}, {end}]"
    )]
    WindowNotCovered {
        channel: String,
        phase: usize,
        start: f64,
        end: f64,
        available_start: f64,
        available_end: f64,
    },

    #[error("channel '{channel}' has a gap at phase {phase}, node {node}")]
    Gap {
        channel: String,
        phase: usize,
        node: usize,
    },

    #[error("channel '{channel}' is empty")]
    EmptyChannel { channel: String },

    #[error("channel '{channel}' has {times} timestamps but {samples} samples")]
    SampleCountMismatch {
        channel: String,
        times: usize,
        samples: usize,
    },

    #[error("channel '{channel}' timestamps are not strictly increasing")]
    UnsortedTimestamps { channel: String },

    #[error("gait event '{event}' not found in force-plate data")]
    EventNotFound { event: String },
}

/// Dimension or length mismatch while assembling the optimal-control problem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InfeasibleProblemError {
    #[error("problem has no phases")]
    NoPhases,

    #[error("phase count mismatch: {models} models, {timing} timed phases, {references} reference phases")]
    PhaseCountMismatch {
        models: usize,
        timing: usize,
        references: usize,
    },

    #[error("phase {phase} channel '{channel}' has {got} nodes, expected {expected}")]
    ReferenceLengthMismatch {
        phase: usize,
        channel: String,
        expected: usize,
        got: usize,
    },

    #[error("phase {phase} channel '{channel}' has {got} rows, expected {expected}")]
    ChannelDimensionMismatch {
        phase: usize,
        channel: String,
        expected: usize,
        got: usize,
    },

    #[error("state dimension changes between phase {phase} ({previous}) and the next ({next})")]
    StateDimensionMismatch {
        phase: usize,
        previous: usize,
        next: usize,
    },

    #[error("invalid transcription scheme: {0}")]
    InvalidScheme(String),
}

/// Raised by an NLP solver implementation when the solve itself breaks down.
///
/// Carries whatever progress was made so a failed run can still be reported.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} (after {iterations} iterations)")]
pub struct SolverError {
    pub message: String,
    pub iterations: usize,
    pub last_cost: Option<f64>,
}

impl SolverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            iterations: 0,
            last_cost: None,
        }
    }

    #[must_use]
    pub fn with_progress(mut self, iterations: usize, last_cost: Option<f64>) -> Self {
        self.iterations = iterations;
        self.last_cost = last_cost;
        self
    }
}

/// A solver crash tagged with the transcription scheme that triggered it.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("scheme {scheme}: {source}")]
pub struct SolveFailureError {
    pub scheme: String,
    #[source]
    pub source: SolverError,
}
