//! Multi-phase gait optimal control: problem assembly, transcription,
//! solving and benchmarking.
//!
//! # Pipeline
//!
//! ```text
//! PhaseTimingPlan + ReferenceSignalSet + PhaseModelSet
//!     -> MultiPhaseProblemBuilder (per scheme) -> Nlp
//!     -> NlpSolver -> OcpSolution -> SolutionRecord
//! ```
//!
//! [`TranscriptionBenchmarkRunner`] drives this once per
//! [`TranscriptionScheme`](strider_core::TranscriptionScheme) and collects
//! the records in scheme order. [`run_pipeline`] adds event-based timing
//! and signal alignment in front of it.

pub mod bench;
pub mod nlp;
pub mod problem;
pub mod shooting;
pub mod solution;
pub mod solver;
pub mod transcription;

pub use bench::{
    BenchmarkResults, SolutionRecord, SolveOutcome, TranscriptionBenchmarkRunner, run_pipeline,
};
pub use nlp::{BlockKind, Nlp, NlpEvaluation};
pub use problem::{
    COP_TRACKING_MIN_FORCE, MultiPhaseOptimalControlProblem, MultiPhaseProblemBuilder, PhaseLayout,
};
pub use shooting::{ShootingError, single_shooting_error};
pub use solution::{MergedTrajectory, OcpSolution, PhaseSolution};
pub use solver::{NlpSolution, NlpSolver, SolveStatus, SqpSolver};
pub use transcription::{Collocation, Rk4, Transcription, rk4_integrate, transcription_for};
