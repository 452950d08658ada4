//! Shared test fixtures and utilities for strider crates.
//!
//! Provides small multi-phase problems with known exact solutions, solver
//! mocks for exercising failure paths, and deterministic RNG setup.

pub mod fixtures;
pub mod mocks;
pub mod rng;

// ---------------------------------------------------------------------------
// Re-exports for convenience
// ---------------------------------------------------------------------------

pub use fixtures::{IntegratorFactory, TwoPhaseFixture, two_phase_fixture};
pub use mocks::{FailingSolver, FlakySolver, InitialGuessSolver};
pub use rng::{deterministic_vec, seeded_rng};
