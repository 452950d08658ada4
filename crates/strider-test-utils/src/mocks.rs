//! Mock [`NlpSolver`] implementations for exercising runner paths.

use std::sync::atomic::{AtomicUsize, Ordering};

use strider_core::SolverError;
use strider_ocp::{Nlp, NlpSolution, NlpSolver, SolveStatus};

// ---------------------------------------------------------------------------
// FailingSolver
// ---------------------------------------------------------------------------

/// A solver that always breaks down with the same error.
#[derive(Clone, Debug)]
pub struct FailingSolver {
    error: SolverError,
}

impl FailingSolver {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: SolverError::new(message),
        }
    }

    /// Report `iterations` and `last_cost` as the progress made before failing.
    #[must_use]
    pub fn with_progress(mut self, iterations: usize, last_cost: f64) -> Self {
        self.error = self.error.with_progress(iterations, Some(last_cost));
        self
    }
}

impl NlpSolver for FailingSolver {
    fn solve(&self, _nlp: &Nlp) -> Result<NlpSolution, SolverError> {
        Err(self.error.clone())
    }
}

// ---------------------------------------------------------------------------
// FlakySolver
// ---------------------------------------------------------------------------

/// Delegates to `inner`, except on the listed call indices where it fails.
///
/// Calls are counted across threads, so the failing call is only
/// predictable when the runner is sequential.
#[derive(Debug)]
pub struct FlakySolver<S> {
    inner: S,
    fail_on: Vec<usize>,
    calls: AtomicUsize,
}

impl<S: NlpSolver> FlakySolver<S> {
    pub fn new(inner: S, fail_on: Vec<usize>) -> Self {
        Self {
            inner,
            fail_on,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `solve` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<S: NlpSolver> NlpSolver for FlakySolver<S> {
    fn solve(&self, nlp: &Nlp) -> Result<NlpSolution, SolverError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on.contains(&call) {
            return Err(SolverError::new(format!("injected failure on call {call}")));
        }
        self.inner.solve(nlp)
    }
}

// ---------------------------------------------------------------------------
// InitialGuessSolver
// ---------------------------------------------------------------------------

/// Returns the initial guess untouched, reporting the iteration cap.
#[derive(Clone, Copy, Debug, Default)]
pub struct InitialGuessSolver {
    pub iterations: usize,
}

impl NlpSolver for InitialGuessSolver {
    fn solve(&self, nlp: &Nlp) -> Result<NlpSolution, SolverError> {
        let x = nlp.initial_guess();
        let values = nlp.evaluate(&x);
        Ok(NlpSolution {
            x,
            cost: values.cost(),
            constraint_violation: values.max_violation(),
            iterations: self.iterations,
            status: SolveStatus::MaxIterations,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
