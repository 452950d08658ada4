//! Transcription benchmark: one fresh problem and one solve per scheme.

use std::time::{Duration, Instant};

use rayon::prelude::*;
use strider_core::{
    BenchmarkConfig, InfeasibleProblemError, PhaseTimingPlan, SolveFailureError, StriderError,
    TranscriptionScheme,
};
use strider_data::{
    ExperimentalDataset, PhaseTimingPlanner, ReferenceSignalAligner, ReferenceSignalSet,
};
use strider_model::ModelFactory;
use tracing::{info, warn};

use crate::problem::{MultiPhaseOptimalControlProblem, MultiPhaseProblemBuilder};
use crate::shooting::{ShootingError, single_shooting_error};
use crate::solution::MergedTrajectory;
use crate::solver::{NlpSolution, NlpSolver, SolveStatus, SqpSolver};

/// How a benchmark run ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SolveOutcome {
    Converged,
    /// The solver returned without reaching tolerance.
    NotConverged,
    /// The solver itself broke down.
    Failed { reason: String },
}

/// Results of one transcription run. Immutable once created.
#[derive(Clone, Debug, PartialEq)]
pub struct SolutionRecord {
    pub scheme: String,
    /// State dimension (largest over phases).
    pub nx: usize,
    /// Control dimension (largest over phases).
    pub nu: usize,
    /// Control intervals over all phases.
    pub n_shooting: usize,
    pub n_variables: usize,
    pub n_constraints: usize,
    pub iterations: usize,
    /// Final objective; last known cost for a failed run, if any.
    pub cost: Option<f64>,
    pub convergence_time: Duration,
    pub single_shooting: Option<ShootingError>,
    pub constraint_violation: Option<f64>,
    pub outcome: SolveOutcome,
    pub trajectory: Option<MergedTrajectory>,
}

impl SolutionRecord {
    pub fn is_converged(&self) -> bool {
        self.outcome == SolveOutcome::Converged
    }

    pub const fn is_failed(&self) -> bool {
        matches!(self.outcome, SolveOutcome::Failed { .. })
    }
}

/// Ordered, append-only collection of [`SolutionRecord`]s.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BenchmarkResults {
    records: Vec<SolutionRecord>,
}

impl BenchmarkResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: SolutionRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[SolutionRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SolutionRecord> {
        self.records.iter()
    }

    pub fn get(&self, index: usize) -> Option<&SolutionRecord> {
        self.records.get(index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<'a> IntoIterator for &'a BenchmarkResults {
    type Item = &'a SolutionRecord;
    type IntoIter = std::slice::Iter<'a, SolutionRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Solves the same gait problem under several transcription schemes.
///
/// Every scheme gets its own model set from the factory and its own NLP;
/// upstream timing and references are only read.
pub struct TranscriptionBenchmarkRunner<S: NlpSolver> {
    solver: S,
    builder: MultiPhaseProblemBuilder,
    shooting_substeps: usize,
}

impl<S: NlpSolver> TranscriptionBenchmarkRunner<S> {
    pub const fn new(solver: S, builder: MultiPhaseProblemBuilder) -> Self {
        Self {
            solver,
            builder,
            shooting_substeps: 5,
        }
    }

    /// RK4 substeps per interval used by the single-shooting check (min 1).
    #[must_use]
    pub fn with_shooting_substeps(mut self, substeps: usize) -> Self {
        self.shooting_substeps = substeps.max(1);
        self
    }

    pub const fn solver(&self) -> &S {
        &self.solver
    }

    /// Run every scheme in order.
    ///
    /// A solver breakdown is recorded as a failed run and the next scheme
    /// still runs; a problem that cannot be assembled aborts the benchmark.
    pub fn run(
        &self,
        schemes: &[TranscriptionScheme],
        factory: &dyn ModelFactory,
        plan: &PhaseTimingPlan,
        references: &ReferenceSignalSet,
    ) -> Result<BenchmarkResults, InfeasibleProblemError> {
        let mut results = BenchmarkResults::new();
        for &scheme in schemes {
            results.push(self.run_scheme(scheme, factory, plan, references)?);
        }
        Ok(results)
    }

    /// Like [`run`](Self::run), with schemes solved concurrently on the
    /// rayon pool. Records keep scheme order.
    pub fn run_parallel(
        &self,
        schemes: &[TranscriptionScheme],
        factory: &dyn ModelFactory,
        plan: &PhaseTimingPlan,
        references: &ReferenceSignalSet,
    ) -> Result<BenchmarkResults, InfeasibleProblemError> {
        let records: Vec<SolutionRecord> = schemes
            .par_iter()
            .map(|&scheme| self.run_scheme(scheme, factory, plan, references))
            .collect::<Result<_, _>>()?;
        let mut results = BenchmarkResults::new();
        for record in records {
            results.push(record);
        }
        Ok(results)
    }

    /// Build, solve and measure a single scheme.
    pub fn run_scheme(
        &self,
        scheme: TranscriptionScheme,
        factory: &dyn ModelFactory,
        plan: &PhaseTimingPlan,
        references: &ReferenceSignalSet,
    ) -> Result<SolutionRecord, InfeasibleProblemError> {
        let models = factory.build();
        let problem = self.builder.build(&models, plan, references, scheme)?;
        let nlp = problem.nlp();
        info!(
            scheme = %scheme,
            variables = nlp.n_variables(),
            constraints = nlp.n_constraints(),
            "solving"
        );

        let start = Instant::now();
        let result = self.solver.solve(nlp);
        let convergence_time = start.elapsed();

        let record = match result {
            Ok(solution) => {
                let ocp_solution = problem.extract(&solution.x);
                let single_shooting =
                    single_shooting_error(&ocp_solution, &models, self.shooting_substeps);
                let record = completed_record(
                    &problem,
                    &solution,
                    convergence_time,
                    single_shooting,
                    ocp_solution.merge_phases(),
                );
                if record.is_converged() {
                    info!(
                        scheme = %scheme,
                        iterations = record.iterations,
                        cost = solution.cost,
                        elapsed_ms = convergence_time.as_secs_f64() * 1e3,
                        "converged"
                    );
                } else {
                    warn!(
                        scheme = %scheme,
                        status = ?solution.status,
                        iterations = record.iterations,
                        cost = solution.cost,
                        "did not converge"
                    );
                }
                record
            }
            Err(source) => {
                let failure = SolveFailureError {
                    scheme: scheme.identifier(),
                    source,
                };
                warn!(error = %failure, "solve failed, recording and continuing");
                failed_record(&problem, &failure, convergence_time)
            }
        };
        Ok(record)
    }
}

fn completed_record(
    problem: &MultiPhaseOptimalControlProblem,
    solution: &NlpSolution,
    convergence_time: Duration,
    single_shooting: Option<ShootingError>,
    trajectory: MergedTrajectory,
) -> SolutionRecord {
    let outcome = if solution.status == SolveStatus::Converged {
        SolveOutcome::Converged
    } else {
        SolveOutcome::NotConverged
    };
    SolutionRecord {
        scheme: problem.scheme().identifier(),
        nx: problem.nx(),
        nu: problem.nu(),
        n_shooting: problem.n_shooting(),
        n_variables: problem.nlp().n_variables(),
        n_constraints: problem.nlp().n_constraints(),
        iterations: solution.iterations,
        cost: Some(solution.cost),
        convergence_time,
        single_shooting,
        constraint_violation: Some(solution.constraint_violation),
        outcome,
        trajectory: Some(trajectory),
    }
}

fn failed_record(
    problem: &MultiPhaseOptimalControlProblem,
    failure: &SolveFailureError,
    convergence_time: Duration,
) -> SolutionRecord {
    SolutionRecord {
        scheme: failure.scheme.clone(),
        nx: problem.nx(),
        nu: problem.nu(),
        n_shooting: problem.n_shooting(),
        n_variables: problem.nlp().n_variables(),
        n_constraints: problem.nlp().n_constraints(),
        iterations: failure.source.iterations,
        cost: failure.source.last_cost,
        convergence_time,
        single_shooting: None,
        constraint_violation: None,
        outcome: SolveOutcome::Failed {
            reason: failure.source.message.clone(),
        },
        trajectory: None,
    }
}

/// Full pipeline on one trial: plan phases from the dataset's events,
/// align its signals, then benchmark every configured scheme with the
/// default SQP solver.
///
/// Timing, alignment and assembly errors abort with no partial results.
pub fn run_pipeline(
    dataset: &ExperimentalDataset,
    config: &BenchmarkConfig,
    factory: &dyn ModelFactory,
) -> Result<BenchmarkResults, StriderError> {
    config.validate()?;
    let plan = PhaseTimingPlanner::new(config.target_dt)?.plan(dataset.events())?;
    info!(
        phases = plan.len(),
        nodes = ?plan.shooting_nodes(),
        duration = plan.total_duration(),
        "planned phase timing"
    );
    let references = ReferenceSignalAligner::new().align(dataset, &plan)?;

    let runner = TranscriptionBenchmarkRunner::new(
        SqpSolver::new(config.solver.clone()),
        MultiPhaseProblemBuilder::new(config.weights),
    )
    .with_shooting_substeps(config.shooting_substeps);
    let results = if config.parallel {
        runner.run_parallel(&config.schemes, factory, &plan, &references)?
    } else {
        runner.run(&config.schemes, factory, &plan, &references)?
    };
    info!(
        runs = results.len(),
        converged = results.iter().filter(|r| r.is_converged()).count(),
        "benchmark finished"
    );
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_are_append_only_in_order() {
        let mut results = BenchmarkResults::new();
        assert!(results.is_empty());
        for scheme in ["a", "b"] {
            results.push(SolutionRecord {
                scheme: scheme.into(),
                nx: 2,
                nu: 1,
                n_shooting: 10,
                n_variables: 31,
                n_constraints: 20,
                iterations: 3,
                cost: Some(1.0),
                convergence_time: Duration::from_millis(4),
                single_shooting: None,
                constraint_violation: Some(0.0),
                outcome: SolveOutcome::NotConverged,
                trajectory: None,
            });
        }
        let names: Vec<&str> = results.iter().map(|r| r.scheme.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(results.get(1).map(|r| r.scheme.as_str()), Some("b"));
        assert!(!results.records()[0].is_converged());
    }
}
