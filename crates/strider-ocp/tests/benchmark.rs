//! End-to-end benchmark runs on small integrator problems.

use approx::assert_relative_eq;
use nalgebra::DMatrix;
use strider_core::{
    BenchmarkConfig, InfeasibleProblemError, SolverConfiguration, StriderError, TranscriptionScheme,
};
use strider_data::{Channel, ExperimentalDataset, SyntheticGaitConfig};
use strider_model::{GaitModelFactory, ModelFactory};
use strider_ocp::{
    MultiPhaseProblemBuilder, NlpSolver, SolveOutcome, SqpSolver, TranscriptionBenchmarkRunner,
    run_pipeline, single_shooting_error,
};
use strider_test_utils::{
    FailingSolver, FlakySolver, InitialGuessSolver, TwoPhaseFixture, two_phase_fixture,
};

fn solver() -> SqpSolver {
    SqpSolver::new(SolverConfiguration {
        tolerance: 1e-6,
        max_iterations: 50,
        ..SolverConfiguration::default()
    })
}

fn schemes() -> [TranscriptionScheme; 2] {
    [TranscriptionScheme::rk4(), TranscriptionScheme::collocation()]
}

#[test]
fn two_schemes_produce_ordered_records() {
    let fixture = two_phase_fixture();
    let runner = TranscriptionBenchmarkRunner::new(solver(), MultiPhaseProblemBuilder::default());
    let results = runner
        .run(&schemes(), &fixture.factory(), &fixture.plan, &fixture.references)
        .unwrap();

    assert_eq!(results.len(), 2);
    let names: Vec<&str> = results.iter().map(|r| r.scheme.as_str()).collect();
    assert_eq!(names, vec!["RK4(5)", "COLLOCATION(legendre, 4)"]);
    for record in &results {
        assert!(record.is_converged(), "{} did not converge: {:?}", record.scheme, record.outcome);
        assert_eq!(record.nx, 2);
        assert_eq!(record.nu, 1);
        assert_eq!(record.n_shooting, 10);
        assert!(record.cost.is_some_and(|c| c >= 0.0));
        assert!(record.convergence_time.as_secs_f64() >= 0.0);
        assert!(record.constraint_violation.is_some_and(|v| v < 1e-5));
        let trajectory = record.trajectory.as_ref().unwrap();
        assert_eq!(trajectory.node_count(), 11);
        assert_eq!(trajectory.controls.len(), 10);
    }
    // Collocation carries interior states as extra variables.
    assert!(results.records()[1].n_variables > results.records()[0].n_variables);
}

#[test]
fn parallel_run_keeps_scheme_order() {
    let fixture = two_phase_fixture();
    let runner = TranscriptionBenchmarkRunner::new(solver(), MultiPhaseProblemBuilder::default());
    let schemes = [
        TranscriptionScheme::Collocation { degree: 2 },
        TranscriptionScheme::Rk4 { steps: 1 },
        TranscriptionScheme::Collocation { degree: 3 },
    ];
    let results = runner
        .run_parallel(&schemes, &fixture.factory(), &fixture.plan, &fixture.references)
        .unwrap();
    let names: Vec<String> = results.iter().map(|r| r.scheme.clone()).collect();
    let expected: Vec<String> = schemes.iter().map(TranscriptionScheme::identifier).collect();
    assert_eq!(names, expected);
}

#[test]
fn optimised_trajectory_tracks_exact_solution() {
    let fixture = two_phase_fixture();
    let models = fixture.factory().build();
    let problem = MultiPhaseProblemBuilder::default()
        .build(&models, &fixture.plan, &fixture.references, TranscriptionScheme::rk4())
        .unwrap();
    let solution = solver().solve(problem.nlp()).unwrap();
    let merged = problem.extract(&solution.x).merge_phases();
    // q(0.5) = 0.5 * 0.5^2
    let last = merged.node_count() - 1;
    assert_relative_eq!(merged.states[(0, last)], 0.125, epsilon = 1e-3);
    for u in &merged.controls {
        assert_relative_eq!(u[0], 1.0, epsilon = 1e-2);
    }
}

#[test]
fn consistency_error_detects_wrong_dynamics() {
    let fixture = two_phase_fixture();
    let models = fixture.factory().build();
    let problem = MultiPhaseProblemBuilder::default()
        .build(&models, &fixture.plan, &fixture.references, TranscriptionScheme::collocation())
        .unwrap();
    let solution = solver().solve(problem.nlp()).unwrap();
    let ocp_solution = problem.extract(&solution.x);

    let consistent = single_shooting_error(&ocp_solution, &models, 5).unwrap();
    assert!(consistent.total < 1e-5, "consistent error {}", consistent.total);

    let perturbed = fixture.factory().with_gain(1.5).build();
    let inconsistent = single_shooting_error(&ocp_solution, &perturbed, 5).unwrap();
    assert!(inconsistent.total > 1e-2, "perturbed error {}", inconsistent.total);
    assert!(inconsistent.total > 100.0 * consistent.total);
}

#[test]
fn noisy_references_still_converge() {
    let fixture = TwoPhaseFixture::new(2).with_position_noise(0.005, 11);
    let runner = TranscriptionBenchmarkRunner::new(solver(), MultiPhaseProblemBuilder::default());
    let results = runner
        .run(&schemes(), &fixture.factory(), &fixture.plan, &fixture.references)
        .unwrap();
    assert!(results.iter().all(|r| r.is_converged()));
    assert!(results.iter().all(|r| r.nx == 4 && r.nu == 2));
}

#[test]
fn reference_length_mismatch_aborts_the_benchmark() {
    let mut fixture = two_phase_fixture();
    if let Some(q) = fixture.references.channel_mut(0, Channel::Q) {
        *q = DMatrix::zeros(1, 4);
    }
    let runner = TranscriptionBenchmarkRunner::new(solver(), MultiPhaseProblemBuilder::default());
    let err = runner
        .run(&schemes(), &fixture.factory(), &fixture.plan, &fixture.references)
        .unwrap_err();
    assert_eq!(
        err,
        InfeasibleProblemError::ReferenceLengthMismatch {
            phase: 0,
            channel: "q".into(),
            expected: 5,
            got: 4,
        }
    );
}

#[test]
fn solver_failure_is_recorded_and_next_scheme_runs() {
    let fixture = two_phase_fixture();
    let runner = TranscriptionBenchmarkRunner::new(
        FlakySolver::new(solver(), vec![0]),
        MultiPhaseProblemBuilder::default(),
    );
    let results = runner
        .run(&schemes(), &fixture.factory(), &fixture.plan, &fixture.references)
        .unwrap();
    assert_eq!(runner.solver().calls(), 2);
    assert_eq!(results.len(), 2);

    let failed = &results.records()[0];
    assert!(failed.is_failed());
    assert_eq!(failed.scheme, "RK4(5)");
    assert!(failed.single_shooting.is_none());
    match &failed.outcome {
        SolveOutcome::Failed { reason } => assert!(reason.contains("injected")),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(results.records()[1].is_converged());
}

#[test]
fn failed_record_keeps_partial_progress() {
    let fixture = two_phase_fixture();
    let runner = TranscriptionBenchmarkRunner::new(
        FailingSolver::new("linear system is singular").with_progress(7, 2.5),
        MultiPhaseProblemBuilder::default(),
    );
    let record = runner
        .run_scheme(
            TranscriptionScheme::rk4(),
            &fixture.factory(),
            &fixture.plan,
            &fixture.references,
        )
        .unwrap();
    assert!(record.is_failed());
    assert_eq!(record.iterations, 7);
    assert_eq!(record.cost, Some(2.5));
    assert!(record.trajectory.is_none());
    assert!(record.n_variables > 0);
}

#[test]
fn non_convergence_is_a_reportable_outcome() {
    let fixture = two_phase_fixture();
    let runner = TranscriptionBenchmarkRunner::new(
        InitialGuessSolver { iterations: 3000 },
        MultiPhaseProblemBuilder::default(),
    );
    let results = runner
        .run(&schemes(), &fixture.factory(), &fixture.plan, &fixture.references)
        .unwrap();
    for record in &results {
        assert_eq!(record.outcome, SolveOutcome::NotConverged);
        assert_eq!(record.iterations, 3000);
        assert!(record.cost.is_some());
        assert!(record.single_shooting.is_some());
    }
}

#[test]
fn pipeline_runs_every_configured_scheme_on_a_synthetic_trial() {
    let dataset = SyntheticGaitConfig::default().generate().unwrap();
    let config = BenchmarkConfig {
        target_dt: 0.05,
        solver: SolverConfiguration {
            max_iterations: 300,
            ..SolverConfiguration::default()
        },
        ..BenchmarkConfig::default()
    };
    let results = run_pipeline(&dataset, &config, &GaitModelFactory::default()).unwrap();
    let names: Vec<&str> = results.iter().map(|r| r.scheme.as_str()).collect();
    assert_eq!(names, vec!["RK4(5)", "COLLOCATION(legendre, 4)"]);
    for record in &results {
        assert!(!record.is_failed(), "{} failed: {:?}", record.scheme, record.outcome);
        assert_eq!(record.nx, 12);
        assert_eq!(record.n_shooting, 20);
        assert!(record.iterations >= 1);
        assert!(record.cost.is_some_and(f64::is_finite));
        assert!(record.trajectory.is_some());
        assert!(record.single_shooting.is_some());
    }
}

#[test]
fn collocation_degrees_all_solve_on_a_clean_trial() {
    let dataset = SyntheticGaitConfig {
        marker_noise_std: 0.0,
        force_noise_std: 0.0,
        ..SyntheticGaitConfig::default()
    }
    .generate()
    .unwrap();
    let config = BenchmarkConfig {
        target_dt: 0.05,
        solver: SolverConfiguration {
            max_iterations: 300,
            ..SolverConfiguration::default()
        },
        schemes: (1..=5).map(|degree| TranscriptionScheme::Collocation { degree }).collect(),
        ..BenchmarkConfig::default()
    };
    let results = run_pipeline(&dataset, &config, &GaitModelFactory::default()).unwrap();
    assert_eq!(results.len(), 5);
    for record in &results {
        assert!(!record.is_failed(), "{} failed: {:?}", record.scheme, record.outcome);
    }
}

#[test]
fn pipeline_rejects_uncovered_phase_windows() {
    let generated = SyntheticGaitConfig::default().generate().unwrap();
    let mut events = *generated.events();
    events.cycle_end = 1.5;
    let dataset = ExperimentalDataset::new(generated.signals().clone(), events);
    let err = run_pipeline(&dataset, &BenchmarkConfig::default(), &GaitModelFactory::default())
        .unwrap_err();
    assert!(matches!(err, StriderError::Data(_)), "got {err}");
}

#[test]
fn pipeline_rejects_invalid_config() {
    let dataset = SyntheticGaitConfig::default().generate().unwrap();
    let config = BenchmarkConfig {
        target_dt: -0.01,
        ..BenchmarkConfig::default()
    };
    let err = run_pipeline(&dataset, &config, &GaitModelFactory::default()).unwrap_err();
    assert!(matches!(err, StriderError::Config(_)));
}
