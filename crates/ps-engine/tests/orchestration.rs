use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

use approx::assert_relative_eq;
use ps_engine::{compare_models, AbortHandle, JsonReporter, Orchestrator, Reporter};
use ps_models::{LastValue, ModelRegistry};
use ps_optimizer::{RunState, MODEL_CRASHED};
use ps_types::{
    ExecutionStrategy, FailureKind, Forecaster, InputShape, ModelError, OptimizationSweep,
    ParameterValue, RunConfig, SeriesData, TaskContext, TrainedModel, TrainingSet,
};

fn seasonal(n: usize, level: f64) -> SeriesData {
    SeriesData::univariate(
        (0..n)
            .map(|i| {
                let t = i as f64;
                level + 0.2 * t + 4.0 * (t * std::f64::consts::PI / 6.0).sin()
            })
            .collect(),
    )
    .unwrap()
}

fn config() -> RunConfig {
    RunConfig::new()
        .with_horizon(4)
        .with_repetitions(2)
        .with_n_steps_in(6)
}

/// Fails every training attempt.
struct Exploding;

impl Forecaster for Exploding {
    fn name(&self) -> &str {
        "exploding"
    }

    fn input_shape(&self) -> InputShape {
        InputShape::Batch
    }

    fn train(
        &self,
        _input: &TrainingSet,
        _ctx: &TaskContext<'_>,
    ) -> Result<Box<dyn TrainedModel>, ModelError> {
        Err(ModelError::TrainingFailed {
            message: "diverged".into(),
        })
    }
}

/// Sleeps before delegating to the last-value forecaster.
struct Sluggish {
    delay: Duration,
}

impl Forecaster for Sluggish {
    fn name(&self) -> &str {
        "sluggish"
    }

    fn input_shape(&self) -> InputShape {
        InputShape::Batch
    }

    fn train(
        &self,
        input: &TrainingSet,
        ctx: &TaskContext<'_>,
    ) -> Result<Box<dyn TrainedModel>, ModelError> {
        thread::sleep(self.delay);
        LastValue.train(input, ctx)
    }
}

/// Requests an abort on its first training and otherwise behaves like
/// the last-value forecaster.
struct AbortingOnTrain {
    abort: Arc<OnceLock<AbortHandle>>,
    trained: Arc<AtomicUsize>,
}

impl Forecaster for AbortingOnTrain {
    fn name(&self) -> &str {
        "aborting"
    }

    fn input_shape(&self) -> InputShape {
        InputShape::Batch
    }

    fn train(
        &self,
        input: &TrainingSet,
        ctx: &TaskContext<'_>,
    ) -> Result<Box<dyn TrainedModel>, ModelError> {
        self.trained.fetch_add(1, Ordering::SeqCst);
        if let Some(abort) = self.abort.get() {
            abort.abort();
        }
        LastValue.train(input, ctx)
    }
}

/// Counts how often it is trained; single-step input.
struct CountingOneStep {
    trained: Arc<AtomicUsize>,
}

impl Forecaster for CountingOneStep {
    fn name(&self) -> &str {
        "counting_one_step"
    }

    fn input_shape(&self) -> InputShape {
        InputShape::OneStep
    }

    fn train(
        &self,
        _input: &TrainingSet,
        _ctx: &TaskContext<'_>,
    ) -> Result<Box<dyn TrainedModel>, ModelError> {
        self.trained.fetch_add(1, Ordering::SeqCst);
        Err(ModelError::TrainingFailed {
            message: "never expected to train".into(),
        })
    }
}

#[test]
fn failing_task_leaves_only_its_cell_missing() {
    let mut registry = ModelRegistry::with_defaults();
    registry.register(Arc::new(Exploding)).unwrap();
    let models = vec![
        "last_value".to_string(),
        "window_average".to_string(),
        "linear_batch".to_string(),
        "exploding".to_string(),
        "linear_one_step".to_string(),
    ];

    let outcome = Orchestrator::new(config().with_repetitions(1), registry)
        .with_models(models)
        .run(&seasonal(120, 50.0))
        .unwrap();

    assert_eq!(outcome.results.len(), 5);
    let failed: Vec<_> = outcome.results.iter().filter(|r| !r.is_success()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].model_id, "exploding");
    assert_eq!(failed[0].failure_kind(), Some(FailureKind::Execution));

    for m in 0..5 {
        assert_eq!(outcome.matrix.error(0, m, 0).is_none(), m == 3);
    }

    let ranking = outcome.ranking.as_ref().unwrap();
    assert!(ranking.best_results_errors[3].is_none());
    assert!(ranking.best_error().is_some());
    assert_ne!(ranking.best_model_id, "exploding");
    assert_eq!(ranking.models.last().unwrap().model_id, "exploding");
    assert!(!ranking.best_optimized_values.contains_key("exploding"));

    let crashed = outcome
        .detailed
        .iter()
        .find(|row| row.model_id == "exploding")
        .unwrap();
    assert!(crashed.note.as_deref().unwrap().starts_with(MODEL_CRASHED));
    assert!(crashed.error.is_infinite());
    assert_eq!(outcome.status.tasks_failed, 1);
}

#[test]
fn disallowed_combination_is_never_trained() {
    let trained = Arc::new(AtomicUsize::new(0));
    let mut registry = ModelRegistry::new();
    registry
        .register(Arc::new(CountingOneStep {
            trained: Arc::clone(&trained),
        }))
        .unwrap();
    registry.register(Arc::new(LastValue)).unwrap();

    let base = seasonal(120, 50.0);
    let other: Vec<f64> = base.predicted().iter().map(|v| v * 2.0 - 3.0).collect();
    let data = SeriesData::new(vec![base.predicted().to_vec(), other]).unwrap();

    let outcome = Orchestrator::new(config(), registry).run(&data).unwrap();
    let rejected: Vec<_> = outcome
        .results
        .iter()
        .filter(|r| r.model_id == "counting_one_step")
        .collect();

    assert_eq!(rejected.len(), 2);
    assert!(rejected
        .iter()
        .all(|r| r.failure_kind() == Some(FailureKind::Configuration)));
    assert_eq!(trained.load(Ordering::SeqCst), 0);
    assert_eq!(outcome.ranking.unwrap().best_model_id, "last_value");
}

#[test]
fn every_strategy_produces_the_same_ranking() {
    let data = seasonal(150, 80.0);
    let sweep = OptimizationSweep::int_range("window", 2, 4);
    let run = |execution: ExecutionStrategy| {
        Orchestrator::new(
            config()
                .with_optimization(sweep.clone())
                .with_execution(execution)
                .with_concurrency_limit(3),
            ModelRegistry::with_defaults(),
        )
        .run(&data)
        .unwrap()
        .ranking
        .unwrap()
    };

    let sequential = run(ExecutionStrategy::Sequential);
    assert_eq!(sequential, run(ExecutionStrategy::ParallelProcesses));
    assert_eq!(sequential, run(ExecutionStrategy::WorkerPool));
    assert_eq!(sequential.optimized_value_errors.len(), 3);
}

#[test]
fn slow_isolated_workers_time_out() {
    let mut registry = ModelRegistry::new();
    registry
        .register(Arc::new(Sluggish {
            delay: Duration::from_secs(3),
        }))
        .unwrap();
    registry.register(Arc::new(LastValue)).unwrap();

    let outcome = Orchestrator::new(
        config()
            .with_repetitions(1)
            .with_execution(ExecutionStrategy::ParallelProcesses)
            .with_task_timeout(Duration::from_millis(200)),
        registry,
    )
    .run(&seasonal(100, 30.0))
    .unwrap();

    let slow = outcome
        .results
        .iter()
        .find(|r| r.model_id == "sluggish")
        .unwrap();
    assert_eq!(slow.failure_kind(), Some(FailureKind::Timeout));
    assert!(slow.wall_time < 3.0);
    assert_eq!(outcome.status.tasks_timed_out, 1);

    let ranking = outcome.ranking.unwrap();
    assert_eq!(ranking.best_model_id, "last_value");
    assert!(ranking.best_results_errors[0].is_none());
}

#[test]
fn abort_during_a_run_stops_dispatch() {
    let abort = Arc::new(OnceLock::new());
    let trained = Arc::new(AtomicUsize::new(0));
    let mut registry = ModelRegistry::new();
    registry
        .register(Arc::new(AbortingOnTrain {
            abort: Arc::clone(&abort),
            trained: Arc::clone(&trained),
        }))
        .unwrap();

    let orchestrator = Orchestrator::new(config().with_repetitions(3), registry);
    abort.set(orchestrator.abort_handle()).unwrap();

    let outcome = orchestrator.run(&seasonal(120, 50.0)).unwrap();

    assert!(outcome.was_aborted());
    assert_eq!(outcome.status.state, RunState::Cancelled);
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(trained.load(Ordering::SeqCst), 1);
}

#[test]
fn sweeping_lags_rebuilds_inputs_per_value() {
    let sweep = OptimizationSweep::int_range("n_steps_in", 3, 6);
    let outcome = Orchestrator::new(
        config().with_optimization(sweep),
        ModelRegistry::with_defaults(),
    )
    .with_models(vec![
        "last_value".into(),
        "window_average".into(),
        "linear_batch".into(),
    ])
    .run(&seasonal(120, 50.0))
    .unwrap();

    assert_eq!(outcome.results.len(), 3 * 4 * 2);
    assert!(outcome.results.iter().all(|r| r.is_success()));

    let ranking = outcome.ranking.unwrap();
    assert_eq!(ranking.optimized_value_errors.len(), 4);
    assert!(ranking.optimized_value_errors.iter().all(|e| e.error.is_some()));
    assert!(matches!(
        ranking.global_best_optimized_value,
        ParameterValue::Int(3..=6)
    ));
    assert_eq!(ranking.best_optimized_values.len(), 3);

    // The last value forecast ignores the lag count.
    let m = outcome.matrix.model_index("last_value").unwrap();
    let first = outcome.matrix.error(0, m, 0).unwrap();
    for o in 1..4 {
        assert_relative_eq!(outcome.matrix.error(0, m, o).unwrap(), first, epsilon = 1e-12);
    }
}

#[test]
fn comparison_across_datasets() {
    let orchestrator = Orchestrator::new(config(), ModelRegistry::with_defaults());
    let comparison = compare_models(
        &orchestrator,
        &[
            ("small".to_string(), seasonal(90, 10.0)),
            ("large".to_string(), seasonal(110, 1000.0)),
        ],
    )
    .unwrap();

    assert_eq!(comparison.datasets, vec!["small", "large"]);
    assert!(comparison.skipped.is_empty());
    assert_eq!(comparison.model_ids.len(), 5);
    assert!(comparison.model_ids.contains(&comparison.best_model_id));
    for value in comparison.standardized_errors.iter().flatten().flatten() {
        assert!((0.0..=1.0).contains(value));
    }
}

#[test]
fn json_report_of_a_validation_run() {
    let data = seasonal(100, 40.0);
    let outcome = Orchestrator::new(
        config().with_mode(ps_types::RunMode::Validate),
        ModelRegistry::with_defaults(),
    )
    .run(&data)
    .unwrap();

    let mut reporter = JsonReporter::new(Vec::new());
    reporter.report(&outcome).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&reporter.into_inner()).unwrap();

    assert_eq!(value["mode"], "validate");
    assert_eq!(value["repetitions"], 1);
    assert_eq!(value["held_out"].as_array().unwrap().len(), 4);
    assert_eq!(value["ranking"]["models"].as_array().unwrap().len(), 5);
}
