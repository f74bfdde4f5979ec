//! End-to-end orchestration of one sweep over a series.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use ps_models::{ModelRegistry, WindowedInputs};
use ps_optimizer::{aggregate, detailed_table, DetailedRow, RankingResult, ResultMatrix, RunId, RunStatus};
use ps_types::{
    invalid_input, InputConstructor, InputShape, ParameterValue, PsError, PsResult, RunConfig,
    RunMode, SeriesData, StaticContext, TaskResult, TaskUnit,
};

use crate::cancel::AbortHandle;
use crate::executor::TaskRunner;
use crate::interval::{IntervalEstimator, PredictionBounds, ResidualInterval};
use crate::progress::ProgressTracker;
use crate::scheduler::scheduler_for;

/// Everything one orchestration run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: RunId,
    /// Configuration the tasks actually ran with, after the data-length
    /// guard and validate mode adjusted it.
    pub config: RunConfig,
    pub model_ids: Vec<String>,
    pub optimization_values: Vec<ParameterValue>,
    /// `None` when the run was aborted before aggregation.
    pub ranking: Option<RankingResult>,
    pub results: Vec<TaskResult>,
    pub detailed: Vec<DetailedRow>,
    pub matrix: ResultMatrix,
    /// Validate mode: the held-out actual values the reality forecast covers.
    pub held_out: Option<Vec<f64>>,
    /// Bounds around the best forecast when a confidence level is set and
    /// the estimator succeeded.
    pub bounds: Option<PredictionBounds>,
    pub status: RunStatus,
}

impl RunOutcome {
    pub fn was_aborted(&self) -> bool {
        self.ranking.is_none()
    }
}

/// Builds task units from a series, schedules them and ranks the results.
#[derive(Clone)]
pub struct Orchestrator {
    config: RunConfig,
    registry: ModelRegistry,
    models: Option<Vec<String>>,
    inputs: Arc<dyn InputConstructor>,
    intervals: Arc<dyn IntervalEstimator>,
    abort: AbortHandle,
    progress: ProgressTracker,
}

impl Orchestrator {
    pub fn new(config: RunConfig, registry: ModelRegistry) -> Self {
        Self {
            config,
            registry,
            models: None,
            inputs: Arc::new(WindowedInputs::new()),
            intervals: Arc::new(ResidualInterval),
            abort: AbortHandle::new(),
            progress: ProgressTracker::new(),
        }
    }

    /// Restrict the run to these registered models, in this order.
    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = Some(models);
        self
    }

    pub fn with_input_constructor(mut self, inputs: Arc<dyn InputConstructor>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_interval_estimator(mut self, intervals: Arc<dyn IntervalEstimator>) -> Self {
        self.intervals = intervals;
        self
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Handle that cancels the current and every later run. An abort stays
    /// in effect until [`AbortHandle::reset`] is called; `run` never clears
    /// it.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn progress(&self) -> ProgressTracker {
        self.progress.clone()
    }

    fn model_ids(&self) -> PsResult<Vec<String>> {
        let ids = match &self.models {
            Some(models) => models.clone(),
            None => self.registry.names(),
        };
        if ids.is_empty() {
            return Err(invalid_input!("no models selected for the run"));
        }
        if let Some(unknown) = ids.iter().find(|id| !self.registry.contains(id)) {
            return Err(invalid_input!("model '{}' is not registered", unknown));
        }
        Ok(ids)
    }

    /// Run the whole sweep. Fatal errors abort the run with no partial
    /// ranking; per-task failures only leave their cells missing.
    pub fn run(&self, data: &SeriesData) -> PsResult<RunOutcome> {
        let status = self.progress.reset();
        info!("Starting run {}", status.id);
        self.progress.update(|s| s.mark_running());

        let outcome = self.run_inner(data);
        match &outcome {
            Ok(outcome) if outcome.was_aborted() => {
                warn!("Run {} cancelled", outcome.run_id);
            }
            Ok(outcome) => info!("Run {} completed", outcome.run_id),
            Err(e) => {
                warn!("Run {} failed: {}", status.id, e);
                self.progress.update(|s| s.mark_failed(e.to_string()));
            }
        }
        outcome
    }

    /// Run the sweep once per listed column, each time predicting that
    /// column with the others as exogenous columns. An empty list means every
    /// column.
    ///
    /// Columns whose run fails are logged and left out of the map. An abort
    /// stops the remaining columns.
    pub fn run_columns(
        &self,
        data: &SeriesData,
        columns: &[usize],
    ) -> PsResult<BTreeMap<usize, RunOutcome>> {
        let columns: Vec<usize> = if columns.is_empty() {
            (0..data.column_count()).collect()
        } else {
            columns.to_vec()
        };

        let mut outcomes = BTreeMap::new();
        for column in columns {
            let outcome = data
                .with_predicted(column)
                .map_err(PsError::from)
                .and_then(|series| self.run(&series));
            match outcome {
                Ok(outcome) => {
                    let aborted = outcome.was_aborted();
                    outcomes.insert(column, outcome);
                    if aborted {
                        warn!("Column runs aborted at column {}", column);
                        break;
                    }
                }
                Err(e) => warn!("Skipping column {}: {}", column, e),
            }
        }
        if outcomes.is_empty() {
            return Err(invalid_input!("no column could be predicted"));
        }
        Ok(outcomes)
    }

    fn run_inner(&self, data: &SeriesData) -> PsResult<RunOutcome> {
        let complete_start = Instant::now();
        self.config.validate()?;
        let model_ids = self.model_ids()?;
        let mut config = self.config.clone();

        let (data, held_out) = match config.mode {
            RunMode::Predict => (data.clone(), None),
            RunMode::Validate => {
                let (head, tail) = data.split_tail(config.horizon).map_err(|e| {
                    invalid_input!("validate mode cannot hold out {} points: {}", config.horizon, e)
                })?;
                config.repetitions = 1;
                (head, Some(tail))
            }
        };
        self.guard_data_length(&data, &mut config)?;

        let statics = Arc::new(StaticContext::from_series(&data, config.horizon));
        let optimization_values = config.optimization_values();

        let phase_start = Instant::now();
        let units = self.build_units(&data, &config, &model_ids, &optimization_values, &statics);
        self.progress.update(|s| {
            s.record_phase("input_construction", phase_start.elapsed().as_secs_f64());
            s.add_tasks(units.len());
        });
        info!(
            "Built {} tasks: {} models x {} optimization values x {} repetitions",
            units.len(),
            model_ids.len(),
            optimization_values.len(),
            config.repetitions
        );

        let phase_start = Instant::now();
        let runner = Arc::new(TaskRunner::new(
            self.registry.clone(),
            config.error_criterion.build(),
        ));
        let scheduler = scheduler_for(&config);
        let results = scheduler.run(units, &runner, &self.abort, &self.progress);
        self.progress
            .update(|s| s.record_phase("predict", phase_start.elapsed().as_secs_f64()));

        let phase_start = Instant::now();
        let mut matrix = ResultMatrix::new(
            &model_ids,
            optimization_values.len(),
            config.repetitions,
            config.horizon,
        )?;
        matrix.fold(&results)?;

        let ranking = if self.abort.is_aborted() {
            None
        } else {
            let mut ranking = aggregate(&matrix, &model_ids, &optimization_values)?;
            if let Some(n) = config.report_top_models {
                ranking.truncate_models(n);
            }
            Some(ranking)
        };
        let detailed = detailed_table(&results, config.sort_detailed_by);
        let bounds = self.bounds(&data, &config, ranking.as_ref());

        let status = self.progress.update(|s| {
            s.record_phase("evaluation", phase_start.elapsed().as_secs_f64());
            s.record_phase("complete", complete_start.elapsed().as_secs_f64());
            if ranking.is_some() {
                s.mark_completed();
            } else {
                s.mark_cancelled();
            }
            s.clone()
        });

        Ok(RunOutcome {
            run_id: status.id,
            config,
            model_ids,
            optimization_values,
            ranking,
            results,
            detailed,
            matrix,
            held_out,
            bounds,
            status,
        })
    }

    /// Confidence bounds around the best forecast. Failures only cost the
    /// bounds.
    fn bounds(
        &self,
        data: &SeriesData,
        config: &RunConfig,
        ranking: Option<&RankingResult>,
    ) -> Option<PredictionBounds> {
        let confidence = config.confidence_interval?;
        let ranking = ranking?;
        match self.intervals.estimate(
            data.predicted(),
            &ranking.best_model_predictions,
            confidence,
        ) {
            Ok(bounds) => Some(bounds),
            Err(e) => {
                warn!("No confidence bounds for '{}': {}", ranking.best_model_id, e);
                None
            }
        }
    }

    /// Reject series too short for the horizon and drop to one repetition
    /// when there is not enough data for all of them.
    fn guard_data_length(&self, data: &SeriesData, config: &mut RunConfig) -> PsResult<()> {
        let n = data.len();
        let minimum = config
            .horizon
            .checked_mul(3)
            .and_then(|v| v.checked_add(config.n_steps_in))
            .filter(|minimum| n > *minimum)
            .ok_or_else(|| {
                invalid_input!(
                    "series has {} points, too few for {} predicted values after {} lags; set fewer predicted values or add more data",
                    n,
                    config.horizon,
                    config.n_steps_in
                )
            })?;
        let with_repetitions = config
            .repetitions
            .checked_mul(config.horizon)
            .and_then(|v| v.checked_add(minimum));
        if config.repetitions > 1 && with_repetitions.map_or(true, |needed| n < needed) {
            warn!(
                "Series of {} points is too short for {} repetitions, using one",
                n, config.repetitions
            );
            config.repetitions = 1;
        }
        Ok(())
    }

    /// Cartesian product of optimization values, input shapes, models and
    /// repetitions. Input construction failures only drop the affected
    /// tasks.
    fn build_units(
        &self,
        data: &SeriesData,
        config: &RunConfig,
        model_ids: &[String],
        optimization_values: &[ParameterValue],
        statics: &Arc<StaticContext>,
    ) -> Vec<TaskUnit> {
        let shapes: Vec<(String, InputShape)> = model_ids
            .iter()
            .filter_map(|id| self.registry.get(id).map(|m| (id.clone(), m.input_shape())))
            .collect();
        let distinct: BTreeSet<InputShape> = shapes.iter().map(|(_, shape)| *shape).collect();

        let mut units = Vec::new();
        for (o, value) in optimization_values.iter().enumerate() {
            let value_config = match config.for_optimization_value(value) {
                Ok(c) => c,
                Err(e) => {
                    warn!("Skipping optimization value {}: {}", value, e);
                    continue;
                }
            };

            for shape in &distinct {
                let inputs = match self.inputs.construct(*shape, data, &value_config) {
                    Ok(inputs) => Arc::new(inputs),
                    Err(e) => {
                        warn!("Could not build {} inputs for value {}: {}", shape, value, e);
                        continue;
                    }
                };

                for (model_id, _) in shapes.iter().filter(|(_, s)| s == shape) {
                    for r in 0..config.repetitions {
                        units.push(TaskUnit {
                            model_id: model_id.clone(),
                            optimization_index: o,
                            optimization_value: value.clone(),
                            repetition_index: r,
                            inputs: Arc::clone(&inputs),
                            context: Arc::clone(statics),
                        });
                    }
                }
            }
        }
        units
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("models", &self.models)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ps_optimizer::RunState;
    use ps_types::{FailureKind, OptimizationSweep, PsError};

    fn seasonal(n: usize) -> SeriesData {
        SeriesData::univariate(
            (0..n)
                .map(|i| 50.0 + 0.3 * i as f64 + 5.0 * (i as f64 * std::f64::consts::PI / 6.0).sin())
                .collect(),
        )
        .unwrap()
    }

    fn config() -> RunConfig {
        RunConfig::new().with_horizon(4).with_repetitions(3).with_n_steps_in(6)
    }

    #[test]
    fn default_run_ranks_every_model() {
        let outcome = Orchestrator::new(config(), ModelRegistry::with_defaults())
            .run(&seasonal(120))
            .unwrap();
        let ranking = outcome.ranking.as_ref().unwrap();

        assert_eq!(ranking.models.len(), 5);
        assert!(ranking.best_error().is_some());
        assert!(ranking.global_best_optimized_value.is_not_optimized());
        assert_eq!(ranking.best_model_predictions.len(), 4);
        assert_eq!(outcome.results.len(), 5 * 3);
        assert_eq!(outcome.status.state, RunState::Completed);
        assert!(outcome.status.phase_seconds("complete").is_some());
    }

    #[test]
    fn short_series_is_invalid_input() {
        let err = Orchestrator::new(config(), ModelRegistry::with_defaults())
            .run(&seasonal(18))
            .unwrap_err();
        assert!(matches!(err, PsError::InvalidInput(ref m) if m.contains("add more data")));
    }

    #[test]
    fn oversized_horizon_is_invalid_input_not_overflow() {
        let registry = ModelRegistry::with_defaults();
        for mode in [RunMode::Predict, RunMode::Validate] {
            let err = Orchestrator::new(
                config().with_horizon(usize::MAX / 2).with_mode(mode),
                registry.clone(),
            )
            .run(&seasonal(120))
            .unwrap_err();
            assert!(matches!(err, PsError::InvalidInput(_)), "{mode:?}: {err}");
        }
    }

    #[test]
    fn oversized_repetitions_fall_back_to_one() {
        let outcome = Orchestrator::new(
            config().with_repetitions(usize::MAX / 2),
            ModelRegistry::with_defaults(),
        )
        .with_models(vec!["last_value".into()])
        .run(&seasonal(60))
        .unwrap();
        assert_eq!(outcome.config.repetitions, 1);
    }

    #[test]
    fn too_short_for_repetitions_falls_back_to_one() {
        // minimum = 3*4 + 6 = 18; with 3 repetitions 30 points are needed.
        let outcome = Orchestrator::new(config(), ModelRegistry::with_defaults())
            .with_models(vec!["last_value".into()])
            .run(&seasonal(25))
            .unwrap();
        assert_eq!(outcome.config.repetitions, 1);
        assert_eq!(outcome.matrix.repetitions(), 1);
    }

    #[test]
    fn unknown_or_empty_model_selection_is_rejected() {
        let orchestrator = Orchestrator::new(config(), ModelRegistry::with_defaults());
        assert!(orchestrator
            .clone()
            .with_models(vec![])
            .run(&seasonal(120))
            .is_err());
        assert!(orchestrator
            .with_models(vec!["prophet".into()])
            .run(&seasonal(120))
            .is_err());
    }

    #[test]
    fn validate_mode_holds_out_horizon() {
        let data = seasonal(100);
        let outcome = Orchestrator::new(config().with_mode(RunMode::Validate), ModelRegistry::with_defaults())
            .run(&data)
            .unwrap();
        assert_eq!(outcome.config.repetitions, 1);
        assert_eq!(outcome.held_out.as_deref(), Some(&data.predicted()[96..]));
    }

    #[test]
    fn invalid_sweep_values_only_drop_their_column() {
        let sweep = OptimizationSweep::new(
            "n_steps_in",
            vec![ParameterValue::Int(4), ParameterValue::Float(2.5), ParameterValue::Int(8)],
        );
        let outcome = Orchestrator::new(config().with_optimization(sweep), ModelRegistry::with_defaults())
            .with_models(vec!["last_value".into(), "linear_batch".into()])
            .run(&seasonal(120))
            .unwrap();
        let ranking = outcome.ranking.unwrap();
        assert_eq!(ranking.optimized_value_errors.len(), 3);
        assert_eq!(ranking.optimized_value_errors[1].error, None);
        assert_ne!(ranking.global_best_optimized_value, ParameterValue::Float(2.5));
        assert_eq!(outcome.results.len(), 2 * 2 * 3);
    }

    #[test]
    fn multicolumn_data_rejects_one_step_models() {
        let base = seasonal(120);
        let other: Vec<f64> = base.predicted().iter().map(|v| v * 0.5 + 1.0).collect();
        let data = SeriesData::new(vec![base.predicted().to_vec(), other]).unwrap();
        let outcome = Orchestrator::new(config(), ModelRegistry::with_defaults())
            .run(&data)
            .unwrap();

        let one_step: Vec<&TaskResult> = outcome
            .results
            .iter()
            .filter(|r| r.model_id.starts_with("linear_one_step"))
            .collect();
        assert_eq!(one_step.len(), 6);
        assert!(one_step
            .iter()
            .all(|r| r.failure_kind() == Some(FailureKind::Configuration)));
        let ranking = outcome.ranking.unwrap();
        assert!(ranking.best_results_errors[2].is_none());
        assert!(ranking.best_results_errors[0].is_some());
    }

    #[test]
    fn abort_before_run_cancels() {
        let orchestrator = Orchestrator::new(config(), ModelRegistry::with_defaults());
        orchestrator.abort_handle().abort();
        let outcome = orchestrator.run(&seasonal(120)).unwrap();
        assert!(outcome.was_aborted());
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.status.state, RunState::Cancelled);
        assert_eq!(orchestrator.progress().snapshot().state, RunState::Cancelled);
    }

    #[test]
    fn abort_persists_until_reset() {
        let orchestrator = Orchestrator::new(config(), ModelRegistry::with_defaults())
            .with_models(vec!["last_value".into()]);
        let abort = orchestrator.abort_handle();
        abort.abort();
        assert!(orchestrator.run(&seasonal(120)).unwrap().was_aborted());
        assert!(orchestrator.run(&seasonal(120)).unwrap().was_aborted());

        abort.reset();
        let outcome = orchestrator.run(&seasonal(120)).unwrap();
        assert!(!outcome.was_aborted());
        assert_eq!(outcome.status.state, RunState::Completed);
    }

    #[test]
    fn confidence_bounds_surround_the_best_forecast() {
        let outcome = Orchestrator::new(
            config().with_confidence_interval(0.9),
            ModelRegistry::with_defaults(),
        )
        .run(&seasonal(120))
        .unwrap();
        let ranking = outcome.ranking.as_ref().unwrap();
        let bounds = outcome.bounds.as_ref().unwrap();

        assert_eq!(bounds.confidence, 0.9);
        assert_eq!(bounds.lower.len(), 4);
        for (h, p) in ranking.best_model_predictions.iter().enumerate() {
            assert!(bounds.lower[h] < *p && *p < bounds.upper[h]);
        }
    }

    #[test]
    fn no_bounds_without_a_confidence_level() {
        let outcome = Orchestrator::new(config(), ModelRegistry::with_defaults())
            .with_models(vec!["last_value".into()])
            .run(&seasonal(120))
            .unwrap();
        assert!(outcome.bounds.is_none());
    }

    struct FailingInterval;

    impl IntervalEstimator for FailingInterval {
        fn estimate(&self, _: &[f64], _: &[f64], _: f64) -> PsResult<PredictionBounds> {
            Err(invalid_input!("no residuals"))
        }
    }

    #[test]
    fn failed_bounds_keep_the_ranking() {
        let outcome = Orchestrator::new(
            config().with_confidence_interval(0.95),
            ModelRegistry::with_defaults(),
        )
        .with_models(vec!["last_value".into(), "linear_batch".into()])
        .with_interval_estimator(Arc::new(FailingInterval))
        .run(&seasonal(120))
        .unwrap();

        assert!(outcome.bounds.is_none());
        assert!(outcome.ranking.unwrap().best_error().is_some());
        assert_eq!(outcome.status.state, RunState::Completed);
    }

    #[test]
    fn each_column_gets_its_own_run() {
        let base = seasonal(120);
        let scaled: Vec<f64> = base.predicted().iter().map(|v| v * 10.0).collect();
        let data = SeriesData::new(vec![base.predicted().to_vec(), scaled]).unwrap();

        // Column 7 does not exist and is skipped.
        let outcomes = Orchestrator::new(config(), ModelRegistry::with_defaults())
            .with_models(vec!["last_value".into(), "window_average".into()])
            .run_columns(&data, &[1, 7, 0])
            .unwrap();

        assert_eq!(outcomes.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
        let first = outcomes[&0].ranking.as_ref().unwrap().best_model_predictions[0];
        let second = outcomes[&1].ranking.as_ref().unwrap().best_model_predictions[0];
        assert!(second > 5.0 * first);
        assert_ne!(outcomes[&0].run_id, outcomes[&1].run_id);
    }

    #[test]
    fn column_runs_fail_only_when_every_column_fails() {
        let orchestrator = Orchestrator::new(config(), ModelRegistry::with_defaults());
        assert!(orchestrator.run_columns(&seasonal(120), &[3, 4]).is_err());
        assert!(orchestrator.run_columns(&seasonal(18), &[]).is_err());
        assert_eq!(orchestrator.run_columns(&seasonal(120), &[]).unwrap().len(), 1);
    }
}
