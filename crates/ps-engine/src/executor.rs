//! Running a single task unit to completion.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use ps_models::ModelRegistry;
use ps_types::{ErrorCriterion, Forecaster, TaskContext, TaskFailure, TaskResult, TaskUnit};

/// Trains and evaluates one model on one task unit.
///
/// Every failure is turned into a [`TaskResult`] carrying a
/// [`TaskFailure`]; nothing here propagates to the scheduler, panics
/// included.
#[derive(Clone)]
pub struct Executor {
    criterion: Arc<dyn ErrorCriterion>,
}

impl Executor {
    pub fn new(criterion: Arc<dyn ErrorCriterion>) -> Self {
        Self { criterion }
    }

    /// Reject model and input combinations that cannot run correctly.
    pub fn check_compatibility(model: &dyn Forecaster, unit: &TaskUnit) -> Result<(), TaskFailure> {
        let shape = model.input_shape();
        let statics = &unit.context;

        if shape != unit.inputs.shape {
            return Err(TaskFailure::configuration(format!(
                "model '{}' needs {} inputs, task carries {}",
                model.name(),
                shape,
                unit.inputs.shape
            )));
        }
        if shape.is_single_step() && statics.is_multicolumn() && statics.horizon > 1 {
            return Err(TaskFailure::configuration(format!(
                "model '{}' predicts one step at a time and cannot forecast {} steps of multi-column data",
                model.name(),
                statics.horizon
            )));
        }
        if statics.is_multicolumn() && !model.supports_multicolumn() {
            return Err(TaskFailure::configuration(format!(
                "model '{}' does not accept multi-column data",
                model.name()
            )));
        }
        if unit.repetition_index >= unit.inputs.repetitions() {
            return Err(TaskFailure::configuration(format!(
                "repetition {} requested but inputs hold {}",
                unit.repetition_index,
                unit.inputs.repetitions()
            )));
        }
        Ok(())
    }

    pub fn execute(&self, unit: &TaskUnit, model: &dyn Forecaster) -> TaskResult {
        let key = unit.key();
        if let Err(failure) = Self::check_compatibility(model, unit) {
            debug!("Rejected {}: {}", key, failure);
            return TaskResult::failed(key, failure, 0.0);
        }

        let start = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| self.train_and_evaluate(unit, model)));
        let wall_time = start.elapsed().as_secs_f64();

        match outcome {
            Ok(Ok((predictions, error))) => TaskResult::success(key, predictions, error, wall_time),
            Ok(Err(message)) => {
                debug!("{} failed: {}", key, message);
                TaskResult::failed(key, TaskFailure::execution(message), wall_time)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!("{} panicked: {}", key, message);
                TaskResult::failed(
                    key,
                    TaskFailure::execution(format!("model panicked: {message}")),
                    wall_time,
                )
            }
        }
    }

    /// Reality forecast and the scalar error of the unit's repetition.
    fn train_and_evaluate(
        &self,
        unit: &TaskUnit,
        model: &dyn Forecaster,
    ) -> Result<(Vec<f64>, f64), String> {
        let inputs = &unit.inputs;
        let ctx = TaskContext {
            optimization_value: &unit.optimization_value,
            statics: &unit.context,
            lags: inputs.lags,
        };
        let horizon = ctx.horizon();
        let r = unit.repetition_index;

        let trained = model.train(&inputs.train, &ctx).map_err(|e| e.to_string())?;

        let test_prediction = trained
            .predict(&inputs.test_inputs[r], &ctx)
            .map_err(|e| e.to_string())?;
        check_length("test", &test_prediction, horizon)?;

        let error = self
            .criterion
            .evaluate(&test_prediction, &inputs.test_outputs[r]);
        if !error.is_finite() {
            return Err(format!("{} error is not finite ({error})", self.criterion.name()));
        }

        let predictions = trained
            .predict(&inputs.predict_input, &ctx)
            .map_err(|e| e.to_string())?;
        check_length("reality", &predictions, horizon)?;

        Ok((predictions, error))
    }
}

fn check_length(label: &str, predictions: &[f64], horizon: usize) -> Result<(), String> {
    if predictions.len() == horizon {
        Ok(())
    } else {
        Err(format!(
            "{label} forecast has {} values, expected {horizon}",
            predictions.len()
        ))
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Resolves a unit's model by name and hands both to the executor.
///
/// Shared read-only by all workers of a scheduler.
pub struct TaskRunner {
    registry: ModelRegistry,
    executor: Executor,
}

impl TaskRunner {
    pub fn new(registry: ModelRegistry, criterion: Arc<dyn ErrorCriterion>) -> Self {
        Self {
            registry,
            executor: Executor::new(criterion),
        }
    }

    pub fn run(&self, unit: &TaskUnit) -> TaskResult {
        match self.registry.get(&unit.model_id) {
            Some(model) => self.executor.execute(unit, model.as_ref()),
            None => TaskResult::failed(
                unit.key(),
                TaskFailure::configuration(format!("model '{}' is not registered", unit.model_id)),
                0.0,
            ),
        }
    }
}
