//! Immutable run configuration.
//!
//! A [`RunConfig`] is built once and passed by value into the scheduler and
//! executors. Sweeping an input-construction variable produces a new copy per
//! optimization value instead of mutating shared state.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::criterion::ErrorCriterionKind;
use crate::errors::PsResult;
use crate::sweep::{OptimizationSweep, ParameterValue};
use crate::{config_error, invalid_input};

/// Which scheduler runs the batch of task units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    /// One task at a time, in input order.
    #[default]
    Sequential,
    /// One isolated worker per task with its own result channel.
    ParallelProcesses,
    /// A bounded pool of reusable workers fed from a shared queue.
    WorkerPool,
}

impl std::fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::ParallelProcesses => write!(f, "parallel_processes"),
            Self::WorkerPool => write!(f, "worker_pool"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Evaluate on recent windows and forecast past the end of the data.
    #[default]
    Predict,
    /// Hold out the last `horizon` points and forecast them.
    Validate,
}

/// Ordering of the per-task detailed results table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailedSort {
    #[default]
    Unsorted,
    Name,
    Error,
}

/// Input-construction settings that an optimization sweep may override.
pub const SWEEPABLE_INPUT_VARIABLES: &[&str] = &["n_steps_in", "other_columns_length"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Number of predicted values (P).
    pub horizon: usize,
    /// Number of evaluation windows per (model, optimization value) (R).
    pub repetitions: usize,
    /// Lags of the predicted column in each feature row.
    pub n_steps_in: usize,
    /// Lags of each other column; defaults to `n_steps_in`.
    pub other_columns_length: Option<usize>,
    pub error_criterion: ErrorCriterionKind,
    pub execution: ExecutionStrategy,
    /// Worker bound. Pool default: hardware parallelism. Isolated default:
    /// one worker per task.
    pub concurrency_limit: Option<usize>,
    /// Per-task deadline for isolated workers.
    pub task_timeout_ms: Option<u64>,
    pub optimization: Option<OptimizationSweep>,
    pub mode: RunMode,
    /// Truncate the model ranking table; `None` keeps every model.
    pub report_top_models: Option<usize>,
    pub sort_detailed_by: DetailedSort,
    /// Confidence level for bounds around the best forecast; `None` skips
    /// them.
    pub confidence_interval: Option<f64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            horizon: 7,
            repetitions: 3,
            n_steps_in: 10,
            other_columns_length: None,
            error_criterion: ErrorCriterionKind::Mape,
            execution: ExecutionStrategy::Sequential,
            concurrency_limit: None,
            task_timeout_ms: None,
            optimization: None,
            mode: RunMode::Predict,
            report_top_models: None,
            sort_detailed_by: DetailedSort::Unsorted,
            confidence_interval: None,
        }
    }
}

impl RunConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_horizon(mut self, horizon: usize) -> Self {
        self.horizon = horizon;
        self
    }

    pub fn with_repetitions(mut self, repetitions: usize) -> Self {
        self.repetitions = repetitions;
        self
    }

    pub fn with_n_steps_in(mut self, n_steps_in: usize) -> Self {
        self.n_steps_in = n_steps_in;
        self
    }

    pub fn with_other_columns_length(mut self, length: usize) -> Self {
        self.other_columns_length = Some(length);
        self
    }

    pub fn with_error_criterion(mut self, criterion: ErrorCriterionKind) -> Self {
        self.error_criterion = criterion;
        self
    }

    pub fn with_execution(mut self, strategy: ExecutionStrategy) -> Self {
        self.execution = strategy;
        self
    }

    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = Some(limit);
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_optimization(mut self, sweep: OptimizationSweep) -> Self {
        self.optimization = Some(sweep);
        self
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_report_top_models(mut self, n: usize) -> Self {
        self.report_top_models = Some(n);
        self
    }

    pub fn with_confidence_interval(mut self, confidence: f64) -> Self {
        self.confidence_interval = Some(confidence);
        self
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_ms.map(Duration::from_millis)
    }

    pub fn effective_other_columns_length(&self) -> usize {
        self.other_columns_length.unwrap_or(self.n_steps_in)
    }

    /// Ordered optimization values; a single "Not optimized" entry when no
    /// sweep is configured.
    pub fn optimization_values(&self) -> Vec<ParameterValue> {
        match &self.optimization {
            Some(sweep) => sweep.values.clone(),
            None => vec![ParameterValue::not_optimized()],
        }
    }

    pub fn validate(&self) -> PsResult<()> {
        if self.horizon == 0 {
            return Err(invalid_input!("horizon must be at least 1"));
        }
        if self.repetitions == 0 {
            return Err(invalid_input!("repetitions must be at least 1"));
        }
        if self.n_steps_in == 0 {
            return Err(invalid_input!("n_steps_in must be at least 1"));
        }
        if self.concurrency_limit == Some(0) {
            return Err(invalid_input!("concurrency_limit must be at least 1 when set"));
        }
        if let Some(confidence) = self.confidence_interval {
            if !(confidence > 0.0 && confidence < 1.0) {
                return Err(invalid_input!(
                    "confidence_interval must lie strictly between 0 and 1, got {}",
                    confidence
                ));
            }
        }
        if let Some(sweep) = &self.optimization {
            if sweep.is_empty() {
                return Err(invalid_input!(
                    "optimization sweep over '{}' has no values",
                    sweep.variable
                ));
            }
            if sweep.variable == "horizon" || sweep.variable == "repetitions" {
                return Err(invalid_input!(
                    "'{}' fixes the result matrix shape and cannot be swept",
                    sweep.variable
                ));
            }
        }
        Ok(())
    }

    /// Copy of this config with the swept variable set to `value`.
    ///
    /// Variables outside [`SWEEPABLE_INPUT_VARIABLES`] are model parameters:
    /// the copy is unchanged and models read the value from their context.
    pub fn for_optimization_value(&self, value: &ParameterValue) -> PsResult<RunConfig> {
        let mut config = self.clone();
        let Some(sweep) = &self.optimization else {
            return Ok(config);
        };

        match sweep.variable.as_str() {
            "n_steps_in" => {
                config.n_steps_in = value
                    .as_usize()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| config_error!("n_steps_in needs a positive integer, got {value}"))?;
            }
            "other_columns_length" => {
                config.other_columns_length = Some(value.as_usize().ok_or_else(|| {
                    config_error!("other_columns_length needs a non-negative integer, got {value}")
                })?);
            }
            _ => {}
        }
        Ok(config)
    }
}
