//! Task units handed to executors and the results they produce.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::{FailureKind, TaskFailure};
use crate::inputs::{ModelInputs, SeriesData};
use crate::sweep::ParameterValue;

/// Number of trailing points used for the context mean and std.
const CONTEXT_TAIL: usize = 30;

/// Run-wide facts about the data, shared read-only by every task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticContext {
    pub horizon: usize,
    pub column_count: usize,
    pub last_value: f64,
    pub data_mean: f64,
    pub data_std: f64,
    pub data_abs_max: f64,
}

impl StaticContext {
    pub fn from_series(data: &SeriesData, horizon: usize) -> Self {
        let column = data.predicted();
        let tail = &column[column.len().saturating_sub(CONTEXT_TAIL)..];
        let n = tail.len().max(1) as f64;
        let data_mean = tail.iter().sum::<f64>() / n;
        let data_std = (tail.iter().map(|v| (v - data_mean).powi(2)).sum::<f64>() / n).sqrt();
        let data_abs_max = column.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));

        Self {
            horizon,
            column_count: data.column_count(),
            last_value: column.last().copied().unwrap_or(f64::NAN),
            data_mean,
            data_std,
            data_abs_max,
        }
    }

    pub fn is_multicolumn(&self) -> bool {
        self.column_count > 1
    }
}

/// Identity of a task: unique per run by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskKey {
    pub model_id: String,
    pub optimization_index: usize,
    pub optimization_value: ParameterValue,
    pub repetition_index: usize,
}

impl std::fmt::Display for TaskKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}[opt={} ({}), rep={}]",
            self.model_id, self.optimization_index, self.optimization_value, self.repetition_index
        )
    }
}

/// One (model, optimization value, repetition) combination and its inputs.
///
/// Inputs and context are reference counted so the many units built from
/// one input construction share a single immutable copy.
#[derive(Debug, Clone)]
pub struct TaskUnit {
    pub model_id: String,
    pub optimization_index: usize,
    pub optimization_value: ParameterValue,
    pub repetition_index: usize,
    pub inputs: Arc<ModelInputs>,
    pub context: Arc<StaticContext>,
}

impl TaskUnit {
    pub fn key(&self) -> TaskKey {
        TaskKey {
            model_id: self.model_id.clone(),
            optimization_index: self.optimization_index,
            optimization_value: self.optimization_value.clone(),
            repetition_index: self.repetition_index,
        }
    }
}

/// Outcome of executing one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub model_id: String,
    pub optimization_index: usize,
    pub optimization_value: ParameterValue,
    pub repetition_index: usize,
    /// Reality forecast, `horizon` values; empty on failure.
    pub predictions: Vec<f64>,
    /// `None` means missing.
    pub scalar_error: Option<f64>,
    /// Seconds spent in train and predict.
    pub wall_time: f64,
    pub failure: Option<TaskFailure>,
}

impl TaskResult {
    pub fn success(key: TaskKey, predictions: Vec<f64>, scalar_error: f64, wall_time: f64) -> Self {
        Self {
            model_id: key.model_id,
            optimization_index: key.optimization_index,
            optimization_value: key.optimization_value,
            repetition_index: key.repetition_index,
            predictions,
            scalar_error: Some(scalar_error),
            wall_time,
            failure: None,
        }
    }

    pub fn failed(key: TaskKey, failure: TaskFailure, wall_time: f64) -> Self {
        Self {
            model_id: key.model_id,
            optimization_index: key.optimization_index,
            optimization_value: key.optimization_value,
            repetition_index: key.repetition_index,
            predictions: Vec::new(),
            scalar_error: None,
            wall_time,
            failure: Some(failure),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure.as_ref().map(|f| f.kind)
    }
}
