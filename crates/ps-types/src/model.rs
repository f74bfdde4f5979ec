//! Model capability interface consumed by the orchestration core.

use serde::{Deserialize, Serialize};

use crate::errors::ModelError;
use crate::inputs::TrainingSet;
use crate::sweep::ParameterValue;
use crate::task::StaticContext;

/// Input layout a model expects from the input constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputShape {
    /// One target value per row; multi-step forecasts are made recursively.
    OneStep,
    /// Like `OneStep` with a trailing constant feature.
    OneStepConstant,
    /// One target row of horizon length per feature row.
    Batch,
}

impl InputShape {
    pub fn is_single_step(self) -> bool {
        matches!(self, Self::OneStep | Self::OneStepConstant)
    }
}

impl std::fmt::Display for InputShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OneStep => write!(f, "one_step"),
            Self::OneStepConstant => write!(f, "one_step_constant"),
            Self::Batch => write!(f, "batch"),
        }
    }
}

/// Read-only view handed to a model for one task.
#[derive(Debug, Clone, Copy)]
pub struct TaskContext<'a> {
    pub optimization_value: &'a ParameterValue,
    pub statics: &'a StaticContext,
    /// Number of predicted-column lags at the front of each feature row.
    pub lags: usize,
}

impl TaskContext<'_> {
    pub fn horizon(&self) -> usize {
        self.statics.horizon
    }
}

/// A forecasting model that can be registered and swept.
pub trait Forecaster: Send + Sync {
    /// Unique registration key.
    fn name(&self) -> &str;

    fn input_shape(&self) -> InputShape;

    fn supports_multicolumn(&self) -> bool {
        true
    }

    fn train(
        &self,
        input: &TrainingSet,
        ctx: &TaskContext<'_>,
    ) -> Result<Box<dyn TrainedModel>, ModelError>;
}

/// State produced by [`Forecaster::train`].
pub trait TrainedModel: Send {
    /// Forecast `ctx.horizon()` values from one feature row.
    fn predict(&self, input: &[f64], ctx: &TaskContext<'_>) -> Result<Vec<f64>, ModelError>;
}
