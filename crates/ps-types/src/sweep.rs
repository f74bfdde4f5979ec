//! Optimization values and the sweeps that enumerate them.

use serde::{Deserialize, Serialize};

/// Label used for the single implicit value of a run without a sweep.
pub const NOT_OPTIMIZED: &str = "Not optimized";

/// A concrete value of the swept variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    Json(serde_json::Value),
}

impl ParameterValue {
    /// The sentinel standing in for "no optimization was applied".
    pub fn not_optimized() -> Self {
        Self::Json(serde_json::Value::String(NOT_OPTIMIZED.to_string()))
    }

    pub fn is_not_optimized(&self) -> bool {
        matches!(self, Self::Json(serde_json::Value::String(s)) if s == NOT_OPTIMIZED)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Json(v) => v.as_f64(),
        }
    }

    /// Non-negative integral value, if the value has one.
    pub fn as_usize(&self) -> Option<usize> {
        match self {
            Self::Int(v) => usize::try_from(*v).ok(),
            Self::Float(v) if v.fract() == 0.0 && *v >= 0.0 => Some(*v as usize),
            Self::Json(v) => v.as_u64().and_then(|n| usize::try_from(n).ok()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Int(v) => Some(*v != 0),
            Self::Json(v) => v.as_bool(),
            Self::Float(_) => None,
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Json(serde_json::Value::String(s)) => write!(f, "{s}"),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        Self::Json(serde_json::Value::String(v.to_string()))
    }
}

/// An ordered list of candidate values for one configuration variable.
///
/// The variable either names an input-construction setting of
/// [`crate::RunConfig`] (see [`crate::RunConfig::for_optimization_value`]) or
/// is an opaque model parameter that forecasters read from their task
/// context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationSweep {
    pub variable: String,
    pub values: Vec<ParameterValue>,
}

impl OptimizationSweep {
    pub fn new(variable: impl Into<String>, values: Vec<ParameterValue>) -> Self {
        Self {
            variable: variable.into(),
            values,
        }
    }

    /// Every integer in `[low, high]` inclusive.
    pub fn int_range(variable: impl Into<String>, low: i64, high: i64) -> Self {
        Self::new(variable, (low..=high).map(ParameterValue::Int).collect())
    }

    /// `steps` evenly spaced points on `[low, high]` (at least two).
    pub fn float_range(variable: impl Into<String>, low: f64, high: f64, steps: usize) -> Self {
        let steps = steps.max(2);
        let values = (0..steps)
            .map(|i| {
                let t = i as f64 / (steps - 1) as f64;
                ParameterValue::Float(low + t * (high - low))
            })
            .collect();
        Self::new(variable, values)
    }

    /// `steps` points evenly spaced in log-space on `[low, high]`.
    pub fn log_uniform(variable: impl Into<String>, low: f64, high: f64, steps: usize) -> Self {
        let steps = steps.max(2);
        let log_low = low.ln();
        let log_high = high.ln();
        let values = (0..steps)
            .map(|i| {
                let t = i as f64 / (steps - 1) as f64;
                ParameterValue::Float((log_low + t * (log_high - log_low)).exp())
            })
            .collect();
        Self::new(variable, values)
    }

    /// Categorical choices, kept in the given order.
    pub fn choices(variable: impl Into<String>, values: Vec<serde_json::Value>) -> Self {
        Self::new(variable, values.into_iter().map(ParameterValue::Json).collect())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
