//! Error criteria used to score a forecast against held-out values.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A pure scoring function `(predicted, actual) -> error`, lower is better.
///
/// Pairs where either side is NaN are skipped. When no pair is comparable
/// the criterion returns NaN, which the orchestration treats as missing.
pub trait ErrorCriterion: Send + Sync {
    fn evaluate(&self, predicted: &[f64], actual: &[f64]) -> f64;

    /// Short name used in report headers (e.g. "mape").
    fn name(&self) -> &str;
}

fn comparable_pairs<'a>(
    predicted: &'a [f64],
    actual: &'a [f64],
) -> impl Iterator<Item = (f64, f64)> + 'a {
    predicted
        .iter()
        .zip(actual.iter())
        .map(|(p, a)| (*p, *a))
        .filter(|(p, a)| !p.is_nan() && !a.is_nan())
}

/// Mean absolute percentage error, in percent.
///
/// Zero actuals carry no percentage information and are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mape;

impl ErrorCriterion for Mape {
    fn evaluate(&self, predicted: &[f64], actual: &[f64]) -> f64 {
        let (sum, n) = comparable_pairs(predicted, actual)
            .filter(|(_, a)| *a != 0.0)
            .fold((0.0, 0usize), |(sum, n), (p, a)| {
                (sum + ((a - p) / a).abs(), n + 1)
            });
        if n == 0 {
            f64::NAN
        } else {
            100.0 * sum / n as f64
        }
    }

    fn name(&self) -> &str {
        "mape"
    }
}

/// Root mean squared error.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rmse;

impl ErrorCriterion for Rmse {
    fn evaluate(&self, predicted: &[f64], actual: &[f64]) -> f64 {
        let (sum, n) = comparable_pairs(predicted, actual)
            .fold((0.0, 0usize), |(sum, n), (p, a)| (sum + (a - p).powi(2), n + 1));
        if n == 0 {
            f64::NAN
        } else {
            (sum / n as f64).sqrt()
        }
    }

    fn name(&self) -> &str {
        "rmse"
    }
}

/// Built-in criteria selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCriterionKind {
    #[default]
    Mape,
    Rmse,
}

impl ErrorCriterionKind {
    pub fn build(self) -> Arc<dyn ErrorCriterion> {
        match self {
            Self::Mape => Arc::new(Mape),
            Self::Rmse => Arc::new(Rmse),
        }
    }
}
