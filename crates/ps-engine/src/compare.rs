//! Model comparison across several datasets.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use ps_optimizer::{nan_argmin, nan_mean};
use ps_types::{invalid_input, ParameterValue, PsResult, RunMode, SeriesData};

use crate::orchestrator::Orchestrator;

/// Outcome of [`compare_models`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelComparison {
    /// Datasets that contributed, in input order.
    pub datasets: Vec<String>,
    pub skipped: Vec<String>,
    pub model_ids: Vec<String>,
    pub optimization_values: Vec<ParameterValue>,
    /// `model × value` standardized errors averaged over datasets.
    pub standardized_errors: Vec<Vec<Option<f64>>>,
    /// Per model, the best standardized error.
    pub model_errors: Vec<Option<f64>>,
    pub best_model_id: String,
    pub best_optimized_value: ParameterValue,
}

/// Scale every present value into `[0, 1]`; a constant matrix maps to 0.
fn min_max_standardize(matrix: &mut [Vec<f64>]) {
    let present = matrix.iter().flatten().copied().filter(|v| !v.is_nan());
    let (min, max) = present.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let span = max - min;
    for value in matrix.iter_mut().flatten() {
        if value.is_nan() {
            continue;
        }
        *value = if span > 0.0 { (*value - min) / span } else { 0.0 };
    }
}

/// Evaluate the same models on every dataset in validate mode and rank
/// them by their standardized error.
///
/// Each dataset's repetition-averaged error matrix is min-max scaled so that
/// datasets of different magnitude weigh the same. Datasets whose run fails
/// are skipped.
pub fn compare_models(
    orchestrator: &Orchestrator,
    datasets: &[(String, SeriesData)],
) -> PsResult<ModelComparison> {
    let validating = orchestrator
        .clone()
        .with_config(orchestrator.config().clone().with_mode(RunMode::Validate));

    let mut used = Vec::new();
    let mut skipped = Vec::new();
    let mut layers: Vec<Vec<Vec<f64>>> = Vec::new();
    let mut labels: Option<(Vec<String>, Vec<ParameterValue>)> = None;

    for (name, data) in datasets {
        let outcome = match validating.run(data) {
            Ok(outcome) if !outcome.was_aborted() => outcome,
            Ok(_) => {
                warn!("Comparison aborted while evaluating '{}'", name);
                skipped.push(name.clone());
                break;
            }
            Err(e) => {
                warn!("Skipping dataset '{}': {}", name, e);
                skipped.push(name.clone());
                continue;
            }
        };

        let mut averaged = outcome.matrix.evaluated().repeated_average();
        min_max_standardize(&mut averaged);
        layers.push(averaged);
        used.push(name.clone());
        if labels.is_none() {
            labels = Some((outcome.model_ids, outcome.optimization_values));
        }
    }

    let Some((model_ids, optimization_values)) = labels else {
        return Err(invalid_input!(
            "none of the {} datasets could be evaluated",
            datasets.len()
        ));
    };

    let standardized: Vec<Vec<f64>> = (0..model_ids.len())
        .map(|m| {
            (0..optimization_values.len())
                .map(|o| nan_mean(layers.iter().map(|layer| layer[m][o])))
                .collect()
        })
        .collect();

    let model_errors: Vec<f64> = standardized
        .iter()
        .map(|row| nan_argmin(row).map_or(f64::NAN, |o| row[o]))
        .collect();
    let best_model = nan_argmin(&model_errors)
        .ok_or_else(|| invalid_input!("every model is missing on every dataset"))?;

    let best_optimized_value = if optimization_values.len() == 1 {
        ParameterValue::not_optimized()
    } else {
        let column_means: Vec<f64> = (0..optimization_values.len())
            .map(|o| nan_mean(standardized.iter().map(|row| row[o])))
            .collect();
        nan_argmin(&column_means)
            .map_or_else(ParameterValue::not_optimized, |o| optimization_values[o].clone())
    };

    info!(
        "Compared {} models on {} datasets: best '{}'",
        model_ids.len(),
        used.len(),
        model_ids[best_model]
    );

    let present = |v: f64| (!v.is_nan()).then_some(v);
    Ok(ModelComparison {
        datasets: used,
        skipped,
        best_model_id: model_ids[best_model].clone(),
        standardized_errors: standardized
            .iter()
            .map(|row| row.iter().copied().map(present).collect())
            .collect(),
        model_errors: model_errors.into_iter().map(present).collect(),
        model_ids,
        optimization_values,
        best_optimized_value,
    })
}
