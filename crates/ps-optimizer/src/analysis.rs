//! Reduction of a result matrix into rankings and best optimized values.
//!
//! The repetition axis is reduced first by a NaN-ignoring mean, then the
//! model and optimization axes by NaN-ignoring argmin. Ties go to the lower
//! index, so the reduction is reproducible for any input order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use ps_types::{invalid_input, ParameterValue, PsResult};

use crate::matrix::ResultMatrix;

/// Mean of the non-NaN values; NaN when every value is missing.
pub fn nan_mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, n) = values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

/// Index of the smallest non-NaN value; the first one wins ties.
pub fn nan_argmin(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, current)) if !(v < current) => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

fn present(value: f64) -> Option<f64> {
    (!value.is_nan()).then_some(value)
}

/// One row of the model ranking table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedModel {
    /// 1-based position after sorting by error.
    pub order: usize,
    pub model_id: String,
    pub error: Option<f64>,
    pub best_optimized_value: Option<ParameterValue>,
    /// Reality forecast at the best optimized value.
    pub predictions: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedValueError {
    pub value: ParameterValue,
    /// Error averaged over repetitions and then over models.
    pub error: Option<f64>,
}

/// Terminal output of an orchestration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingResult {
    /// Per model, in run order: the best mean-over-repetitions error.
    pub best_results_errors: Vec<Option<f64>>,
    /// Per model, in run order: index of the optimization value achieving it.
    pub best_optimized_indices: Vec<Option<usize>>,
    /// Model id to best optimized value. Models without any result are absent.
    pub best_optimized_values: BTreeMap<String, ParameterValue>,
    pub best_model_index: usize,
    pub best_model_id: String,
    pub global_best_optimized_value: ParameterValue,
    /// Empty when a single optimization value was evaluated.
    pub optimized_value_errors: Vec<OptimizedValueError>,
    /// Models sorted by best error, missing last.
    pub models: Vec<RankedModel>,
    pub best_model_predictions: Vec<f64>,
}

impl RankingResult {
    pub fn best_error(&self) -> Option<f64> {
        self.best_results_errors
            .get(self.best_model_index)
            .copied()
            .flatten()
    }

    /// Keep only the first `n` rows of the ranking table.
    pub fn truncate_models(&mut self, n: usize) {
        self.models.truncate(n);
    }
}

/// Reduce `matrix` into a [`RankingResult`].
///
/// Fails with `InvalidInput` when the model set is empty, when the labels do
/// not match the matrix dimensions, or when every model is entirely missing.
pub fn aggregate(
    matrix: &ResultMatrix,
    model_ids: &[String],
    optimization_values: &[ParameterValue],
) -> PsResult<RankingResult> {
    if model_ids.is_empty() {
        return Err(invalid_input!("cannot rank an empty model set"));
    }
    if model_ids != matrix.model_ids() {
        return Err(invalid_input!(
            "{} model ids given for a matrix of {} models",
            model_ids.len(),
            matrix.model_count()
        ));
    }
    if optimization_values.len() != matrix.optimization_count() {
        return Err(invalid_input!(
            "{} optimization values given for a matrix with {} columns",
            optimization_values.len(),
            matrix.optimization_count()
        ));
    }

    let averaged = matrix.evaluated().repeated_average();

    let best_optimized_indices: Vec<Option<usize>> =
        averaged.iter().map(|row| nan_argmin(row)).collect();
    let best_errors: Vec<f64> = averaged
        .iter()
        .zip(&best_optimized_indices)
        .map(|(row, idx)| idx.map_or(f64::NAN, |o| row[o]))
        .collect();

    let best_model_index = nan_argmin(&best_errors).ok_or_else(|| {
        invalid_input!(
            "all {} models are missing every result; no best model exists",
            model_ids.len()
        )
    })?;

    let best_optimized_values: BTreeMap<String, ParameterValue> = model_ids
        .iter()
        .zip(&best_optimized_indices)
        .filter_map(|(id, idx)| idx.map(|o| (id.clone(), optimization_values[o].clone())))
        .collect();

    let (global_best_optimized_value, optimized_value_errors) = if optimization_values.len() == 1 {
        (ParameterValue::not_optimized(), Vec::new())
    } else {
        let all_models_error_average: Vec<f64> = (0..optimization_values.len())
            .map(|o| nan_mean(averaged.iter().map(|row| row[o])))
            .collect();
        // At least one model has a value, so at least one column is present.
        let global = nan_argmin(&all_models_error_average)
            .map_or_else(ParameterValue::not_optimized, |o| optimization_values[o].clone());
        let table = optimization_values
            .iter()
            .zip(&all_models_error_average)
            .map(|(value, &error)| OptimizedValueError {
                value: value.clone(),
                error: present(error),
            })
            .collect();
        (global, table)
    };

    let models = ranking_table(matrix, model_ids, optimization_values, &best_errors, &best_optimized_indices);

    let best_model_predictions = best_optimized_indices[best_model_index]
        .map(|o| matrix.predictions(best_model_index, o).to_vec())
        .unwrap_or_default();

    debug!(
        "Aggregated {} models x {} values: best '{}' ({:.4})",
        model_ids.len(),
        optimization_values.len(),
        model_ids[best_model_index],
        best_errors[best_model_index]
    );

    Ok(RankingResult {
        best_results_errors: best_errors.iter().copied().map(present).collect(),
        best_optimized_indices,
        best_optimized_values,
        best_model_index,
        best_model_id: model_ids[best_model_index].clone(),
        global_best_optimized_value,
        optimized_value_errors,
        models,
        best_model_predictions,
    })
}

fn ranking_table(
    matrix: &ResultMatrix,
    model_ids: &[String],
    optimization_values: &[ParameterValue],
    best_errors: &[f64],
    best_indices: &[Option<usize>],
) -> Vec<RankedModel> {
    let mut order: Vec<usize> = (0..model_ids.len()).collect();
    // Stable: equal errors keep run order, missing sorts last.
    order.sort_by(|&a, &b| {
        let (ea, eb) = (best_errors[a], best_errors[b]);
        match (ea.is_nan(), eb.is_nan()) {
            (false, false) => ea.total_cmp(&eb),
            (false, true) => std::cmp::Ordering::Less,
            (true, false) => std::cmp::Ordering::Greater,
            (true, true) => std::cmp::Ordering::Equal,
        }
    });

    order
        .into_iter()
        .enumerate()
        .map(|(rank, m)| RankedModel {
            order: rank + 1,
            model_id: model_ids[m].clone(),
            error: present(best_errors[m]),
            best_optimized_value: best_indices[m].map(|o| optimization_values[o].clone()),
            predictions: best_indices[m]
                .map(|o| matrix.predictions(m, o).to_vec())
                .unwrap_or_default(),
        })
        .collect()
}
