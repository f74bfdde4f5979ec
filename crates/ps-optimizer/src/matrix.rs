//! Dense result storage for one orchestration run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use ps_types::{internal_error, invalid_input, PsResult, TaskResult};

/// Dense `repetition × model × optimization value` array of scalar errors.
///
/// Cells start as NaN, the missing sentinel. Zero is a valid error and is
/// never used as a fill value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorCube {
    repetitions: usize,
    models: usize,
    values: usize,
    data: Vec<f64>,
}

impl ErrorCube {
    pub fn new(repetitions: usize, models: usize, values: usize) -> Self {
        Self {
            repetitions,
            models,
            values,
            data: vec![f64::NAN; repetitions * models * values],
        }
    }

    /// Cube filled by `f(r, m, o)`.
    pub fn from_fn(
        repetitions: usize,
        models: usize,
        values: usize,
        mut f: impl FnMut(usize, usize, usize) -> f64,
    ) -> Self {
        let mut cube = Self::new(repetitions, models, values);
        for r in 0..repetitions {
            for m in 0..models {
                for o in 0..values {
                    let offset = cube.offset(r, m, o);
                    cube.data[offset] = f(r, m, o);
                }
            }
        }
        cube
    }

    fn offset(&self, r: usize, m: usize, o: usize) -> usize {
        (r * self.models + m) * self.values + o
    }

    pub fn repetitions(&self) -> usize {
        self.repetitions
    }

    pub fn models(&self) -> usize {
        self.models
    }

    pub fn values(&self) -> usize {
        self.values
    }

    /// Raw value, NaN when missing. Panics when out of bounds.
    pub fn get(&self, r: usize, m: usize, o: usize) -> f64 {
        self.data[self.offset(r, m, o)]
    }

    pub fn set(&mut self, r: usize, m: usize, o: usize, value: f64) {
        let offset = self.offset(r, m, o);
        self.data[offset] = value;
    }

    pub fn is_missing(&self, r: usize, m: usize, o: usize) -> bool {
        self.get(r, m, o).is_nan()
    }

    pub fn missing_count(&self) -> usize {
        self.data.iter().filter(|v| v.is_nan()).count()
    }

    /// `model × value` means over the repetition axis, ignoring missing
    /// cells. A combination with every repetition missing stays NaN.
    pub fn repeated_average(&self) -> Vec<Vec<f64>> {
        (0..self.models)
            .map(|m| {
                (0..self.values)
                    .map(|o| crate::nan_mean((0..self.repetitions).map(|r| self.get(r, m, o))))
                    .collect()
            })
            .collect()
    }
}

/// Counts from one [`ResultMatrix::fold`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldSummary {
    pub folded: usize,
    pub failed: usize,
}

/// Scalar errors for every task plus reality predictions per
/// (model, optimization value).
///
/// Predictions are not repetition indexed: every repetition forecasts from
/// the same reality input, and the lowest successful repetition is kept.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultMatrix {
    model_ids: Vec<String>,
    #[serde(skip)]
    model_index: HashMap<String, usize>,
    horizon: usize,
    evaluated: ErrorCube,
    /// `models * values` vectors of length `horizon`.
    test_results: Vec<Vec<f64>>,
    /// Repetition each `test_results` slot was taken from.
    #[serde(skip)]
    prediction_sources: Vec<Option<usize>>,
}

impl ResultMatrix {
    pub fn new(
        model_ids: &[String],
        optimization_count: usize,
        repetitions: usize,
        horizon: usize,
    ) -> PsResult<Self> {
        if model_ids.is_empty() {
            return Err(invalid_input!("result matrix needs at least one model"));
        }
        if optimization_count == 0 || repetitions == 0 || horizon == 0 {
            return Err(invalid_input!(
                "result matrix dimensions must be positive: {} optimization values, {} repetitions, horizon {}",
                optimization_count,
                repetitions,
                horizon
            ));
        }

        let mut model_index = HashMap::with_capacity(model_ids.len());
        for (i, id) in model_ids.iter().enumerate() {
            if model_index.insert(id.clone(), i).is_some() {
                return Err(invalid_input!("model '{}' appears twice in the run", id));
            }
        }

        Ok(Self {
            model_ids: model_ids.to_vec(),
            model_index,
            horizon,
            evaluated: ErrorCube::new(repetitions, model_ids.len(), optimization_count),
            test_results: vec![vec![f64::NAN; horizon]; model_ids.len() * optimization_count],
            prediction_sources: vec![None; model_ids.len() * optimization_count],
        })
    }

    pub fn model_ids(&self) -> &[String] {
        &self.model_ids
    }

    pub fn model_index(&self, model_id: &str) -> Option<usize> {
        self.model_index.get(model_id).copied()
    }

    pub fn model_count(&self) -> usize {
        self.evaluated.models()
    }

    pub fn optimization_count(&self) -> usize {
        self.evaluated.values()
    }

    pub fn repetitions(&self) -> usize {
        self.evaluated.repetitions()
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn evaluated(&self) -> &ErrorCube {
        &self.evaluated
    }

    /// Scalar error of one task, `None` when missing.
    pub fn error(&self, r: usize, m: usize, o: usize) -> Option<f64> {
        let value = self.evaluated.get(r, m, o);
        (!value.is_nan()).then_some(value)
    }

    /// Reality predictions for one (model, optimization value); NaN-filled
    /// when no repetition succeeded.
    pub fn predictions(&self, m: usize, o: usize) -> &[f64] {
        &self.test_results[m * self.optimization_count() + o]
    }

    /// Write every successful result into its cell.
    ///
    /// Failed results leave their cell missing. An unknown model or an index
    /// outside the matrix is a scheduling bug and aborts the fold.
    pub fn fold(&mut self, results: &[TaskResult]) -> PsResult<FoldSummary> {
        let mut summary = FoldSummary::default();

        for result in results {
            let m = self.model_index(&result.model_id).ok_or_else(|| {
                internal_error!(
                    "result for unknown model '{}' (opt={}, rep={})",
                    result.model_id,
                    result.optimization_index,
                    result.repetition_index
                )
            })?;
            let o = result.optimization_index;
            let r = result.repetition_index;
            if o >= self.optimization_count() || r >= self.repetitions() {
                return Err(internal_error!(
                    "result for '{}' at opt={}, rep={} is outside the {}x{}x{} matrix",
                    result.model_id,
                    o,
                    r,
                    self.repetitions(),
                    self.model_count(),
                    self.optimization_count()
                ));
            }

            if result.failure.is_some() {
                summary.failed += 1;
                continue;
            }

            let error = result.scalar_error.ok_or_else(|| {
                internal_error!(
                    "successful result for '{}' (opt={}, rep={}) has no error",
                    result.model_id,
                    o,
                    r
                )
            })?;
            if result.predictions.len() != self.horizon {
                return Err(internal_error!(
                    "result for '{}' (opt={}, rep={}) has {} predictions, horizon is {}",
                    result.model_id,
                    o,
                    r,
                    result.predictions.len(),
                    self.horizon
                ));
            }

            self.evaluated.set(r, m, o, error);
            let slot = m * self.optimization_count() + o;
            if self.prediction_sources[slot].map_or(true, |kept| r < kept) {
                self.test_results[slot].copy_from_slice(&result.predictions);
                self.prediction_sources[slot] = Some(r);
            }
            summary.folded += 1;
        }

        debug!(
            "Folded {} results ({} failed), {} cells still missing",
            summary.folded,
            summary.failed,
            self.evaluated.missing_count()
        );
        Ok(summary)
    }
}
