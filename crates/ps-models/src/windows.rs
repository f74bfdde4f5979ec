//! Sliding-window input construction.

use ps_types::{InputConstructor, InputError, InputShape, ModelInputs, RunConfig, SeriesData, TrainingSet};
use tracing::debug;

/// Builds lagged feature rows from a series.
///
/// Repetition `r` holds out the `horizon` values that end `r` points before
/// the end of the series. Training pairs are drawn only from the data in
/// front of the oldest held-out window.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowedInputs;

impl WindowedInputs {
    pub fn new() -> Self {
        Self
    }

    fn feature_row(
        data: &SeriesData,
        end: usize,
        lags: usize,
        other_lags: usize,
        constant: bool,
    ) -> Vec<f64> {
        let columns = data.columns();
        let mut row = Vec::with_capacity(lags + other_lags * (columns.len() - 1) + 1);
        row.extend_from_slice(&columns[0][end - lags..end]);
        for column in &columns[1..] {
            row.extend_from_slice(&column[end - other_lags..end]);
        }
        if constant {
            row.push(1.0);
        }
        row
    }
}

impl InputConstructor for WindowedInputs {
    fn construct(
        &self,
        shape: InputShape,
        data: &SeriesData,
        config: &RunConfig,
    ) -> Result<ModelInputs, InputError> {
        let lags = config.n_steps_in;
        if lags == 0 {
            return Err(InputError::InvalidParameter("n_steps_in must be positive".into()));
        }
        let horizon = config.horizon;
        let repetitions = config.repetitions.max(1);
        let other_lags = if data.is_multicolumn() {
            config.effective_other_columns_length()
        } else {
            0
        };
        let warmup = lags.max(other_lags);
        let target_len = match shape {
            InputShape::OneStep | InputShape::OneStepConstant => 1,
            InputShape::Batch => horizon,
        };
        let constant = shape == InputShape::OneStepConstant;

        let n = data.len();
        let needed = warmup
            .checked_add(target_len)
            .and_then(|v| v.checked_add(horizon))
            .and_then(|v| v.checked_add(repetitions - 1))
            .unwrap_or(usize::MAX);
        if n < needed {
            return Err(InputError::InsufficientData { needed, got: n });
        }

        let train_end = n - horizon - (repetitions - 1);
        let predicted = data.predicted();

        let mut train = TrainingSet::default();
        for end in warmup..=train_end - target_len {
            train
                .features
                .push(Self::feature_row(data, end, lags, other_lags, constant));
            train.targets.push(predicted[end..end + target_len].to_vec());
        }

        let mut test_inputs = Vec::with_capacity(repetitions);
        let mut test_outputs = Vec::with_capacity(repetitions);
        for r in 0..repetitions {
            let cut = n - horizon - r;
            test_inputs.push(Self::feature_row(data, cut, lags, other_lags, constant));
            test_outputs.push(predicted[cut..cut + horizon].to_vec());
        }

        let predict_input = Self::feature_row(data, n, lags, other_lags, constant);

        debug!(
            "Built {} inputs: {} training rows, {} repetitions, row width {}",
            shape,
            train.len(),
            repetitions,
            predict_input.len()
        );

        Ok(ModelInputs {
            shape,
            lags,
            train,
            predict_input,
            test_inputs,
            test_outputs,
        })
    }
}
