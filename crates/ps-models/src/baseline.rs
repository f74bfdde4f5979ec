//! Reference forecasters that need no fitting.

use ps_types::{Forecaster, InputShape, ModelError, TaskContext, TrainedModel, TrainingSet};

fn latest_lags<'a>(input: &'a [f64], ctx: &TaskContext<'_>) -> Result<&'a [f64], ModelError> {
    if ctx.lags == 0 || input.len() < ctx.lags {
        return Err(ModelError::PredictionFailed {
            message: format!(
                "input row has {} values, expected at least {} lags",
                input.len(),
                ctx.lags
            ),
        });
    }
    Ok(&input[..ctx.lags])
}

/// Repeats the most recent observation over the whole horizon.
#[derive(Debug, Clone, Default)]
pub struct LastValue;

struct Persistence;

impl TrainedModel for Persistence {
    fn predict(&self, input: &[f64], ctx: &TaskContext<'_>) -> Result<Vec<f64>, ModelError> {
        let lags = latest_lags(input, ctx)?;
        Ok(vec![lags[lags.len() - 1]; ctx.horizon()])
    }
}

impl Forecaster for LastValue {
    fn name(&self) -> &str {
        "last_value"
    }

    fn input_shape(&self) -> InputShape {
        InputShape::Batch
    }

    fn train(
        &self,
        _input: &TrainingSet,
        _ctx: &TaskContext<'_>,
    ) -> Result<Box<dyn TrainedModel>, ModelError> {
        Ok(Box::new(Persistence))
    }
}

/// Flat forecast at the mean of the latest `window` observations.
///
/// The window is taken from an integral optimization value when one is
/// present, capped at the number of lags. Without one the whole lag window
/// is averaged.
#[derive(Debug, Clone, Default)]
pub struct WindowAverage;

struct FittedAverage {
    window: usize,
}

impl TrainedModel for FittedAverage {
    fn predict(&self, input: &[f64], ctx: &TaskContext<'_>) -> Result<Vec<f64>, ModelError> {
        let lags = latest_lags(input, ctx)?;
        let window = self.window.min(lags.len());
        let recent = &lags[lags.len() - window..];
        let mean = recent.iter().sum::<f64>() / window as f64;
        Ok(vec![mean; ctx.horizon()])
    }
}

impl Forecaster for WindowAverage {
    fn name(&self) -> &str {
        "window_average"
    }

    fn input_shape(&self) -> InputShape {
        InputShape::Batch
    }

    fn train(
        &self,
        _input: &TrainingSet,
        ctx: &TaskContext<'_>,
    ) -> Result<Box<dyn TrainedModel>, ModelError> {
        let window = if ctx.optimization_value.is_not_optimized() {
            ctx.lags
        } else {
            match ctx.optimization_value.as_usize() {
                Some(0) | None => {
                    return Err(ModelError::InvalidParameter {
                        parameter: "window".to_string(),
                        message: format!(
                            "expected a positive integer, got {}",
                            ctx.optimization_value
                        ),
                    })
                }
                Some(window) => window.min(ctx.lags),
            }
        };
        Ok(Box::new(FittedAverage { window }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ps_types::{ParameterValue, SeriesData, StaticContext};

    fn statics(horizon: usize) -> StaticContext {
        StaticContext::from_series(&SeriesData::univariate(vec![1.0, 2.0, 3.0]).unwrap(), horizon)
    }

    #[test]
    fn last_value_repeats_latest_lag() {
        let statics = statics(3);
        let value = ParameterValue::not_optimized();
        let ctx = TaskContext {
            optimization_value: &value,
            statics: &statics,
            lags: 4,
        };
        let model = LastValue.train(&TrainingSet::default(), &ctx).unwrap();
        // Exogenous values after the lags are ignored.
        let forecast = model.predict(&[1.0, 2.0, 3.0, 4.0, 99.0], &ctx).unwrap();
        assert_eq!(forecast, vec![4.0, 4.0, 4.0]);
    }

    #[test]
    fn window_average_uses_swept_window() {
        let statics = statics(2);
        let value = ParameterValue::Int(2);
        let ctx = TaskContext {
            optimization_value: &value,
            statics: &statics,
            lags: 4,
        };
        let model = WindowAverage.train(&TrainingSet::default(), &ctx).unwrap();
        let forecast = model.predict(&[1.0, 2.0, 3.0, 5.0], &ctx).unwrap();
        assert_relative_eq!(forecast[0], 4.0);
        assert_eq!(forecast.len(), 2);
    }

    #[test]
    fn window_average_caps_window_at_lags() {
        let statics = statics(1);
        let value = ParameterValue::Int(50);
        let ctx = TaskContext {
            optimization_value: &value,
            statics: &statics,
            lags: 4,
        };
        let model = WindowAverage.train(&TrainingSet::default(), &ctx).unwrap();
        let forecast = model.predict(&[1.0, 2.0, 3.0, 6.0], &ctx).unwrap();
        assert_relative_eq!(forecast[0], 3.0);
    }

    #[test]
    fn window_average_rejects_non_integral_value() {
        let statics = statics(1);
        let value = ParameterValue::Float(0.5);
        let ctx = TaskContext {
            optimization_value: &value,
            statics: &statics,
            lags: 4,
        };
        assert!(matches!(
            WindowAverage.train(&TrainingSet::default(), &ctx),
            Err(ModelError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn short_input_row_fails() {
        let statics = statics(1);
        let value = ParameterValue::not_optimized();
        let ctx = TaskContext {
            optimization_value: &value,
            statics: &statics,
            lags: 4,
        };
        let model = LastValue.train(&TrainingSet::default(), &ctx).unwrap();
        assert!(model.predict(&[1.0], &ctx).is_err());
    }
}
