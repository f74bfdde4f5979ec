//! Least-squares autoregression over the lagged feature rows.

use ps_types::{Forecaster, InputShape, ModelError, TaskContext, TrainedModel, TrainingSet};
use tracing::trace;

/// Ridge penalty as a share of the mean diagonal of `X'X`.
const DEFAULT_RIDGE: f64 = 1e-8;

/// Relative pivot size below which the normal equations count as singular.
const PIVOT_TOLERANCE: f64 = 1e-12;

/// Linear model `y = b0 + X b` fitted by ridge-regularised least squares.
///
/// Single-step shapes forecast recursively: each prediction is shifted into
/// the lag window for the next step while exogenous values stay at their
/// last observation. The batch shape fits one output per horizon step.
#[derive(Debug, Clone)]
pub struct LinearAutoregression {
    name: String,
    shape: InputShape,
    ridge: f64,
}

impl LinearAutoregression {
    pub fn new(name: impl Into<String>, shape: InputShape) -> Self {
        Self {
            name: name.into(),
            shape,
            ridge: DEFAULT_RIDGE,
        }
    }

    pub fn one_step() -> Self {
        Self::new("linear_one_step", InputShape::OneStep)
    }

    pub fn one_step_constant() -> Self {
        Self::new("linear_one_step_constant", InputShape::OneStepConstant)
    }

    pub fn batch() -> Self {
        Self::new("linear_batch", InputShape::Batch)
    }

    pub fn with_ridge(mut self, ridge: f64) -> Self {
        self.ridge = ridge;
        self
    }

    /// The constant-feature shape already carries its own intercept column.
    fn fits_intercept(&self) -> bool {
        self.shape != InputShape::OneStepConstant
    }
}

struct FittedLinear {
    shape: InputShape,
    intercept: Option<Vec<f64>>,
    /// One coefficient vector per output.
    coefficients: Vec<Vec<f64>>,
}

impl FittedLinear {
    fn apply(&self, row: &[f64]) -> Vec<f64> {
        self.coefficients
            .iter()
            .enumerate()
            .map(|(out, coefs)| {
                let base = self.intercept.as_ref().map_or(0.0, |b| b[out]);
                base + coefs.iter().zip(row).map(|(c, x)| c * x).sum::<f64>()
            })
            .collect()
    }
}

impl TrainedModel for FittedLinear {
    fn predict(&self, input: &[f64], ctx: &TaskContext<'_>) -> Result<Vec<f64>, ModelError> {
        let width = self.coefficients.first().map_or(0, Vec::len);
        if input.len() != width {
            return Err(ModelError::PredictionFailed {
                message: format!("input row has {} values, model expects {}", input.len(), width),
            });
        }

        if !self.shape.is_single_step() {
            return Ok(self.apply(input));
        }

        let horizon = ctx.horizon();
        let lags = ctx.lags.min(width);
        let mut row = input.to_vec();
        let mut forecast = Vec::with_capacity(horizon);
        for _ in 0..horizon {
            let next = self.apply(&row)[0];
            forecast.push(next);
            if lags > 0 {
                row.copy_within(1..lags, 0);
                row[lags - 1] = next;
            }
        }
        Ok(forecast)
    }
}

impl Forecaster for LinearAutoregression {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_shape(&self) -> InputShape {
        self.shape
    }

    fn train(
        &self,
        input: &TrainingSet,
        _ctx: &TaskContext<'_>,
    ) -> Result<Box<dyn TrainedModel>, ModelError> {
        if input.is_empty() {
            return Err(ModelError::InsufficientData { needed: 1, got: 0 });
        }
        let width = input.feature_width();
        let outputs = input.target_width();
        let rectangular = input.features.len() == input.targets.len()
            && input.features.iter().all(|row| row.len() == width)
            && input.targets.iter().all(|row| row.len() == outputs);
        if !rectangular {
            return Err(ModelError::TrainingFailed {
                message: "training rows have inconsistent widths".to_string(),
            });
        }
        let finite = input
            .features
            .iter()
            .chain(input.targets.iter())
            .all(|row| row.iter().all(|v| v.is_finite()));
        if !finite {
            return Err(ModelError::TrainingFailed {
                message: "training rows contain non-finite values".to_string(),
            });
        }

        let offset = usize::from(self.fits_intercept());
        let params = width + offset;

        let mut xtx = vec![vec![0.0; params]; params];
        let mut xty = vec![vec![0.0; params]; outputs];
        let mut design = vec![1.0; params];
        for (features, targets) in input.features.iter().zip(&input.targets) {
            design[offset..].copy_from_slice(features);
            for i in 0..params {
                for j in 0..params {
                    xtx[i][j] += design[i] * design[j];
                }
                for (out, y) in targets.iter().enumerate() {
                    xty[out][i] += design[i] * y;
                }
            }
        }
        let trace: f64 = (0..params).map(|i| xtx[i][i]).sum();
        let scale = if trace > 0.0 { trace / params as f64 } else { 1.0 };
        let penalty = self.ridge * scale;
        for (i, row) in xtx.iter_mut().enumerate() {
            row[i] += penalty;
        }

        let factor = cholesky(&xtx).ok_or_else(|| ModelError::Singular {
            message: format!("normal equations of {} are not positive definite", self.name),
        })?;

        let mut intercept = Vec::with_capacity(outputs);
        let mut coefficients = Vec::with_capacity(outputs);
        for rhs in &xty {
            let beta = cholesky_solve(&factor, rhs);
            if offset == 1 {
                intercept.push(beta[0]);
            }
            coefficients.push(beta[offset..].to_vec());
        }

        trace!(
            "{}: fitted {} outputs over {} rows of width {}",
            self.name,
            outputs,
            input.len(),
            width
        );

        Ok(Box::new(FittedLinear {
            shape: self.shape,
            intercept: (offset == 1).then_some(intercept),
            coefficients,
        }))
    }
}

/// Lower-triangular factor `L` with `A = L L'`, or `None` when a pivot
/// vanishes relative to its diagonal entry.
fn cholesky(a: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let n = a.len();
    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[i][j];
            for k in 0..j {
                sum -= l[i][k] * l[j][k];
            }
            if i == j {
                if !(sum > PIVOT_TOLERANCE * a[i][i].abs()) {
                    return None;
                }
                l[i][j] = sum.sqrt();
            } else {
                l[i][j] = sum / l[j][j];
            }
        }
    }
    Some(l)
}

fn cholesky_solve(l: &[Vec<f64>], b: &[f64]) -> Vec<f64> {
    let n = b.len();
    let mut y = vec![0.0; n];
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i][j] * y[j];
        }
        y[i] = sum / l[i][i];
    }

    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = y[i];
        for j in (i + 1)..n {
            sum -= l[j][i] * x[j];
        }
        x[i] = sum / l[i][i];
    }
    x
}
