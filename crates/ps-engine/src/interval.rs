//! Confidence bounds around the best model's forecast.

use serde::Serialize;

use ps_types::{invalid_input, PsResult};

/// Lower and upper bounds per predicted step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionBounds {
    pub confidence: f64,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

/// Builds bounds for a finished forecast from the series it continues.
pub trait IntervalEstimator: Send + Sync {
    fn estimate(
        &self,
        history: &[f64],
        predictions: &[f64],
        confidence: f64,
    ) -> PsResult<PredictionBounds>;
}

/// Gaussian bounds from the spread of one-step naive residuals, widened by
/// `sqrt(h)` at step `h`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResidualInterval;

impl IntervalEstimator for ResidualInterval {
    fn estimate(
        &self,
        history: &[f64],
        predictions: &[f64],
        confidence: f64,
    ) -> PsResult<PredictionBounds> {
        if !(confidence > 0.0 && confidence < 1.0) {
            return Err(invalid_input!(
                "confidence must lie strictly between 0 and 1, got {}",
                confidence
            ));
        }
        if predictions.iter().any(|p| !p.is_finite()) {
            return Err(invalid_input!("forecast has missing values, no bounds possible"));
        }

        let residuals: Vec<f64> = history
            .windows(2)
            .map(|w| w[1] - w[0])
            .filter(|r| r.is_finite())
            .collect();
        if residuals.len() < 2 {
            return Err(invalid_input!(
                "need at least 2 finite residuals for bounds, got {}",
                residuals.len()
            ));
        }
        let n = residuals.len() as f64;
        let mean = residuals.iter().sum::<f64>() / n;
        let sigma = (residuals.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt();

        let z = quantile_normal((1.0 + confidence) / 2.0);
        let (lower, upper) = predictions
            .iter()
            .enumerate()
            .map(|(h, p)| {
                let width = z * sigma * ((h + 1) as f64).sqrt();
                (p - width, p + width)
            })
            .unzip();

        Ok(PredictionBounds {
            confidence,
            lower,
            upper,
        })
    }
}

/// Standard normal quantile, Abramowitz and Stegun 26.2.23.
fn quantile_normal(p: f64) -> f64 {
    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }

    let t = if p < 0.5 {
        (-2.0 * p.ln()).sqrt()
    } else {
        (-2.0 * (1.0 - p).ln()).sqrt()
    };
    let (c0, c1, c2) = (2.515517, 0.802853, 0.010328);
    let (d1, d2, d3) = (1.432788, 0.189269, 0.001308);
    let z = t - (c0 + c1 * t + c2 * t * t) / (1.0 + d1 * t + d2 * t * t + d3 * t * t * t);

    if p < 0.5 {
        -z
    } else {
        z
    }
}
