use anyhow::Context;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ps_engine::{JsonReporter, Orchestrator, Reporter, TracingReporter};
use ps_models::ModelRegistry;
use ps_types::{RunConfig, SeriesData};

fn load_config() -> anyhow::Result<RunConfig> {
    let Ok(path) = std::env::var("PREDSWEEP_CONFIG") else {
        return Ok(RunConfig::default());
    };
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("reading config from {path}"))?;
    let config = serde_json::from_str(&text).with_context(|| format!("parsing config {path}"))?;
    info!("Loaded configuration from {}", path);
    Ok(config)
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(value) => value.parse().with_context(|| format!("{name}={value}")),
        Err(_) => Ok(default),
    }
}

/// Seasonal series with a linear trend and uniform noise.
fn synthetic_series(seed: u64, points: usize) -> anyhow::Result<SeriesData> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let values = (0..points)
        .map(|i| {
            let t = i as f64;
            100.0 + 0.25 * t + 8.0 * (t * std::f64::consts::TAU / 12.0).sin()
                + rng.random_range(-2.0..2.0)
        })
        .collect();
    Ok(SeriesData::univariate(values)?)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config()?;
    let seed = env_or("PREDSWEEP_SEED", 7u64)?;
    let points = env_or("PREDSWEEP_POINTS", 240usize)?;
    info!("Generating {} synthetic points with seed {}", points, seed);
    let data = synthetic_series(seed, points)?;

    let orchestrator = Orchestrator::new(config, ModelRegistry::with_defaults());
    let outcome = orchestrator.run(&data)?;

    TracingReporter.report(&outcome)?;
    JsonReporter::new(std::io::stdout().lock()).pretty(true).report(&outcome)?;
    Ok(())
}
