//! Rendering orchestration outcomes.

use serde::Serialize;
use std::io::Write;
use tracing::{debug, info, warn};

use ps_optimizer::{DetailedRow, PhaseTiming, RankingResult, RunId, RunState};
use ps_types::{ParameterValue, PsResult, RunMode};

use crate::interval::PredictionBounds;
use crate::orchestrator::RunOutcome;

/// Consumer of finished runs.
pub trait Reporter {
    fn report(&mut self, outcome: &RunOutcome) -> PsResult<()>;
}

/// Logs the ranking and phase timings through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

fn format_error(error: Option<f64>) -> String {
    error.map_or_else(|| "missing".to_string(), |e| format!("{e:.4}"))
}

impl Reporter for TracingReporter {
    fn report(&mut self, outcome: &RunOutcome) -> PsResult<()> {
        let status = &outcome.status;
        info!(
            "Run {}: {:?}, {} tasks ({} failed, {} timed out)",
            outcome.run_id,
            status.state,
            status.tasks_completed,
            status.tasks_failed,
            status.tasks_timed_out
        );

        let Some(ranking) = &outcome.ranking else {
            warn!("Run {} has no ranking", outcome.run_id);
            return Ok(());
        };

        info!(
            "Best model '{}' with {:?} error {} at {}",
            ranking.best_model_id,
            outcome.config.error_criterion,
            format_error(ranking.best_error()),
            ranking.global_best_optimized_value
        );
        for model in &ranking.models {
            info!(
                "  {:>2}. {:<28} {:>12}  {}",
                model.order,
                model.model_id,
                format_error(model.error),
                model
                    .best_optimized_value
                    .as_ref()
                    .map_or_else(|| "-".to_string(), ToString::to_string)
            );
        }
        if let Some(bounds) = &outcome.bounds {
            info!(
                "  {:.0}% bounds: {:?} .. {:?}",
                bounds.confidence * 100.0,
                bounds.lower,
                bounds.upper
            );
        }
        for entry in &ranking.optimized_value_errors {
            debug!("  value {:<16} error {}", entry.value, format_error(entry.error));
        }
        for row in &outcome.detailed {
            debug!(
                "  {} {} rep {}: {:.4} in {:.3}s{}",
                row.model_id,
                row.optimization_value,
                row.repetition_index,
                row.error,
                row.wall_time,
                row.note.as_deref().map(|n| format!(" ({n})")).unwrap_or_default()
            );
        }
        for phase in &status.phases {
            info!("  {:<20} {:.3}s", phase.phase, phase.seconds);
        }
        Ok(())
    }
}

/// Serializable view of a run for external consumers.
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub run_id: RunId,
    pub state: RunState,
    pub mode: RunMode,
    pub horizon: usize,
    pub repetitions: usize,
    pub model_ids: &'a [String],
    pub optimization_values: &'a [ParameterValue],
    pub ranking: Option<&'a RankingResult>,
    pub detailed: &'a [DetailedRow],
    pub held_out: Option<&'a [f64]>,
    pub bounds: Option<&'a PredictionBounds>,
    pub phases: &'a [PhaseTiming],
    pub tasks_total: usize,
    pub tasks_failed: usize,
    pub tasks_timed_out: usize,
}

impl<'a> From<&'a RunOutcome> for RunReport<'a> {
    fn from(outcome: &'a RunOutcome) -> Self {
        Self {
            run_id: outcome.run_id,
            state: outcome.status.state,
            mode: outcome.config.mode,
            horizon: outcome.config.horizon,
            repetitions: outcome.config.repetitions,
            model_ids: &outcome.model_ids,
            optimization_values: &outcome.optimization_values,
            ranking: outcome.ranking.as_ref(),
            detailed: &outcome.detailed,
            held_out: outcome.held_out.as_deref(),
            bounds: outcome.bounds.as_ref(),
            phases: &outcome.status.phases,
            tasks_total: outcome.status.tasks_total,
            tasks_failed: outcome.status.tasks_failed,
            tasks_timed_out: outcome.status.tasks_timed_out,
        }
    }
}

/// Writes one JSON document per run, newline terminated.
#[derive(Debug)]
pub struct JsonReporter<W: Write> {
    writer: W,
    pretty: bool,
}

impl<W: Write> JsonReporter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            pretty: false,
        }
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Reporter for JsonReporter<W> {
    fn report(&mut self, outcome: &RunOutcome) -> PsResult<()> {
        let report = RunReport::from(outcome);
        if self.pretty {
            serde_json::to_writer_pretty(&mut self.writer, &report)?;
        } else {
            serde_json::to_writer(&mut self.writer, &report)?;
        }
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}
