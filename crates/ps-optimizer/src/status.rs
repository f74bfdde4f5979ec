//! Run lifecycle tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ps_types::{FailureKind, TaskResult};

/// Unique orchestration run identifier.
pub type RunId = Uuid;

/// Lifecycle state for an orchestration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Wall time of one orchestration phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTiming {
    pub phase: String,
    pub seconds: f64,
}

/// Aggregate status of an orchestration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub id: RunId,
    pub state: RunState,
    pub tasks_total: usize,
    pub tasks_completed: usize,
    pub tasks_failed: usize,
    pub tasks_timed_out: usize,
    pub phases: Vec<PhaseTiming>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Default for RunStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStatus {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: RunState::Pending,
            tasks_total: 0,
            tasks_completed: 0,
            tasks_failed: 0,
            tasks_timed_out: 0,
            phases: Vec::new(),
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.state = RunState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self) {
        self.state = RunState::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.state = RunState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    pub fn mark_cancelled(&mut self) {
        self.state = RunState::Cancelled;
        self.finished_at = Some(Utc::now());
    }

    /// Add tasks about to be dispatched.
    pub fn add_tasks(&mut self, n: usize) {
        self.tasks_total += n;
    }

    /// Count one finished task. Failures still count as completed.
    pub fn record(&mut self, result: &TaskResult) {
        self.tasks_completed += 1;
        match result.failure_kind() {
            None => {}
            Some(FailureKind::Timeout) => {
                self.tasks_failed += 1;
                self.tasks_timed_out += 1;
            }
            Some(_) => self.tasks_failed += 1,
        }
    }

    pub fn record_phase(&mut self, phase: impl Into<String>, seconds: f64) {
        self.phases.push(PhaseTiming {
            phase: phase.into(),
            seconds,
        });
    }

    pub fn phase_seconds(&self, phase: &str) -> Option<f64> {
        self.phases.iter().find(|p| p.phase == phase).map(|p| p.seconds)
    }

    /// Finished share of dispatched tasks, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.tasks_total == 0 {
            0.0
        } else {
            (self.tasks_completed as f64 / self.tasks_total as f64).min(1.0)
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.state,
            RunState::Completed | RunState::Failed | RunState::Cancelled
        )
    }
}
