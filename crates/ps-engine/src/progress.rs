//! Live run status shared between the orchestrator, workers and callers.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use ps_optimizer::RunStatus;
use ps_types::TaskResult;

/// Cloneable handle onto the status of the current run.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    status: Arc<Mutex<RunStatus>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current status.
    pub fn snapshot(&self) -> RunStatus {
        self.status.lock().clone()
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut RunStatus) -> R) -> R {
        f(&mut self.status.lock())
    }

    /// Start over with a fresh status (and a new run id).
    pub fn reset(&self) -> RunStatus {
        let mut status = self.status.lock();
        *status = RunStatus::new();
        status.clone()
    }

    pub fn record(&self, result: &TaskResult) {
        let mut status = self.status.lock();
        status.record(result);
        debug!(
            "Task {}[opt={}, rep={}] finished ({}/{}){}",
            result.model_id,
            result.optimization_index,
            result.repetition_index,
            status.tasks_completed,
            status.tasks_total,
            result
                .failure
                .as_ref()
                .map(|f| format!(": {f}"))
                .unwrap_or_default()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ps_optimizer::RunState;
    use ps_types::{ParameterValue, TaskKey};

    #[test]
    fn clones_observe_updates() {
        let tracker = ProgressTracker::new();
        let observer = tracker.clone();
        tracker.update(|s| {
            s.mark_running();
            s.add_tasks(2);
        });
        tracker.record(&TaskResult::success(
            TaskKey {
                model_id: "last_value".into(),
                optimization_index: 0,
                optimization_value: ParameterValue::not_optimized(),
                repetition_index: 0,
            },
            vec![1.0],
            1.0,
            0.0,
        ));

        let status = observer.snapshot();
        assert_eq!(status.state, RunState::Running);
        assert_eq!(status.progress(), 0.5);
    }

    #[test]
    fn reset_issues_new_run_id() {
        let tracker = ProgressTracker::new();
        let first = tracker.snapshot().id;
        let second = tracker.reset().id;
        assert_ne!(first, second);
        assert_eq!(tracker.snapshot().tasks_total, 0);
    }
}
