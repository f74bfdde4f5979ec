// PredictSweep orchestration engine
// Builds task units, dispatches them and hands the ranking to reporters

pub mod cancel;
pub mod compare;
pub mod executor;
pub mod interval;
pub mod orchestrator;
pub mod progress;
pub mod report;
pub mod scheduler;

pub use cancel::AbortHandle;
pub use compare::{compare_models, ModelComparison};
pub use executor::{Executor, TaskRunner};
pub use interval::{IntervalEstimator, PredictionBounds, ResidualInterval};
pub use orchestrator::{Orchestrator, RunOutcome};
pub use progress::ProgressTracker;
pub use report::{JsonReporter, Reporter, RunReport, TracingReporter};
pub use scheduler::{scheduler_for, IsolatedScheduler, PoolScheduler, Scheduler, SequentialScheduler};
