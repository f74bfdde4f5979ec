//! # ps-optimizer
//!
//! Result accumulation and ranking for PredictSweep.
//!
//! Provides the repetition × model × optimization-value result matrix, the
//! aggregation that reduces it to a best model and best optimized values,
//! the ranking and per-task tables, and run status tracking.

mod analysis;
mod matrix;
mod status;
mod tables;

pub use analysis::{aggregate, nan_argmin, nan_mean, OptimizedValueError, RankedModel, RankingResult};
pub use matrix::{ErrorCube, FoldSummary, ResultMatrix};
pub use status::{PhaseTiming, RunId, RunState, RunStatus};
pub use tables::{detailed_table, DetailedRow, MODEL_CRASHED};
