//! Caller-side abort requests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag that stops schedulers from dispatching further tasks.
///
/// Tasks already handed to a worker run to completion; an abort never
/// interrupts an executor.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    aborted: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Clear a previous abort so the handle can be reused for another run.
    pub fn reset(&self) {
        self.aborted.store(false, Ordering::SeqCst);
    }
}
