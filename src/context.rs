//! [`Context`]: progress reporting and cancellation polling threaded through
//! container-level transforms (spec §5). Lives in its own module since both
//! the registry (transform function signatures) and the pipeline/gather
//! runtimes need it without creating a module cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Carried through one pipeline execution. Container-level transforms are
/// expected to poll `is_cancelled` and call `report_progress` at least every
/// 100 elements or at natural algorithmic boundaries; failing to do so is a
/// bug in that transform, not in this runtime.
#[derive(Clone, Default)]
pub struct Context {
    cancelled: Option<Arc<AtomicBool>>,
    progress: Option<ProgressFn>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancelled = Some(flag);
        self
    }

    pub fn with_progress(mut self, f: ProgressFn) -> Self {
        self.progress = Some(f);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
            .as_ref()
            .map(|f| f.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    pub fn report_progress(&self, done: usize, total: usize) {
        if let Some(f) = &self.progress {
            f(done, total);
        }
    }
}
