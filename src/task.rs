//! Cancellable, progress-reporting execution contract.
//!
//! Long-running operations (currently the RNN clusterer, whose merge loop
//! runs `n - 1` iterations) accept a [`TaskMonitor`] so a caller can watch
//! progress and request cooperative cancellation. Cancellation is checked
//! at least once per merge iteration; a cancelled run returns
//! [`Error::Cancelled`](crate::Error::Cancelled) after releasing its
//! resources, exactly like a failed or successful run would.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Observer for a long-running operation.
///
/// Both methods have do-nothing defaults, so a monitor only implements
/// what it cares about. Implementations must be cheap: `is_cancelled` is
/// polled on the hot path.
pub trait TaskMonitor: Send + Sync {
    /// Called with an overall completion fraction in `[0, 1]`.
    fn report_progress(&self, _fraction: f64) {}

    /// Polled between units of work; return `true` to abort the run.
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Monitor that ignores progress and never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMonitor;

impl TaskMonitor for NoopMonitor {}

/// Shared cancellation flag.
///
/// Clone it, hand one copy to the running operation as its monitor, and
/// trip it from any other thread.
///
/// ```
/// use clade::task::{CancelFlag, TaskMonitor};
///
/// let flag = CancelFlag::new();
/// let handle = flag.clone();
/// handle.cancel();
/// assert!(flag.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    /// Create an untripped flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

impl TaskMonitor for CancelFlag {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_monitor_never_cancels() {
        let m = NoopMonitor;
        m.report_progress(0.5);
        assert!(!m.is_cancelled());
    }

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!flag.is_cancelled());
        clone.cancel();
        assert!(flag.is_cancelled());
        assert!(clone.is_cancelled());
    }
}
