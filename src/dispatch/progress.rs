use tracing::info;

use crate::models::AttendanceResult;

/// Receives dispatch progress as tasks finish.
///
/// Called from the dispatch tasks themselves, so implementations must be
/// cheap and must not block.
pub trait ProgressObserver: Send + Sync {
    /// `completed` of `total` accounts are done
    fn on_progress(&self, completed: usize, total: usize);

    /// The account at `index` finished with `result`
    fn on_result(&self, _index: usize, _result: &AttendanceResult) {}
}

/// Ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_progress(&self, _completed: usize, _total: usize) {}
}

/// Logs progress through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ProgressObserver for TracingObserver {
    fn on_progress(&self, completed: usize, total: usize) {
        info!(completed, total, "dispatch progress");
    }

    fn on_result(&self, index: usize, result: &AttendanceResult) {
        info!(
            index,
            name = %result.display_name,
            status = %result.status,
            code = result.code.as_deref().unwrap_or(""),
            "attendance result"
        );
    }
}
