//! Progress reporting and cooperative cancellation for index passes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressKind {
    New,
    Modified,
    Deleted,
    SkippedUnchanged,
    Error,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    /// Files seen by enumeration this pass.
    pub total: usize,
    /// Files handled so far (any kind).
    pub processed: usize,
    pub current_path: String,
    pub kind: ProgressKind,
}

/// Called synchronously from pipeline workers; implementations must hand off
/// quickly (post to a channel, update an atomic) rather than block.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

/// No-op sink for callers that do not care.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

/// Cooperative cancellation flag, polled at file boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_is_shared_across_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
