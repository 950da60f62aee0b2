//! Three-valued phase outcome driving the Addon pipeline

use std::time::Duration;

/// Requeue delay used by every `Retry` outcome
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(10);

/// Outcome of a single pipeline phase.
///
/// `Retry` means a non-terminal condition was stamped and the pipeline
/// should run again shortly. `Stop` means an unrecoverable configuration
/// error was stamped; the addon is left alone until its generation advances.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhaseResult {
    Continue,
    Retry,
    Stop,
}

impl PhaseResult {
    pub fn short_circuits(&self) -> bool {
        !matches!(self, PhaseResult::Continue)
    }
}
