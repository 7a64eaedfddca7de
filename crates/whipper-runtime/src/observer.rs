//! Progress and notice reporting for batch runs.

use tracing::{info, warn};

use crate::types::Notice;

/// Receives progress and user-visible notices from a run.
pub trait BatchObserver: Send + Sync {
    /// Percentage of the run's rows completed, 0..=100.
    fn on_progress(&self, percent: u8);

    fn on_notice(&self, notice: &Notice);
}

/// Reports through `tracing` only.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl BatchObserver for TracingObserver {
    fn on_progress(&self, percent: u8) {
        info!("Batch progress: {}%", percent);
    }

    fn on_notice(&self, notice: &Notice) {
        match notice {
            Notice::SubmissionFailed { .. } | Notice::ResetFailed { .. } => warn!("{}", notice),
            _ => info!("{}", notice),
        }
    }
}

pub(crate) fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    (done.min(total) * 100 / total) as u8
}
