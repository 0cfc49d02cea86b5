//! Per-run progress counters for the answering phase.

use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing answering activity for one run.
///
/// Constructed per run and passed down the call chain, so concurrent runs never share
/// counts. The processed counter only increases while a run is in flight.
#[derive(Default)]
pub struct RunProgress {
    processed: AtomicU64,
    failed: AtomicU64,
}

impl RunProgress {
    /// Create an empty progress accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one successfully answered leaf.
    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one leaf whose answering attempt failed.
    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of the progress counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct ProgressSnapshot {
    /// Leaves answered successfully so far.
    pub processed: u64,
    /// Leaves that failed retrieval or generation so far.
    pub failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_independently() {
        let progress = RunProgress::new();
        progress.record_processed();
        progress.record_processed();
        progress.record_failed();

        let snapshot = progress.snapshot();
        assert_eq!(snapshot.processed, 2);
        assert_eq!(snapshot.failed, 1);
    }

    #[test]
    fn fresh_progress_starts_at_zero() {
        let snapshot = RunProgress::new().snapshot();
        assert_eq!(snapshot.processed, 0);
        assert_eq!(snapshot.failed, 0);
    }
}
