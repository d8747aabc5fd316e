//! Missing-data policy
//!
//! Absent signal samples arrive as JSON nulls and are carried as the MISSING
//! sentinel from the wire boundary onward. The policy counts them and decides
//! whether a session is too degraded to forward; such sessions are sacrificed
//! rather than blocking the pipeline.

use hmp_common::session::RawSession;

/// Counts missing samples and applies the drop threshold
#[derive(Debug, Clone, Copy)]
pub struct MissingDataPolicy {
    threshold: usize,
}

impl MissingDataPolicy {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    /// Walk the signal samples, returning the marked session and the number
    /// of missing entries
    pub fn mark(&self, session: RawSession) -> (usize, RawSession) {
        let missing = session
            .eeg_data
            .iter()
            .filter(|sample| sample.is_missing())
            .count();
        (missing, session)
    }

    /// True iff the count is at or above the configured threshold
    pub fn exceeds_threshold(&self, missing: usize) -> bool {
        missing >= self.threshold
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }
}
