use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-run sweep settings
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Minimum idle time before a pending record is considered stuck
    pub staleness: chrono::Duration,
    /// Max candidates per run; larger backlogs drain over several runs
    pub batch_size: usize,
    /// Max candidates verified in parallel
    pub concurrency: usize,
    /// Bound on each individual authority call
    pub call_timeout: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            staleness: chrono::Duration::minutes(10),
            batch_size: 50,
            concurrency: 4,
            call_timeout: Duration::from_secs(5),
        }
    }
}

/// How a single candidate ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateOutcome {
    Committed,
    RolledBack,
    /// Someone else moved the record out of pending first
    AlreadyResolved,
    /// Verification failed; left pending for the next run
    Skipped,
    Failed,
}

/// Aggregate returned to whoever triggered the sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepRunSummary {
    /// Rows selected, including ones with missing join data
    pub swept: usize,
    pub committed: usize,
    pub rolled_back: usize,
    pub already_resolved: usize,
    /// Subset of `errors` caused by verification failures
    pub skipped: usize,
    pub errors: usize,
    pub timestamp: DateTime<Utc>,
}

impl SweepRunSummary {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            swept: 0,
            committed: 0,
            rolled_back: 0,
            already_resolved: 0,
            skipped: 0,
            errors: 0,
            timestamp,
        }
    }

    pub fn record(&mut self, outcome: CandidateOutcome) {
        match outcome {
            CandidateOutcome::Committed => self.committed += 1,
            CandidateOutcome::RolledBack => self.rolled_back += 1,
            CandidateOutcome::AlreadyResolved => self.already_resolved += 1,
            CandidateOutcome::Skipped => {
                self.skipped += 1;
                self.errors += 1;
            }
            CandidateOutcome::Failed => self.errors += 1,
        }
    }
}
