//! Run statistics.

use serde::{Deserialize, Serialize};

use super::RunMode;

/// What happened to one database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed,
    Skipped,
}

/// Per-run counters. `successful + failed + skipped == total` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunStats {
    /// Stats after one more database.
    pub fn record(mut self, outcome: Outcome) -> Self {
        self.total += 1;
        match outcome {
            Outcome::Succeeded => self.successful += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::Skipped => self.skipped += 1,
        }
        self
    }

    /// Fold a sequence of outcomes.
    pub fn from_outcomes<I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = Outcome>,
    {
        outcomes.into_iter().fold(Self::default(), Self::record)
    }

    /// Whether a run with these stats counts as successful.
    ///
    /// Export only fails on failed dumps; import also fails when a database
    /// had no backup to restore.
    pub fn is_success(&self, mode: RunMode) -> bool {
        match mode {
            RunMode::Export => self.failed == 0,
            RunMode::Import => self.failed == 0 && self.skipped == 0,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.successful + self.failed + self.skipped == self.total
    }
}
