//! Driver configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for [`crate::EvalDriver`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// How long an evaluation attempt waits for the exclusivity token.
    /// `None` polls once and falls back immediately.
    pub lock_timeout_ms: Option<u64>,

    /// Finish a state as failed once this many evaluations in a row have
    /// produced an error. `None` never gives up.
    pub max_consecutive_errors: Option<usize>,

    /// Remove finished states from the cache after their final evaluation.
    /// The driver remembers evicted IDs and reports them as finished.
    pub evict_finished: bool,
}

impl DriverConfig {
    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }
}
