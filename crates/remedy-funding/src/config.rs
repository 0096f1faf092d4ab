//! Service tuning.

use backoff::ExponentialBackoff;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings of the [`FundingService`](crate::FundingService).
///
/// ```toml
/// [funding]
/// max_conflict_retries = 3
/// retry_delay_ms = 25
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingConfig {
    /// How many times an allocation that lost the write lock is re-run.
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,

    /// Pause before the first retry; doubled for each further one, up to
    /// 64 times this value.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_max_conflict_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    25
}

impl Default for FundingConfig {
    fn default() -> Self {
        FundingConfig {
            max_conflict_retries: default_max_conflict_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl FundingConfig {
    pub fn max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    /// Schedule of pauses between conflict retries.
    ///
    /// Elapsed time is unbounded; `max_conflict_retries` ends the retries.
    pub fn backoff(&self) -> ExponentialBackoff {
        let initial = Duration::from_millis(self.retry_delay_ms);
        ExponentialBackoff {
            current_interval: initial,
            initial_interval: initial,
            max_interval: Duration::from_millis(self.retry_delay_ms.saturating_mul(64)),
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}
