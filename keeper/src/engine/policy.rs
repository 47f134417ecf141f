use std::time::Duration;

/// Timing and retry knobs for the keeper loop.
#[derive(Debug, Clone)]
pub struct LoopPolicy {
    pub lookback_days: u32,
    pub estimated_gas_units: u64,

    /// Total fetch attempts per cycle, including the first.
    pub fetch_attempts: u32,
    /// Delay after the first failed fetch; doubles per further failure.
    pub fetch_base_delay: Duration,

    pub error_backoff_base: Duration,
    pub error_backoff_cap: Duration,
    pub max_consecutive_errors: u32,

    pub cycle_interval: Duration,
    pub shutdown_poll: Duration,

    /// Consecutive skipped cycles after which each further skip warns.
    pub skip_warn_after: u32,
}

impl Default for LoopPolicy {
    fn default() -> Self {
        Self {
            lookback_days: 90,
            estimated_gas_units: 500_000,
            fetch_attempts: 3,
            fetch_base_delay: Duration::from_secs(1),
            error_backoff_base: Duration::from_secs(60),
            error_backoff_cap: Duration::from_secs(600),
            max_consecutive_errors: 5,
            cycle_interval: Duration::from_secs(3_600),
            shutdown_poll: Duration::from_secs(10),
            skip_warn_after: 3,
        }
    }
}

fn doubled(base: Duration, exponent: u32) -> Duration {
    base.saturating_mul(1u32.checked_shl(exponent.min(31)).unwrap_or(u32::MAX))
}

impl LoopPolicy {
    /// Wait before retry number `failed_attempts + 1`; `failed_attempts >= 1`.
    pub fn fetch_delay(&self, failed_attempts: u32) -> Duration {
        doubled(self.fetch_base_delay, failed_attempts.saturating_sub(1))
    }

    /// Daily points a `lookback_days` request yields: both endpoints are included.
    pub fn expected_points(&self) -> usize {
        self.lookback_days as usize + 1
    }

    /// Shortfall against the forecaster's minimum history, if any.
    pub fn history_shortfall(&self, min_history: usize) -> Option<usize> {
        min_history
            .checked_sub(self.expected_points())
            .filter(|&missing| missing > 0)
    }

    /// `base * 2^(n-1)`, capped.
    pub fn error_backoff(&self, consecutive_errors: u32) -> Duration {
        doubled(self.error_backoff_base, consecutive_errors.saturating_sub(1))
            .min(self.error_backoff_cap)
    }
}
