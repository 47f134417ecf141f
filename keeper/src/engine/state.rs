use std::fmt;

use alloy::primitives::U256;
use tracing::debug;

use crate::recorder::BotStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeeperState {
    Idle,
    FetchingData,
    Forecasting,
    Gating,
    Submitting,
    Recording,
    Sleeping,
    ErrorRecovering,
    ShuttingDown,
}

impl fmt::Display for KeeperState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            KeeperState::Idle => "idle",
            KeeperState::FetchingData => "fetching_data",
            KeeperState::Forecasting => "forecasting",
            KeeperState::Gating => "gating",
            KeeperState::Submitting => "submitting",
            KeeperState::Recording => "recording",
            KeeperState::Sleeping => "sleeping",
            KeeperState::ErrorRecovering => "error_recovering",
            KeeperState::ShuttingDown => "shutting_down",
        };
        f.write_str(s)
    }
}

/// Loop-owned mutable state. Nothing outside the loop writes it.
#[derive(Debug)]
pub struct LoopState {
    state: KeeperState,
    consecutive_errors: u32,
    consecutive_skips: u32,
    last_status: BotStatus,
    cycles: u64,
    /// `(ts_ms, totalAssets)` of the previous APY reading.
    pub(crate) last_assets: Option<(u64, U256)>,
}

impl Default for LoopState {
    fn default() -> Self {
        Self {
            state: KeeperState::Idle,
            consecutive_errors: 0,
            consecutive_skips: 0,
            last_status: BotStatus::Active,
            cycles: 0,
            last_assets: None,
        }
    }
}

impl LoopState {
    pub fn state(&self) -> KeeperState {
        self.state
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    pub fn last_status(&self) -> BotStatus {
        self.last_status
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn enter(&mut self, next: KeeperState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "state transition");
            self.state = next;
        }
    }

    pub fn begin_cycle(&mut self) -> u64 {
        self.cycles += 1;
        self.cycles
    }

    pub fn consecutive_skips(&self) -> u32 {
        self.consecutive_skips
    }

    pub fn record_success(&mut self) {
        self.consecutive_errors = 0;
        self.consecutive_skips = 0;
    }

    /// Returns the new skip streak. A skip leaves the error counter alone.
    pub fn record_skip(&mut self) -> u32 {
        self.consecutive_skips = self.consecutive_skips.saturating_add(1);
        self.consecutive_skips
    }

    /// Returns the new consecutive count.
    pub fn record_failure(&mut self) -> u32 {
        self.consecutive_skips = 0;
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        self.consecutive_errors
    }

    pub fn set_status(&mut self, status: BotStatus) {
        self.last_status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_resets_the_counter() {
        let mut s = LoopState::default();
        assert_eq!(s.record_failure(), 1);
        assert_eq!(s.record_failure(), 2);
        s.record_success();
        assert_eq!(s.consecutive_errors(), 0);
        assert_eq!(s.record_failure(), 1);
    }

    #[test]
    fn skips_streak_until_a_decision() {
        let mut s = LoopState::default();
        s.record_failure();
        assert_eq!(s.record_skip(), 1);
        assert_eq!(s.record_skip(), 2);
        assert_eq!(s.consecutive_errors(), 1);
        s.record_success();
        assert_eq!(s.consecutive_skips(), 0);
        assert_eq!(s.record_skip(), 1);
        s.record_failure();
        assert_eq!(s.consecutive_skips(), 0);
    }

    #[test]
    fn tracks_state_status_and_cycle_count() {
        let mut s = LoopState::default();
        assert_eq!(s.state(), KeeperState::Idle);
        assert_eq!(s.last_status(), BotStatus::Active);

        s.enter(KeeperState::Sleeping);
        s.set_status(BotStatus::Healthy);
        assert_eq!(s.begin_cycle(), 1);
        assert_eq!(s.begin_cycle(), 2);

        assert_eq!(s.state(), KeeperState::Sleeping);
        assert_eq!(s.last_status(), BotStatus::Healthy);
        assert_eq!(s.cycles(), 2);
    }
}
