use std::time::Duration;

use serde::Serialize;

use crate::recorder::{BotStatus, Heartbeat};

/// A heartbeat older than this means the loop is not cycling.
pub const STALE_AFTER: Duration = Duration::from_secs(65 * 60);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "health", rename_all = "snake_case")]
pub enum Health {
    Healthy { status: BotStatus, age_secs: u64 },
    Stale { status: BotStatus, age_secs: u64 },
    Errored { status: BotStatus, age_secs: u64 },
    Missing,
}

impl Health {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Health::Healthy { .. })
    }
}

/// Staleness wins over status: a stale heartbeat says nothing about now.
pub fn assess_heartbeat(beat: Option<&Heartbeat>, now_ms: u64) -> Health {
    let Some(beat) = beat else {
        return Health::Missing;
    };
    let age = Duration::from_millis(now_ms.saturating_sub(beat.last_seen_ms));
    let age_secs = age.as_secs();
    let status = beat.status;

    if age > STALE_AFTER {
        Health::Stale { status, age_secs }
    } else if matches!(status, BotStatus::Error | BotStatus::Critical) {
        Health::Errored { status, age_secs }
    } else {
        Health::Healthy { status, age_secs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: u64 = 60_000;

    fn beat(status: BotStatus, last_seen_ms: u64) -> Heartbeat {
        Heartbeat {
            bot_id: "liquidity-vector-keeper".into(),
            status,
            last_seen_ms,
            metadata: serde_json::Value::Null,
        }
    }

    #[test]
    fn recent_healthy_beat() {
        let h = assess_heartbeat(Some(&beat(BotStatus::Healthy, 100 * MIN)), 130 * MIN);
        assert!(h.is_healthy());
    }

    #[test]
    fn sixty_six_minutes_is_stale() {
        let now = 200 * MIN;
        assert!(matches!(
            assess_heartbeat(Some(&beat(BotStatus::Healthy, now - 66 * MIN)), now),
            Health::Stale { .. }
        ));
        assert!(assess_heartbeat(Some(&beat(BotStatus::Active, now - 65 * MIN)), now).is_healthy());
    }

    #[test]
    fn error_and_critical_are_unhealthy() {
        for s in [BotStatus::Error, BotStatus::Critical] {
            assert!(matches!(assess_heartbeat(Some(&beat(s, 0)), MIN), Health::Errored { .. }));
        }
    }

    #[test]
    fn missing_beat() {
        assert_eq!(assess_heartbeat(None, 0), Health::Missing);
        assert!(!Health::Missing.is_healthy());
    }
}
