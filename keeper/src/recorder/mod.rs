//! Persistence and monitoring sink.
//!
//! Every write is best-effort from the loop's point of view: `BestEffort`
//! logs and swallows failures so observability can never abort a cycle.

pub mod logging;
pub mod sql;

pub use logging::LogRecorder;
pub use sql::SqlRecorder;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use market::{PriceSeries, TickRange};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::engine::CycleOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotStatus {
    Healthy,
    Active,
    Error,
    Critical,
    Stopped,
}

impl BotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BotStatus::Healthy => "healthy",
            BotStatus::Active => "active",
            BotStatus::Error => "error",
            BotStatus::Critical => "critical",
            BotStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for BotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BotStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "healthy" => Ok(BotStatus::Healthy),
            "active" => Ok(BotStatus::Active),
            "error" => Ok(BotStatus::Error),
            "critical" => Ok(BotStatus::Critical),
            "stopped" => Ok(BotStatus::Stopped),
            other => Err(anyhow::anyhow!("unknown bot status {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub bot_id: String,
    pub status: BotStatus,
    pub last_seen_ms: u64,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApySnapshot {
    pub ts_ms: u64,
    /// Decimal string; `uint256` does not fit any SQL integer type.
    pub total_assets: String,
    /// Annualized growth since the previous snapshot, in percent.
    pub apy_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebalanceRecord {
    pub ts_ms: u64,
    pub tx_hash: String,
    pub range: TickRange,
    pub lower_price: f64,
    pub upper_price: f64,
    pub gas_used: u64,
    pub gas_price_wei: u128,
    pub block_number: Option<u64>,
    pub signer: String,
}

#[async_trait]
pub trait Recorder: Send + Sync {
    async fn record_prices(&self, asset: &str, series: &PriceSeries) -> anyhow::Result<()>;

    async fn record_apy(&self, snapshot: &ApySnapshot) -> anyhow::Result<()>;

    async fn record_rebalance(&self, event: &RebalanceRecord) -> anyhow::Result<()>;

    async fn record_cycle(&self, outcome: &CycleOutcome) -> anyhow::Result<()>;

    async fn heartbeat(&self, beat: &Heartbeat) -> anyhow::Result<()>;

    /// Sinks that cannot be read back return `None`.
    async fn latest_heartbeat(&self, _bot_id: &str) -> anyhow::Result<Option<Heartbeat>> {
        Ok(None)
    }
}

/// Wraps a recorder so that failures are logged, never returned.
#[derive(Clone)]
pub struct BestEffort {
    inner: Arc<dyn Recorder>,
}

impl BestEffort {
    pub fn new(inner: Arc<dyn Recorder>) -> Self {
        Self { inner }
    }

    pub async fn prices(&self, asset: &str, series: &PriceSeries) {
        if let Err(e) = self.inner.record_prices(asset, series).await {
            warn!(error = %e, "failed to persist price history");
        }
    }

    pub async fn apy(&self, snapshot: &ApySnapshot) {
        if let Err(e) = self.inner.record_apy(snapshot).await {
            warn!(error = %e, "failed to persist apy snapshot");
        }
    }

    pub async fn rebalance(&self, event: &RebalanceRecord) {
        if let Err(e) = self.inner.record_rebalance(event).await {
            warn!(error = %e, tx_hash = %event.tx_hash, "failed to persist rebalance event");
        }
    }

    pub async fn cycle(&self, outcome: &CycleOutcome) {
        if let Err(e) = self.inner.record_cycle(outcome).await {
            warn!(error = %e, cycle = outcome.cycle, "failed to persist cycle outcome");
        }
    }

    pub async fn heartbeat(&self, beat: &Heartbeat) {
        if let Err(e) = self.inner.heartbeat(beat).await {
            warn!(error = %e, status = %beat.status, "failed to write heartbeat");
        }
    }
}
