use async_trait::async_trait;
use market::PriceSeries;
use tracing::{debug, info};

use super::{ApySnapshot, Heartbeat, RebalanceRecord, Recorder};
use crate::engine::CycleOutcome;

/// Recorder used when no database is configured; everything goes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRecorder;

#[async_trait]
impl Recorder for LogRecorder {
    async fn record_prices(&self, asset: &str, series: &PriceSeries) -> anyhow::Result<()> {
        debug!(asset, points = series.len(), "price history");
        Ok(())
    }

    async fn record_apy(&self, snapshot: &ApySnapshot) -> anyhow::Result<()> {
        info!(total_assets = %snapshot.total_assets, apy_pct = snapshot.apy_pct, "apy snapshot");
        Ok(())
    }

    async fn record_rebalance(&self, event: &RebalanceRecord) -> anyhow::Result<()> {
        info!(
            tx_hash = %event.tx_hash,
            tick_lower = event.range.lower,
            tick_upper = event.range.upper,
            gas_used = event.gas_used,
            block_number = event.block_number,
            "rebalance event"
        );
        Ok(())
    }

    async fn record_cycle(&self, outcome: &CycleOutcome) -> anyhow::Result<()> {
        debug!(outcome = %serde_json::to_string(outcome)?, "cycle outcome");
        Ok(())
    }

    async fn heartbeat(&self, beat: &Heartbeat) -> anyhow::Result<()> {
        debug!(bot_id = %beat.bot_id, status = %beat.status, "heartbeat");
        Ok(())
    }
}
