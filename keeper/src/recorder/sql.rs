use anyhow::Context;
use async_trait::async_trait;
use market::PriceSeries;
use sqlx::{AnyPool, Row};

use super::{ApySnapshot, Heartbeat, RebalanceRecord, Recorder};
use crate::engine::CycleOutcome;

/// SQLx-backed recorder. Responsible only for persistence and row mapping.
pub struct SqlRecorder {
    pool: AnyPool,
}

impl SqlRecorder {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Recorder for SqlRecorder {
    async fn record_prices(&self, asset: &str, series: &PriceSeries) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        for p in series.points() {
            sqlx::query(
                r#"
INSERT INTO price_history (asset, ts_ms, price)
VALUES ($1, $2, $3)
ON CONFLICT (asset, ts_ms) DO UPDATE SET price = excluded.price;
"#,
            )
            .bind(asset)
            .bind(u64_to_i64(p.ts_ms)?)
            .bind(p.price)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn record_apy(&self, snapshot: &ApySnapshot) -> anyhow::Result<()> {
        sqlx::query(
            r#"
INSERT INTO apy_snapshots (ts_ms, total_assets, apy_pct)
VALUES ($1, $2, $3);
"#,
        )
        .bind(u64_to_i64(snapshot.ts_ms)?)
        .bind(snapshot.total_assets.as_str())
        .bind(snapshot.apy_pct)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_rebalance(&self, event: &RebalanceRecord) -> anyhow::Result<()> {
        let gas_price = i64::try_from(event.gas_price_wei).context("gas price out of range")?;
        let block = event.block_number.map(u64_to_i64).transpose()?;

        sqlx::query(
            r#"
INSERT INTO rebalance_events (
  tx_hash, ts_ms, tick_lower, tick_upper, lower_price, upper_price,
  gas_used, gas_price_wei, block_number, signer
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
ON CONFLICT (tx_hash) DO NOTHING;
"#,
        )
        .bind(event.tx_hash.as_str())
        .bind(u64_to_i64(event.ts_ms)?)
        .bind(event.range.lower as i64)
        .bind(event.range.upper as i64)
        .bind(event.lower_price)
        .bind(event.upper_price)
        .bind(u64_to_i64(event.gas_used)?)
        .bind(gas_price)
        .bind(block)
        .bind(event.signer.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_cycle(&self, outcome: &CycleOutcome) -> anyhow::Result<()> {
        let verdict = outcome.verdict.as_ref();

        sqlx::query(
            r#"
INSERT INTO cycle_outcomes (
  trace_id, cycle, ts_ms, disposition, tick_lower, tick_upper, hedge,
  accepted, cost_eth, proof_digest, tx_hash, error_kind, error
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13);
"#,
        )
        .bind(outcome.trace_id.as_str())
        .bind(u64_to_i64(outcome.cycle)?)
        .bind(u64_to_i64(outcome.ts_ms)?)
        .bind(outcome.disposition.as_str())
        .bind(outcome.range.map(|r| r.lower as i64))
        .bind(outcome.range.map(|r| r.upper as i64))
        .bind(outcome.hedge.map(|h| h.ratio()))
        .bind(verdict.map(|v| v.accepted as i64))
        .bind(verdict.and_then(|v| v.cost_eth))
        .bind(outcome.proof_digest.map(|d| d.to_string()))
        .bind(outcome.tx_hash.map(|h| h.to_string()))
        .bind(outcome.error_kind.map(str::to_string))
        .bind(outcome.error.clone())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn heartbeat(&self, beat: &Heartbeat) -> anyhow::Result<()> {
        sqlx::query(
            r#"
INSERT INTO bot_heartbeats (bot_id, status, last_seen_ms, metadata)
VALUES ($1, $2, $3, $4)
ON CONFLICT (bot_id) DO UPDATE SET
  status = excluded.status,
  last_seen_ms = excluded.last_seen_ms,
  metadata = excluded.metadata;
"#,
        )
        .bind(beat.bot_id.as_str())
        .bind(beat.status.as_str())
        .bind(u64_to_i64(beat.last_seen_ms)?)
        .bind(beat.metadata.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_heartbeat(&self, bot_id: &str) -> anyhow::Result<Option<Heartbeat>> {
        let row = sqlx::query(
            r#"
SELECT bot_id, status, last_seen_ms, metadata
FROM bot_heartbeats
WHERE bot_id = $1;
"#,
        )
        .bind(bot_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_heartbeat(&r)).transpose()
    }
}

/* =========================
Row mapping + conversions
========================= */

fn row_to_heartbeat(r: &sqlx::any::AnyRow) -> anyhow::Result<Heartbeat> {
    let status: String = r.try_get("status")?;
    let metadata: String = r.try_get("metadata")?;
    let last_seen: i64 = r.try_get("last_seen_ms")?;

    Ok(Heartbeat {
        bot_id: r.try_get("bot_id")?,
        status: status.parse()?,
        last_seen_ms: u64::try_from(last_seen).context("negative last_seen_ms")?,
        metadata: serde_json::from_str(&metadata).context("invalid heartbeat metadata")?,
    })
}

fn u64_to_i64(v: u64) -> anyhow::Result<i64> {
    i64::try_from(v).context("value exceeds i64")
}
