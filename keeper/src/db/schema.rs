use sqlx::AnyPool;

/// Idempotent; safe to run on every start. Portable across SQLite and Postgres.
pub async fn migrate(pool: &AnyPool) -> anyhow::Result<()> {
    // Daily closes, one row per (asset, ts)
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS price_history (
  asset TEXT NOT NULL,
  ts_ms BIGINT NOT NULL,
  price DOUBLE PRECISION NOT NULL,
  PRIMARY KEY (asset, ts_ms)
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS apy_snapshots (
  ts_ms BIGINT NOT NULL,
  total_assets TEXT NOT NULL,
  apy_pct DOUBLE PRECISION
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS rebalance_events (
  tx_hash TEXT PRIMARY KEY,
  ts_ms BIGINT NOT NULL,
  tick_lower BIGINT NOT NULL,
  tick_upper BIGINT NOT NULL,
  lower_price DOUBLE PRECISION NOT NULL,
  upper_price DOUBLE PRECISION NOT NULL,
  gas_used BIGINT NOT NULL,
  gas_price_wei BIGINT NOT NULL,
  block_number BIGINT,
  signer TEXT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS cycle_outcomes (
  trace_id TEXT PRIMARY KEY,
  cycle BIGINT NOT NULL,
  ts_ms BIGINT NOT NULL,
  disposition TEXT NOT NULL,
  tick_lower BIGINT,
  tick_upper BIGINT,
  hedge DOUBLE PRECISION,
  accepted BIGINT,
  cost_eth DOUBLE PRECISION,
  proof_digest TEXT,
  tx_hash TEXT,
  error_kind TEXT,
  error TEXT
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS bot_heartbeats (
  bot_id TEXT PRIMARY KEY,
  status TEXT NOT NULL,
  last_seen_ms BIGINT NOT NULL,
  metadata TEXT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_cycle_outcomes_ts ON cycle_outcomes(ts_ms);"#)
        .execute(pool)
        .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_apy_snapshots_ts ON apy_snapshots(ts_ms);"#)
        .execute(pool)
        .await?;

    Ok(())
}
