use sqlx::any::AnyPoolOptions;
use sqlx::{AnyPool, Row};
use uuid::Uuid;

use alloy::primitives::B256;
use keeper::db::schema;
use keeper::engine::{CycleDisposition, CycleOutcome};
use keeper::error::KeeperError;
use keeper::gate::ProfitabilityGate;
use keeper::recorder::{ApySnapshot, BotStatus, Heartbeat, RebalanceRecord, Recorder, SqlRecorder};
use market::{HedgeSignal, PricePoint, PriceSeries, TickRange};

/// Isolated in-memory SQLite per test; the unique name keeps parallel tests apart.
async fn setup_db() -> AnyPool {
    sqlx::any::install_default_drivers();

    let db_name = Uuid::new_v4().to_string();
    let conn_str = format!("sqlite:file:{}?mode=memory&cache=shared", db_name);

    let pool = AnyPoolOptions::new()
        .max_connections(5)
        .connect(&conn_str)
        .await
        .unwrap();

    schema::migrate(&pool).await.unwrap();
    pool
}

fn beat(status: BotStatus, last_seen_ms: u64) -> Heartbeat {
    Heartbeat {
        bot_id: "liquidity-vector-keeper".into(),
        status,
        last_seen_ms,
        metadata: serde_json::json!({ "cycle": 3 }),
    }
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let pool = setup_db().await;
    schema::migrate(&pool).await.unwrap();
    schema::migrate(&pool).await.unwrap();
}

#[tokio::test]
async fn heartbeat_upserts_and_reads_back() {
    let pool = setup_db().await;
    let rec = SqlRecorder::new(pool.clone());

    assert!(rec.latest_heartbeat("liquidity-vector-keeper").await.unwrap().is_none());

    rec.heartbeat(&beat(BotStatus::Active, 1_000)).await.unwrap();
    rec.heartbeat(&beat(BotStatus::Error, 2_000)).await.unwrap();

    let got = rec
        .latest_heartbeat("liquidity-vector-keeper")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got.status, BotStatus::Error);
    assert_eq!(got.last_seen_ms, 2_000);
    assert_eq!(got.metadata["cycle"], 3);

    let n: i64 = sqlx::query("SELECT COUNT(*) AS n FROM bot_heartbeats")
        .fetch_one(&pool)
        .await
        .unwrap()
        .get("n");
    assert_eq!(n, 1);
}

#[tokio::test]
async fn price_history_upserts_by_timestamp() {
    let pool = setup_db().await;
    let rec = SqlRecorder::new(pool.clone());

    let first = PriceSeries::new(vec![
        PricePoint { ts_ms: 1, price: 10.0 },
        PricePoint { ts_ms: 2, price: 11.0 },
    ]);
    let second = PriceSeries::new(vec![
        PricePoint { ts_ms: 2, price: 12.5 },
        PricePoint { ts_ms: 3, price: 13.0 },
    ]);
    rec.record_prices("ethereum", &first).await.unwrap();
    rec.record_prices("ethereum", &second).await.unwrap();

    let rows = sqlx::query("SELECT ts_ms, price FROM price_history WHERE asset = $1 ORDER BY ts_ms")
        .bind("ethereum")
        .fetch_all(&pool)
        .await
        .unwrap();
    let prices: Vec<(i64, f64)> = rows.iter().map(|r| (r.get("ts_ms"), r.get("price"))).collect();
    assert_eq!(prices, vec![(1, 10.0), (2, 12.5), (3, 13.0)]);
}

#[tokio::test]
async fn rebalance_and_apy_rows_are_written() {
    let pool = setup_db().await;
    let rec = SqlRecorder::new(pool.clone());

    let event = RebalanceRecord {
        ts_ms: 5,
        tx_hash: B256::repeat_byte(1).to_string(),
        range: TickRange::new(-600, 600),
        lower_price: 0.94,
        upper_price: 1.06,
        gas_used: 210_000,
        gas_price_wei: 12_000_000_000,
        block_number: Some(19_000_000),
        signer: "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".into(),
    };
    rec.record_rebalance(&event).await.unwrap();
    // duplicate hash is ignored
    rec.record_rebalance(&event).await.unwrap();

    rec.record_apy(&ApySnapshot {
        ts_ms: 5,
        total_assets: "1000000000000000000000".into(),
        apy_pct: None,
    })
    .await
    .unwrap();

    let row = sqlx::query("SELECT COUNT(*) AS n, MAX(tick_lower) AS lo FROM rebalance_events")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(row.get::<i64, _>("n"), 1);
    assert_eq!(row.get::<i64, _>("lo"), -600);

    let assets: String = sqlx::query("SELECT total_assets FROM apy_snapshots")
        .fetch_one(&pool)
        .await
        .unwrap()
        .get("total_assets");
    assert_eq!(assets, "1000000000000000000000");
}

#[tokio::test]
async fn cycle_outcomes_keep_optional_columns() {
    let pool = setup_db().await;
    let rec = SqlRecorder::new(pool.clone());

    let mut done = CycleOutcome::new(1, Uuid::new_v4().to_string(), 10);
    done.range = Some(TickRange::new(-120, 180));
    done.hedge = Some(HedgeSignal::Hedge);
    done.verdict = Some(ProfitabilityGate::new(0.02).judge(500_000, 100_000_000_000));
    rec.record_cycle(&done).await.unwrap();

    let mut failed = CycleOutcome::new(2, Uuid::new_v4().to_string(), 20);
    failed.fail(&KeeperError::Infrastructure(anyhow::anyhow!("rpc down")));
    assert_eq!(failed.disposition, CycleDisposition::Failed);
    rec.record_cycle(&failed).await.unwrap();

    let rows = sqlx::query(
        "SELECT disposition, tick_lower, hedge, accepted, error_kind FROM cycle_outcomes ORDER BY cycle",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get::<String, _>("disposition"), "completed");
    assert_eq!(rows[0].get::<Option<i64>, _>("tick_lower"), Some(-120));
    assert_eq!(rows[0].get::<Option<f64>, _>("hedge"), Some(1.0));
    assert_eq!(rows[0].get::<Option<i64>, _>("accepted"), Some(0));

    assert_eq!(rows[1].get::<String, _>("disposition"), "failed");
    assert_eq!(rows[1].get::<Option<i64>, _>("tick_lower"), None);
    assert_eq!(rows[1].get::<Option<String>, _>("error_kind").as_deref(), Some("infrastructure"));
}
