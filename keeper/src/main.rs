use std::sync::Arc;

use alloy::primitives::Address;
use anyhow::Context;
use clap::{Parser, Subcommand};
use common::logger::init_tracing;
use keeper::{
    chain::{ActionSubmitter, EvmChain, LedgerReader},
    config::KeeperConfig,
    db::Db,
    engine::{KeeperDeps, KeeperLoop, ShutdownReason},
    gate::ProfitabilityGate,
    monitor::assess_heartbeat,
    proof::parse_signing_key,
    recorder::{LogRecorder, Recorder, SqlRecorder},
    shutdown::{ShutdownToken, install_signal_handlers},
    time::{ms_to_utc, now_ms},
};
use market::backtest::{DEFAULT_WINDOW, run_backtest};
use market::feed::{CoinGeckoFeed, PriceFeed};
use market::volatility::EwmaVolatility;
use market::RangeForecaster;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "keeper", about = "Liquidity range keeper", propagate_version = true, version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the keeper loop (default)
    Run,
    /// Check the bot heartbeat; exits non-zero when unhealthy
    Monitor,
    /// Walk-forward evaluation of the range forecaster
    Backtest(BacktestArgs),
}

#[derive(Parser)]
struct BacktestArgs {
    /// Days of history to fetch
    #[arg(long, default_value_t = 365)]
    days: u32,

    /// Forecast window length in days
    #[arg(long, default_value_t = DEFAULT_WINDOW)]
    window: usize,

    /// Use the EWMA estimator instead of GARCH(1,1)
    #[arg(long)]
    ewma: bool,
}

/// Falls back to the log recorder if the database cannot be opened.
async fn open_recorder(cfg: &KeeperConfig) -> Arc<dyn Recorder> {
    let Some(url) = cfg.database_url.as_deref() else {
        info!("DATABASE_URL not set, recording to log only");
        return Arc::new(LogRecorder);
    };

    let opened = async {
        let db = Db::connect(url).await?;
        db.migrate().await?;
        anyhow::Ok(db)
    }
    .await;

    match opened {
        Ok(db) => Arc::new(SqlRecorder::new(db.pool.as_ref().clone())) as Arc<dyn Recorder>,
        Err(e) => {
            warn!(error = %e, "database unavailable, recording to log only");
            Arc::new(LogRecorder) as Arc<dyn Recorder>
        }
    }
}

async fn run(cfg: KeeperConfig) -> anyhow::Result<()> {
    let feed = Arc::new(CoinGeckoFeed::new(
        cfg.price_feed_url.clone(),
        cfg.price_asset_id.clone(),
    )?);
    let recorder = open_recorder(&cfg).await;

    let vault = match cfg.vault_address.as_deref().map(str::parse::<Address>) {
        Some(Ok(addr)) => Some(addr),
        Some(Err(e)) => {
            warn!(error = %e, "VAULT_ADDRESS is malformed");
            None
        }
        None => None,
    };
    let signer = match parse_signing_key(cfg.keeper_pk.as_deref()) {
        Ok(s) => Some(s),
        Err(e) => {
            warn!(error = %e, "submission disabled");
            None
        }
    };

    let mut chain = EvmChain::connect(&cfg.rpc_url, cfg.confirmation_timeout)?;
    if let Some(v) = vault {
        chain = chain.with_vault(v);
    }
    if let Some(s) = signer.clone() {
        info!(signer = %s.address(), "signing key loaded");
        chain = chain.with_signer(s);
    }
    let chain = Arc::new(chain);

    let ledger: Option<Arc<dyn LedgerReader>> = vault.map(|_| chain.clone() as Arc<dyn LedgerReader>);
    let submitter: Option<Arc<dyn ActionSubmitter>> = match (vault, &signer) {
        (Some(_), Some(_)) => Some(chain.clone() as Arc<dyn ActionSubmitter>),
        _ if cfg.submission_enabled() => {
            warn!("VAULT_ADDRESS or KEEPER_PK is malformed, running forecast-only");
            None
        }
        _ => {
            warn!("VAULT_ADDRESS or KEEPER_PK missing, running forecast-only");
            None
        }
    };

    let shutdown = ShutdownToken::new();
    install_signal_handlers(shutdown.clone());

    let deps = KeeperDeps {
        feed,
        gas: chain.clone(),
        ledger,
        submitter,
        recorder,
    };

    let reason = KeeperLoop::new(
        deps,
        ProfitabilityGate::new(cfg.gas_cost_threshold_eth),
        cfg.loop_policy(),
        shutdown,
    )
    .with_signing_key(cfg.keeper_pk.clone())
    .with_identity(cfg.bot_id.clone(), cfg.price_asset_id.clone())
    .run()
    .await;

    match reason {
        ShutdownReason::Graceful => Ok(()),
        ShutdownReason::Fatal { .. } => anyhow::bail!("keeper stopped: {reason}"),
    }
}

async fn monitor(cfg: KeeperConfig) -> anyhow::Result<()> {
    let url = cfg
        .database_url
        .as_deref()
        .context("DATABASE_URL is required for monitor")?;
    let db = Db::connect(url).await?;
    db.migrate().await?;

    let beat = SqlRecorder::new(db.pool.as_ref().clone())
        .latest_heartbeat(&cfg.bot_id)
        .await?;
    let health = assess_heartbeat(beat.as_ref(), now_ms());
    if let Some(b) = &beat {
        info!(bot_id = %b.bot_id, status = %b.status, last_seen = %ms_to_utc(b.last_seen_ms).to_rfc3339(), "heartbeat read");
    }

    println!("{}", serde_json::to_string_pretty(&health)?);
    if !health.is_healthy() {
        anyhow::bail!("bot {} is unhealthy", cfg.bot_id);
    }
    Ok(())
}

async fn backtest(cfg: KeeperConfig, args: BacktestArgs) -> anyhow::Result<()> {
    let feed = CoinGeckoFeed::new(cfg.price_feed_url.clone(), cfg.price_asset_id.clone())?;
    let series = feed.fetch_history(args.days).await?;

    let forecaster = if args.ewma {
        RangeForecaster::new(Arc::new(EwmaVolatility::default()))
    } else {
        RangeForecaster::default()
    };

    let report = tokio::task::spawn_blocking(move || run_backtest(&series, args.window, &forecaster))
        .await??;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let is_production = std::env::var("APP_ENV").unwrap_or_default() == "production";
    init_tracing("keeper", is_production);

    let cli = Cli::parse();
    let cfg = KeeperConfig::from_env();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(cfg).await,
        Commands::Monitor => monitor(cfg).await,
        Commands::Backtest(args) => backtest(cfg, args).await,
    }
}
