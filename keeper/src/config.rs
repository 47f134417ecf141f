use std::str::FromStr;
use std::time::Duration;

use market::feed::coingecko::DEFAULT_BASE_URL;
use tracing::warn;

use crate::engine::LoopPolicy;

#[derive(Clone, Debug)]
pub struct KeeperConfig {
    // =========================
    // Chain
    // =========================
    /// JSON-RPC endpoint of the chain node.
    pub rpc_url: String,

    /// Hex private key used both for proofs and for transaction signing.
    ///
    /// Absent => forecast-only mode. Never logged.
    pub keeper_pk: Option<String>,

    /// Target vault contract. Absent => forecast-only mode.
    pub vault_address: Option<String>,

    /// Upper bound on the receipt wait after broadcast.
    pub confirmation_timeout: Duration,

    // =========================
    // Persistence
    // =========================
    /// sqlx DSN. Absent => log-only recorder.
    pub database_url: Option<String>,

    pub bot_id: String,

    // =========================
    // Market data
    // =========================
    pub price_feed_url: String,
    pub price_asset_id: String,
    pub lookback_days: u32,

    // =========================
    // Gate
    // =========================
    /// Maximum acceptable rebalance cost in ETH (inclusive).
    pub gas_cost_threshold_eth: f64,

    /// Gas units assumed for one rebalance call.
    pub estimated_gas_units: u64,

    // =========================
    // Loop
    // =========================
    pub max_consecutive_errors: u32,
    pub cycle_interval: Duration,

    /// Slice length for cancellation-aware sleeps.
    pub shutdown_poll: Duration,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            keeper_pk: None,
            vault_address: None,
            confirmation_timeout: Duration::from_secs(180),
            database_url: None,
            bot_id: "liquidity-vector-keeper".to_string(),
            price_feed_url: DEFAULT_BASE_URL.to_string(),
            price_asset_id: "ethereum".to_string(),
            lookback_days: 90,
            gas_cost_threshold_eth: 0.02,
            estimated_gas_units: 500_000,
            max_consecutive_errors: 5,
            cycle_interval: Duration::from_secs(3_600),
            shutdown_poll: Duration::from_secs(10),
        }
    }
}

impl KeeperConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup; `from_env` is the
    /// process-environment instance.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Self {
            rpc_url: text("RPC_URL").unwrap_or(d.rpc_url),
            keeper_pk: text("KEEPER_PK"),
            vault_address: text("VAULT_ADDRESS"),
            confirmation_timeout: Duration::from_secs(parse_or(
                &lookup,
                "CONFIRMATION_TIMEOUT_SECS",
                d.confirmation_timeout.as_secs(),
            )),
            database_url: text("DATABASE_URL"),
            bot_id: text("BOT_ID").unwrap_or(d.bot_id),
            price_feed_url: text("PRICE_FEED_URL").unwrap_or(d.price_feed_url),
            price_asset_id: text("PRICE_ASSET_ID").unwrap_or(d.price_asset_id),
            lookback_days: parse_or(&lookup, "LOOKBACK_DAYS", d.lookback_days),
            gas_cost_threshold_eth: parse_or(
                &lookup,
                "GAS_COST_THRESHOLD_ETH",
                d.gas_cost_threshold_eth,
            ),
            estimated_gas_units: parse_or(&lookup, "ESTIMATED_GAS_UNITS", d.estimated_gas_units),
            max_consecutive_errors: parse_or(
                &lookup,
                "MAX_CONSECUTIVE_ERRORS",
                d.max_consecutive_errors,
            ),
            cycle_interval: Duration::from_secs(parse_or(
                &lookup,
                "CYCLE_INTERVAL_SECS",
                d.cycle_interval.as_secs(),
            )),
            shutdown_poll: Duration::from_secs(
                parse_or(&lookup, "SHUTDOWN_POLL_SECS", d.shutdown_poll.as_secs()).max(1),
            ),
        }
    }

    /// Both the key and the vault must be present to submit.
    pub fn submission_enabled(&self) -> bool {
        self.keeper_pk.is_some() && self.vault_address.is_some()
    }

    pub fn loop_policy(&self) -> LoopPolicy {
        LoopPolicy {
            lookback_days: self.lookback_days,
            estimated_gas_units: self.estimated_gas_units,
            max_consecutive_errors: self.max_consecutive_errors.max(1),
            cycle_interval: self.cycle_interval,
            shutdown_poll: self.shutdown_poll,
            ..LoopPolicy::default()
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) if raw.trim().is_empty() => default,
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                warn!(key, value = %raw, default = %default, "malformed config value, using default");
                default
            }
        },
    }
}
