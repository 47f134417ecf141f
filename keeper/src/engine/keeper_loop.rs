//! Keeper decision loop.
//!
//! ```text
//! Idle → FetchingData → Forecasting → Gating → [Submitting] → Recording → Sleeping → Idle
//!                 └──────────── any counted failure ────────────→ ErrorRecovering → Idle
//! ```
//!
//! Each cycle ends in a `CycleDisposition`. Only `Failed` feeds the
//! consecutive-error ceiling; reaching it is the single fatal path.
//! Cancellation is checked before a cycle starts, during fetch retries,
//! before submitting, and every poll slice while sleeping. A cancelled cycle
//! ends the loop gracefully without touching the counters. A submission that has started is always
//! awaited to completion.

use std::sync::Arc;

use anyhow::Context;
use common::logger::{TraceId, cycle_span, stage_span, warn_if_slow};
use market::feed::PriceFeed;
use market::{PriceSeries, RangeForecast, RangeForecaster, TrendClassifier};
use serde_json::json;
use tracing::{Instrument, Span, error, field, info, warn};

use super::apy::annualized_growth_pct;
use super::outcome::{CycleDisposition, CycleOutcome, ShutdownReason};
use super::policy::LoopPolicy;
use super::state::{KeeperState, LoopState};
use crate::chain::{ActionSubmitter, LedgerReader};
use crate::error::KeeperError;
use crate::gate::{GasPriceSource, ProfitabilityGate};
use crate::metrics::Counters;
use crate::proof::{self, ProofError};
use crate::recorder::{ApySnapshot, BestEffort, BotStatus, Heartbeat, RebalanceRecord, Recorder};
use crate::shutdown::ShutdownToken;
use crate::time::now_ms;

/// External capabilities the loop drives.
///
/// `ledger` and `submitter` are optional: without them the keeper runs in
/// forecast-only mode.
#[derive(Clone)]
pub struct KeeperDeps {
    pub feed: Arc<dyn PriceFeed>,
    pub gas: Arc<dyn GasPriceSource>,
    pub ledger: Option<Arc<dyn LedgerReader>>,
    pub submitter: Option<Arc<dyn ActionSubmitter>>,
    pub recorder: Arc<dyn Recorder>,
}

pub struct KeeperLoop {
    feed: Arc<dyn PriceFeed>,
    gas: Arc<dyn GasPriceSource>,
    ledger: Option<Arc<dyn LedgerReader>>,
    submitter: Option<Arc<dyn ActionSubmitter>>,
    recorder: BestEffort,

    forecaster: RangeForecaster,
    trend: TrendClassifier,
    gate: ProfitabilityGate,
    signing_key: Option<String>,

    policy: LoopPolicy,
    bot_id: String,
    asset_id: String,

    shutdown: ShutdownToken,
    counters: Counters,
    state: LoopState,
}

impl KeeperLoop {
    pub fn new(
        deps: KeeperDeps,
        gate: ProfitabilityGate,
        policy: LoopPolicy,
        shutdown: ShutdownToken,
    ) -> Self {
        Self {
            feed: deps.feed,
            gas: deps.gas,
            ledger: deps.ledger,
            submitter: deps.submitter,
            recorder: BestEffort::new(deps.recorder),
            forecaster: RangeForecaster::default(),
            trend: TrendClassifier::default(),
            gate,
            signing_key: None,
            policy,
            bot_id: "liquidity-vector-keeper".to_string(),
            asset_id: "ethereum".to_string(),
            shutdown,
            counters: Counters::default(),
            state: LoopState::default(),
        }
    }

    pub fn with_forecaster(mut self, forecaster: RangeForecaster) -> Self {
        self.forecaster = forecaster;
        self
    }

    pub fn with_signing_key(mut self, key: Option<String>) -> Self {
        self.signing_key = key;
        self
    }

    pub fn with_identity(mut self, bot_id: impl Into<String>, asset_id: impl Into<String>) -> Self {
        self.bot_id = bot_id.into();
        self.asset_id = asset_id.into();
        self
    }

    pub async fn run(mut self) -> ShutdownReason {
        info!(
            bot_id = %self.bot_id,
            asset = %self.asset_id,
            estimator = self.forecaster.estimator_name(),
            threshold_eth = self.gate.threshold_eth(),
            submission = self.submitter.is_some(),
            "keeper loop started"
        );
        if let Some(missing) = self.policy.history_shortfall(self.forecaster.min_history()) {
            warn!(
                lookback_days = self.policy.lookback_days,
                expected_points = self.policy.expected_points(),
                min_history = self.forecaster.min_history(),
                missing,
                "lookback window is shorter than the forecaster needs; every cycle will be skipped"
            );
        }

        let reason = loop {
            if self.shutdown.is_cancelled() {
                break ShutdownReason::Graceful;
            }

            self.state.enter(KeeperState::Idle);
            let cycle = self.state.begin_cycle();
            let trace_id = TraceId::new();
            let span = cycle_span(cycle, &trace_id);

            let outcome = self.run_cycle(cycle, &trace_id).instrument(span).await;

            self.state.enter(KeeperState::Recording);
            self.recorder.cycle(&outcome).await;

            match outcome.disposition {
                CycleDisposition::Completed => {
                    self.state.record_success();
                    self.beat(BotStatus::Healthy, &outcome).await;
                }
                CycleDisposition::Skipped => {
                    let skips = self.state.record_skip();
                    if skips >= self.policy.skip_warn_after {
                        warn!(
                            consecutive_skips = skips,
                            error = outcome.error.as_deref().unwrap_or_default(),
                            "no forecast produced for several cycles"
                        );
                    }
                    self.beat(BotStatus::Active, &outcome).await;
                }
                CycleDisposition::Cancelled => break ShutdownReason::Graceful,
                CycleDisposition::Failed => {
                    let n = self.state.record_failure();
                    if n >= self.policy.max_consecutive_errors {
                        break ShutdownReason::Fatal {
                            consecutive_errors: n,
                        };
                    }
                    self.beat(BotStatus::Error, &outcome).await;

                    self.state.enter(KeeperState::ErrorRecovering);
                    let backoff = self.policy.error_backoff(n);
                    warn!(
                        consecutive_errors = n,
                        ceiling = self.policy.max_consecutive_errors,
                        backoff_secs = backoff.as_secs(),
                        "cycle failed, backing off"
                    );
                    if self.shutdown.sleep(backoff, self.policy.shutdown_poll).await {
                        break ShutdownReason::Graceful;
                    }
                    continue;
                }
            }

            self.state.enter(KeeperState::Sleeping);
            if self
                .shutdown
                .sleep(self.policy.cycle_interval, self.policy.shutdown_poll)
                .await
            {
                break ShutdownReason::Graceful;
            }
        };

        self.state.enter(KeeperState::ShuttingDown);
        let final_status = match reason {
            ShutdownReason::Graceful => BotStatus::Stopped,
            ShutdownReason::Fatal { .. } => BotStatus::Critical,
        };
        self.write_heartbeat(final_status, json!({ "shutdown": reason.to_string() }))
            .await;

        let totals = self.counters.snapshot();
        match reason {
            ShutdownReason::Graceful => {
                info!(cycles = totals.cycles, counters = ?totals, "keeper stopped gracefully")
            }
            ShutdownReason::Fatal { consecutive_errors } => error!(
                consecutive_errors,
                cycles = totals.cycles,
                counters = ?totals,
                "keeper stopped: consecutive error ceiling reached"
            ),
        }

        reason
    }

    async fn run_cycle(&mut self, cycle: u64, trace_id: &TraceId) -> CycleOutcome {
        Counters::bump(&self.counters.cycles);
        let mut outcome = CycleOutcome::new(cycle, trace_id.to_string(), now_ms());

        match self.execute(&mut outcome).await {
            Ok(()) => {
                Counters::bump(&self.counters.completed);
                info!(
                    accepted = outcome.verdict.as_ref().map(|v| v.accepted),
                    submitted = outcome.tx_hash.is_some(),
                    "cycle completed"
                );
            }
            Err(e) => {
                outcome.fail(&e);
                match outcome.disposition {
                    CycleDisposition::Skipped => {
                        Counters::bump(&self.counters.skipped);
                        warn!(kind = e.kind(), error = %e, "cycle skipped");
                    }
                    CycleDisposition::Cancelled => {
                        info!(error = %e, "cycle abandoned for shutdown");
                    }
                    _ => {
                        Counters::bump(&self.counters.failed);
                        error!(kind = e.kind(), error = %e, "cycle failed");
                    }
                }
            }
        }

        outcome
    }

    async fn execute(&mut self, out: &mut CycleOutcome) -> Result<(), KeeperError> {
        // fetch
        self.state.enter(KeeperState::FetchingData);
        let series = self.fetch_with_retry().instrument(stage_span("fetch")).await?;
        self.recorder.prices(&self.asset_id, &series).await;

        // forecast
        self.state.enter(KeeperState::Forecasting);
        let hedge = self.trend.classify(&series);
        out.hedge = Some(hedge);
        let forecast = self.forecast(series).instrument(stage_span("forecast")).await?;
        out.range = Some(forecast.range);
        Span::current().record("range", field::display(forecast.range));
        info!(
            tick_lower = forecast.range.lower,
            tick_upper = forecast.range.upper,
            sigma = forecast.sigma,
            current_price = forecast.current_price,
            hedge = hedge.ratio(),
            "forecast ready"
        );

        self.snapshot_apy().await;

        // gate
        self.state.enter(KeeperState::Gating);
        let verdict = self
            .gate
            .evaluate(self.policy.estimated_gas_units, self.gas.as_ref())
            .instrument(stage_span("gate"))
            .await;
        let accepted = verdict.accepted;
        out.verdict = Some(verdict);
        if !accepted {
            Counters::bump(&self.counters.gate_rejections);
            return Ok(());
        }

        let (Some(ledger), Some(submitter)) = (self.ledger.clone(), self.submitter.clone()) else {
            info!("forecast-only mode, not submitting");
            return Ok(());
        };

        if self.shutdown.is_cancelled() {
            info!("shutdown requested, not starting submission");
            return Ok(());
        }

        // prove + submit
        self.state.enter(KeeperState::Submitting);
        let height = ledger
            .block_number()
            .await
            .context("reading freshness height")?;

        let proof = match proof::sign(&forecast.range, height, self.signing_key.as_deref()) {
            Ok(p) => p,
            Err(ProofError::MissingCredential(reason)) => {
                warn!(%reason, "no usable signing key, submission disabled");
                out.error_kind = Some("missing_credential");
                out.error = Some(reason);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        out.proof_digest = Some(proof.digest());

        Counters::bump(&self.counters.submissions);
        let submitted = submitter
            .submit(&forecast.range, &proof)
            .instrument(stage_span("submit"))
            .await;
        let receipt = match submitted {
            Ok(r) => r,
            Err(e) => {
                Counters::bump(&self.counters.submission_failures);
                if let Some(hash) = e.tx_hash {
                    warn!(tx_hash = %hash, stage = %e.stage, "transaction may be pending; not resubmitting this cycle");
                }
                return Err(e.into());
            }
        };

        out.tx_hash = Some(receipt.tx_hash);
        Span::current().record("tx_hash", field::display(receipt.tx_hash));
        info!(
            tx_hash = %receipt.tx_hash,
            block_number = receipt.block_number,
            gas_used = receipt.gas_used,
            freshness_height = height,
            "rebalance confirmed"
        );

        self.recorder
            .rebalance(&RebalanceRecord {
                ts_ms: now_ms(),
                tx_hash: receipt.tx_hash.to_string(),
                range: forecast.range,
                lower_price: forecast.lower_price,
                upper_price: forecast.upper_price,
                gas_used: receipt.gas_used,
                gas_price_wei: receipt.effective_gas_price,
                block_number: receipt.block_number,
                signer: receipt.sender.to_string(),
            })
            .await;

        Ok(())
    }

    async fn fetch_with_retry(&self) -> Result<PriceSeries, KeeperError> {
        let attempts = self.policy.fetch_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let fetched = warn_if_slow(
                "price_fetch",
                std::time::Duration::from_secs(5),
                self.feed.fetch_history(self.policy.lookback_days),
            )
            .await;

            match fetched {
                Ok(series) => return Ok(series),
                Err(e) if attempt < attempts => {
                    let delay = self.policy.fetch_delay(attempt);
                    warn!(attempt, error = %e, delay_ms = delay.as_millis() as u64, "price fetch failed, retrying");
                    if self.shutdown.sleep(delay, self.policy.shutdown_poll).await {
                        return Err(KeeperError::Cancelled("fetch retry"));
                    }
                }
                Err(e) => {
                    return Err(KeeperError::DataFetch {
                        attempts: attempt,
                        source: e,
                    });
                }
            }
        }
    }

    /// Model fitting is CPU-bound; keep it off the async workers.
    async fn forecast(&self, series: PriceSeries) -> Result<RangeForecast, KeeperError> {
        let forecaster = self.forecaster.clone();
        let fitted = tokio::task::spawn_blocking(move || forecaster.forecast_detailed(&series))
            .await
            .context("forecast task panicked")?;
        Ok(fitted?)
    }

    async fn snapshot_apy(&mut self) {
        let Some(ledger) = self.ledger.clone() else {
            return;
        };
        match ledger.total_assets().await {
            Ok(assets) => {
                let now = now_ms();
                let apy_pct = self
                    .state
                    .last_assets
                    .and_then(|(ts, prev)| annualized_growth_pct(prev, ts, assets, now));
                self.state.last_assets = Some((now, assets));
                self.recorder
                    .apy(&ApySnapshot {
                        ts_ms: now,
                        total_assets: assets.to_string(),
                        apy_pct,
                    })
                    .await;
            }
            Err(e) => warn!(error = %e, "totalAssets read failed, apy snapshot skipped"),
        }
    }

    async fn beat(&mut self, status: BotStatus, outcome: &CycleOutcome) {
        let metadata = json!({
            "cycle": outcome.cycle,
            "disposition": outcome.disposition,
            "consecutive_errors": self.state.consecutive_errors(),
            "consecutive_skips": self.state.consecutive_skips(),
            "error": outcome.error,
        });
        self.write_heartbeat(status, metadata).await;
    }

    async fn write_heartbeat(&mut self, status: BotStatus, metadata: serde_json::Value) {
        self.state.set_status(status);
        self.recorder
            .heartbeat(&Heartbeat {
                bot_id: self.bot_id.clone(),
                status,
                last_seen_ms: now_ms(),
                metadata,
            })
            .await;
    }
}
