//! Range Forecaster
//!
//! Turns a price history into the tick range the vault should provide
//! liquidity in for the next period.
//!
//! ## Algorithm
//!
//! ```text
//! sigma       = estimator(history)              // one-step-ahead, return units
//! lower_price = p_now * (1 - k * sigma)
//! upper_price = p_now * (1 + k * sigma)
//! tick        = floor(ln(price) / ln(1.0001))
//! aligned     = floor(tick / spacing) * spacing
//! ```
//!
//! With `k = 2.0` the band is a ~95% two-sided interval under a normal
//! assumption.
//!
//! ## Guarantees
//! - both bounds are multiples of the spacing and inside the ledger's tick domain
//! - `lower < upper` (if alignment collapses the band, upper is pushed one spacing up)
//! - width is non-decreasing in sigma for a fixed current price

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ForecastError;
use crate::tick::{self, TICK_SPACING};
use crate::types::{PriceSeries, TickRange};
use crate::volatility::{Garch11, VolatilityEstimator};

pub const MIN_FORECAST_HISTORY: usize = 100;
pub const DEFAULT_CONFIDENCE_K: f64 = 2.0;

/// Forecast result with the intermediate values that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeForecast {
    pub range: TickRange,
    pub sigma: f64,
    pub current_price: f64,
    pub lower_price: f64,
    pub upper_price: f64,
}

#[derive(Clone)]
pub struct RangeForecaster {
    estimator: Arc<dyn VolatilityEstimator>,
    confidence_k: f64,
    tick_spacing: i32,
    min_history: usize,
}

impl std::fmt::Debug for RangeForecaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangeForecaster")
            .field("estimator", &self.estimator.name())
            .field("confidence_k", &self.confidence_k)
            .field("tick_spacing", &self.tick_spacing)
            .field("min_history", &self.min_history)
            .finish()
    }
}

impl Default for RangeForecaster {
    fn default() -> Self {
        Self::new(Arc::new(Garch11::new()))
    }
}

impl RangeForecaster {
    pub fn new(estimator: Arc<dyn VolatilityEstimator>) -> Self {
        Self {
            estimator,
            confidence_k: DEFAULT_CONFIDENCE_K,
            tick_spacing: TICK_SPACING,
            min_history: MIN_FORECAST_HISTORY,
        }
    }

    pub fn estimator_name(&self) -> &'static str {
        self.estimator.name()
    }

    pub fn min_history(&self) -> usize {
        self.min_history
    }

    pub fn forecast(&self, history: &PriceSeries) -> Result<TickRange, ForecastError> {
        self.forecast_detailed(history).map(|f| f.range)
    }

    pub fn forecast_detailed(&self, history: &PriceSeries) -> Result<RangeForecast, ForecastError> {
        if history.len() < self.min_history {
            return Err(ForecastError::InsufficientData {
                required: self.min_history,
                actual: history.len(),
            });
        }
        history.validate()?;

        let current_price = history
            .latest()
            .map(|p| p.price)
            .ok_or(ForecastError::InsufficientData {
                required: self.min_history,
                actual: 0,
            })?;

        let sigma = self.estimator.forecast_sigma(history)?;
        if !(sigma.is_finite() && sigma >= 0.0) {
            return Err(ForecastError::ModelConvergence(format!(
                "{} produced invalid sigma {sigma}",
                self.estimator.name()
            )));
        }

        let lower_price = current_price * (1.0 - self.confidence_k * sigma);
        let upper_price = current_price * (1.0 + self.confidence_k * sigma);
        let range = self.to_ticks(lower_price, upper_price)?;

        debug!(
            estimator = self.estimator.name(),
            sigma,
            current_price,
            lower_price,
            upper_price,
            tick_lower = range.lower,
            tick_upper = range.upper,
            "range forecast computed"
        );

        Ok(RangeForecast {
            range,
            sigma,
            current_price,
            lower_price,
            upper_price,
        })
    }

    fn to_ticks(&self, lower_price: f64, upper_price: f64) -> Result<TickRange, ForecastError> {
        let spacing = self.tick_spacing;
        let min_tick = tick::min_usable_tick(spacing);
        let max_tick = tick::max_usable_tick(spacing);

        // A band wider than the price itself has no lower tick; pin it to the floor.
        let lower_raw = tick::price_to_tick(lower_price).unwrap_or(min_tick);
        let upper_raw = tick::price_to_tick(upper_price).ok_or_else(|| {
            ForecastError::ModelConvergence(format!("upper price {upper_price} has no tick"))
        })?;

        let mut lower = tick::align_down(lower_raw, spacing).clamp(min_tick, max_tick);
        let mut upper = tick::align_down(upper_raw, spacing).clamp(min_tick, max_tick);

        if upper <= lower {
            if lower + spacing <= max_tick {
                upper = lower + spacing;
            } else {
                lower = upper - spacing;
            }
        }

        Ok(TickRange { lower, upper })
    }
}
