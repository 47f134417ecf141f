//! Volatility estimation behind a narrow `history -> sigma` interface.
//!
//! The range forecaster only needs a one-step-ahead standard deviation of
//! log returns; how it is estimated is swappable.

mod ewma;
mod garch;
mod optimize;

pub use ewma::EwmaVolatility;
pub use garch::{Garch11, GarchFit};
pub use optimize::{NelderMead, Minimum};

use crate::error::ForecastError;
use crate::types::PriceSeries;

/// Returns are multiplied by this before fitting and sigma divided by it after.
pub const RETURN_SCALE: f64 = 100.0;

/// Sample variances at or below this are treated as a degenerate (flat) series.
pub const MIN_RETURN_VARIANCE: f64 = 1e-12;

pub trait VolatilityEstimator: Send + Sync {
    fn name(&self) -> &'static str;

    /// One-step-ahead conditional standard deviation of log returns,
    /// in plain return units (0.02 == 2%). Always finite and `>= 0` on success.
    fn forecast_sigma(&self, history: &PriceSeries) -> Result<f64, ForecastError>;
}

/// `100 * ln(p_t / p_{t-1})`; the undefined first return is dropped.
pub fn scaled_log_returns(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .map(|w| RETURN_SCALE * (w[1] / w[0]).ln())
        .collect()
}

pub(crate) fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Population variance.
pub(crate) fn variance(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let m = mean(xs);
    xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / xs.len() as f64
}

pub(crate) fn returns_for_fit(history: &PriceSeries) -> Result<Vec<f64>, ForecastError> {
    history.validate()?;
    let returns = scaled_log_returns(&history.prices());
    if returns.len() < 2 {
        return Err(ForecastError::InsufficientData {
            required: 3,
            actual: history.len(),
        });
    }
    if variance(&returns) <= MIN_RETURN_VARIANCE {
        return Err(ForecastError::ModelConvergence(
            "zero-variance returns (flat price series)".into(),
        ));
    }
    Ok(returns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_drop_first_observation() {
        let r = scaled_log_returns(&[100.0, 110.0, 99.0]);
        assert_eq!(r.len(), 2);
        assert!((r[0] - 100.0 * (1.1f64).ln()).abs() < 1e-12);
        assert!(r[1] < 0.0);
    }

    #[test]
    fn flat_series_is_a_convergence_failure() {
        let s = PriceSeries::from_prices(std::iter::repeat_n(1500.0, 120));
        assert!(matches!(
            returns_for_fit(&s),
            Err(ForecastError::ModelConvergence(_))
        ));
    }
}
