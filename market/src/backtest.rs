//! Walk-forward evaluation of the range forecaster.
//!
//! For every position `i` with a full window behind it, forecast from
//! `prices[i + 1 - window ..= i]` and check whether `prices[i + 1]` lands
//! inside the forecast band. The hit rate is the share of periods the vault
//! would have stayed in range.

use serde::Serialize;
use tracing::{debug, info};

use crate::error::ForecastError;
use crate::range::RangeForecaster;
use crate::types::PriceSeries;

pub const DEFAULT_WINDOW: usize = 120;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BacktestReport {
    pub window: usize,
    pub samples: usize,
    pub in_range: usize,
    /// Windows where the model could not produce a range.
    pub skipped: usize,
    pub mean_width_ticks: f64,
}

impl BacktestReport {
    pub fn hit_rate(&self) -> Option<f64> {
        (self.samples > 0).then(|| self.in_range as f64 / self.samples as f64)
    }
}

pub fn run_backtest(
    series: &PriceSeries,
    window: usize,
    forecaster: &RangeForecaster,
) -> Result<BacktestReport, ForecastError> {
    if window < forecaster.min_history() {
        return Err(ForecastError::InsufficientData {
            required: forecaster.min_history(),
            actual: window,
        });
    }
    if series.len() <= window {
        return Err(ForecastError::InsufficientData {
            required: window + 1,
            actual: series.len(),
        });
    }

    let prices = series.prices();
    let mut report = BacktestReport {
        window,
        ..Default::default()
    };
    let mut width_sum = 0i64;

    for i in (window - 1)..(prices.len() - 1) {
        let history = series.slice(i + 1 - window, i + 1);
        let next_price = prices[i + 1];

        match forecaster.forecast(&history) {
            Ok(range) => {
                report.samples += 1;
                width_sum += range.width() as i64;
                if range.contains_price(next_price) {
                    report.in_range += 1;
                }
            }
            Err(e) => {
                debug!(index = i, error = %e, "backtest window skipped");
                report.skipped += 1;
            }
        }
    }

    if report.samples > 0 {
        report.mean_width_ticks = width_sum as f64 / report.samples as f64;
    }

    info!(
        window,
        samples = report.samples,
        in_range = report.in_range,
        skipped = report.skipped,
        hit_rate = report.hit_rate().unwrap_or(0.0),
        "backtest finished"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::volatility::EwmaVolatility;

    fn forecaster() -> RangeForecaster {
        RangeForecaster::new(Arc::new(EwmaVolatility::default()))
    }

    #[test]
    fn counts_every_step_after_the_first_window() {
        let series =
            PriceSeries::from_prices((0..130).map(|i| 1_000.0 + 20.0 * ((i % 5) as f64 - 2.0)));
        let report = run_backtest(&series, 100, &forecaster()).unwrap();
        assert_eq!(report.samples + report.skipped, 30);
        assert!(report.hit_rate().is_some());
    }

    #[test]
    fn oscillating_market_mostly_stays_in_range() {
        let series =
            PriceSeries::from_prices((0..200).map(|i| 1_000.0 + 20.0 * ((i % 2) as f64)));
        let report = run_backtest(&series, 120, &forecaster()).unwrap();
        assert!(report.hit_rate().unwrap() > 0.9);
    }

    #[test]
    fn window_below_model_minimum_is_rejected() {
        let series = PriceSeries::from_prices(vec![1.0; 300]);
        assert!(matches!(
            run_backtest(&series, 50, &forecaster()),
            Err(ForecastError::InsufficientData { .. })
        ));
    }

    #[test]
    fn series_shorter_than_window_is_rejected() {
        let series = PriceSeries::from_prices(vec![1.0; 100]);
        assert!(run_backtest(&series, 120, &forecaster()).is_err());
    }
}
