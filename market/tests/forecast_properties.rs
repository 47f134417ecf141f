use std::sync::Arc;

use market::volatility::{EwmaVolatility, Garch11};
use market::{ForecastError, HedgeSignal, PriceSeries, RangeForecaster, TrendClassifier};
use proptest::prelude::*;

/// Deterministic pseudo-noise in [-1, 1].
fn wobble(i: usize) -> f64 {
    let x = ((i as u64 + 7).wrapping_mul(2_862_933_555_777_941_757) >> 33) % 2_001;
    x as f64 / 1_000.0 - 1.0
}

fn linear_series(n: usize) -> Vec<f64> {
    (0..n).map(|i| 1_000.0 + i as f64).collect()
}

fn noisy_series(n: usize, amplitude: f64) -> Vec<f64> {
    (0..n)
        .map(|i| 1_000.0 + i as f64 + amplitude * wobble(i))
        .collect()
}

/// Noise around a fixed level, with the last point pinned so both series share a current price.
fn pinned_noise(n: usize, amplitude: f64) -> Vec<f64> {
    let mut v: Vec<f64> = (0..n).map(|i| 1_500.0 + amplitude * wobble(i)).collect();
    if let Some(last) = v.last_mut() {
        *last = 1_500.0;
    }
    v
}

// -----------------------
// End-to-end scenarios
// -----------------------

#[test]
fn scenario_a_stable_uptrend_gives_narrow_range_and_no_hedge() {
    let history = PriceSeries::from_prices(linear_series(200));

    let range = RangeForecaster::default().forecast(&history).unwrap();
    let hedge = TrendClassifier::default().classify(&history);

    assert!(range.lower < range.upper);
    assert!(range.width() <= 240, "width was {}", range.width());
    assert_eq!(hedge.ratio(), 0.0);
}

#[test]
fn scenario_b_noise_widens_range() {
    let forecaster = RangeForecaster::default();

    let stable = forecaster
        .forecast(&PriceSeries::from_prices(linear_series(200)))
        .unwrap();
    let noisy = forecaster
        .forecast(&PriceSeries::from_prices(noisy_series(200, 100.0)))
        .unwrap();

    assert!(noisy.width() > stable.width());
}

#[test]
fn scenario_c_three_points_is_insufficient() {
    let history = PriceSeries::from_prices([1_000.0, 1_001.0, 1_002.0]);
    let err = RangeForecaster::default().forecast(&history).unwrap_err();
    assert!(matches!(err, ForecastError::InsufficientData { actual: 3, .. }));
}

#[test]
fn flat_history_reports_convergence_failure() {
    let history = PriceSeries::from_prices(vec![1_800.0; 150]);
    let err = RangeForecaster::default().forecast(&history).unwrap_err();
    assert!(matches!(err, ForecastError::ModelConvergence(_)));
}

#[test]
fn higher_variance_with_same_current_price_is_strictly_wider() {
    for forecaster in [
        RangeForecaster::default(),
        RangeForecaster::new(Arc::new(EwmaVolatility::default())),
    ] {
        let calm = forecaster
            .forecast(&PriceSeries::from_prices(pinned_noise(150, 10.0)))
            .unwrap();
        let wild = forecaster
            .forecast(&PriceSeries::from_prices(pinned_noise(150, 120.0)))
            .unwrap();
        assert!(
            wild.width() > calm.width(),
            "{}: {} vs {}",
            forecaster.estimator_name(),
            wild.width(),
            calm.width()
        );
    }
}

#[test]
fn detailed_forecast_brackets_current_price() {
    let f = RangeForecaster::new(Arc::new(Garch11::new()))
        .forecast_detailed(&PriceSeries::from_prices(noisy_series(150, 40.0)))
        .unwrap();
    assert!(f.sigma > 0.0);
    assert!(f.lower_price < f.current_price && f.current_price < f.upper_price);
    assert!(f.range.lower_price() <= f.lower_price);
}

// -----------------------
// Properties
// -----------------------

/// Prices built from returns whose magnitudes are bounded away from zero.
fn price_path() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0.001f64..0.05, 100..180).prop_map(|mags| {
        let mut p = 1_000.0;
        let mut out = vec![p];
        for (i, m) in mags.iter().enumerate() {
            let sign = if i % 3 == 0 { -1.0 } else { 1.0 };
            p *= 1.0 + sign * m;
            out.push(p);
        }
        out
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn forecast_bounds_are_aligned_and_ordered(prices in price_path()) {
        let range = RangeForecaster::default()
            .forecast(&PriceSeries::from_prices(prices))
            .unwrap();
        prop_assert!(range.lower < range.upper);
        prop_assert_eq!(range.lower % 60, 0);
        prop_assert_eq!(range.upper % 60, 0);
    }

    #[test]
    fn short_history_is_always_rejected(prices in prop::collection::vec(1.0f64..5_000.0, 0..100)) {
        let len = prices.len();
        let err = RangeForecaster::default()
            .forecast(&PriceSeries::from_prices(prices))
            .unwrap_err();
        prop_assert_eq!(err, ForecastError::InsufficientData { required: 100, actual: len });
    }

    #[test]
    fn short_history_never_hedges(prices in prop::collection::vec(1.0f64..5_000.0, 0..25)) {
        let signal = TrendClassifier::default().classify(&PriceSeries::from_prices(prices));
        prop_assert_eq!(signal, HedgeSignal::NoHedge);
        prop_assert_eq!(signal.ratio(), 0.0);
    }
}
