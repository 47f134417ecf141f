//! Trend Classifier
//!
//! EMA crossover on closing prices:
//!
//! ```text
//! alpha = 2 / (span + 1)
//! ema_0 = p_0
//! ema_t = alpha * p_t + (1 - alpha) * ema_{t-1}
//! ```
//!
//! Short EMA below long EMA → downtrend → hedge.
//! Anything else, including too little history, → no hedge.

use serde::{Deserialize, Serialize};

use crate::types::{HedgeSignal, PriceSeries};

pub const SHORT_SPAN: usize = 12;
pub const LONG_SPAN: usize = 24;
pub const MIN_TREND_HISTORY: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendReading {
    pub short_ema: f64,
    pub long_ema: f64,
    pub signal: HedgeSignal,
}

#[derive(Debug, Clone, Copy)]
pub struct TrendClassifier {
    short_span: usize,
    long_span: usize,
    min_history: usize,
}

impl Default for TrendClassifier {
    fn default() -> Self {
        Self {
            short_span: SHORT_SPAN,
            long_span: LONG_SPAN,
            min_history: MIN_TREND_HISTORY,
        }
    }
}

impl TrendClassifier {
    pub fn new(short_span: usize, long_span: usize, min_history: usize) -> Self {
        Self {
            short_span,
            long_span,
            min_history,
        }
    }

    pub fn classify(&self, history: &PriceSeries) -> HedgeSignal {
        self.evaluate(history)
            .map(|r| r.signal)
            .unwrap_or(HedgeSignal::NoHedge)
    }

    /// `None` when the history is shorter than the minimum.
    pub fn evaluate(&self, history: &PriceSeries) -> Option<TrendReading> {
        if history.len() < self.min_history {
            return None;
        }
        let prices = history.prices();
        let short_ema = ema(&prices, self.short_span)?;
        let long_ema = ema(&prices, self.long_span)?;

        let signal = if short_ema < long_ema {
            HedgeSignal::Hedge
        } else {
            HedgeSignal::NoHedge
        };

        Some(TrendReading {
            short_ema,
            long_ema,
            signal,
        })
    }
}

/// Recursive EMA seeded from the first observation; `None` for empty input.
pub fn ema(prices: &[f64], span: usize) -> Option<f64> {
    let (first, rest) = prices.split_first()?;
    let alpha = 2.0 / (span as f64 + 1.0);
    Some(
        rest.iter()
            .fold(*first, |acc, p| alpha * p + (1.0 - alpha) * acc),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_of_constant_is_constant() {
        assert_eq!(ema(&[5.0; 30], 12), Some(5.0));
        assert_eq!(ema(&[], 12), None);
    }

    #[test]
    fn ema_matches_hand_computation() {
        // span 3 → alpha 0.5: 1 → 1.5 → 2.25
        let v = ema(&[1.0, 2.0, 3.0], 3).unwrap();
        assert!((v - 2.25).abs() < 1e-12);
    }

    #[test]
    fn short_history_defaults_to_no_hedge() {
        let falling = PriceSeries::from_prices((0..24).map(|i| 100.0 - i as f64));
        assert_eq!(TrendClassifier::default().classify(&falling), HedgeSignal::NoHedge);
        assert!(TrendClassifier::default().evaluate(&falling).is_none());
    }

    #[test]
    fn downtrend_hedges() {
        let falling = PriceSeries::from_prices((0..60).map(|i| 2_000.0 - 10.0 * i as f64));
        let reading = TrendClassifier::default().evaluate(&falling).unwrap();
        assert!(reading.short_ema < reading.long_ema);
        assert_eq!(reading.signal, HedgeSignal::Hedge);
    }

    #[test]
    fn uptrend_does_not_hedge() {
        let rising = PriceSeries::from_prices((0..60).map(|i| 1_000.0 + 5.0 * i as f64));
        assert_eq!(TrendClassifier::default().classify(&rising), HedgeSignal::NoHedge);
    }

    #[test]
    fn flat_market_does_not_hedge() {
        let flat = PriceSeries::from_prices(vec![1_500.0; 40]);
        assert_eq!(TrendClassifier::default().classify(&flat), HedgeSignal::NoHedge);
    }
}
