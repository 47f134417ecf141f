use serde::{Deserialize, Serialize};

use crate::error::ForecastError;
use crate::tick;

/// One observation from the price feed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub ts_ms: u64,
    pub price: f64,
}

/// Chronological price history.
///
/// Duplicate timestamps are tolerated; consumers enforce their own minimum
/// length (100 for range forecasting, 25 for trend classification).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(points: Vec<PricePoint>) -> Self {
        Self { points }
    }

    /// Builds a series from bare prices, stamping them one day apart.
    pub fn from_prices(prices: impl IntoIterator<Item = f64>) -> Self {
        const DAY_MS: u64 = 86_400_000;
        let points = prices
            .into_iter()
            .enumerate()
            .map(|(i, price)| PricePoint {
                ts_ms: i as u64 * DAY_MS,
                price,
            })
            .collect();
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn prices(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.price).collect()
    }

    pub fn latest(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    /// Sub-series over `[start, end)`.
    pub fn slice(&self, start: usize, end: usize) -> PriceSeries {
        Self {
            points: self.points[start..end].to_vec(),
        }
    }

    /// Rejects non-finite or non-positive prices (log returns are undefined for them).
    pub fn validate(&self) -> Result<(), ForecastError> {
        match self
            .points
            .iter()
            .enumerate()
            .find(|(_, p)| !(p.price.is_finite() && p.price > 0.0))
        {
            Some((index, p)) => Err(ForecastError::InvalidPrice {
                index,
                price: p.price,
            }),
            None => Ok(()),
        }
    }
}

/// Logarithmic price range in ledger tick units (base 1.0001).
///
/// Both bounds are multiples of the pool's tick spacing and `lower < upper`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TickRange {
    pub lower: i32,
    pub upper: i32,
}

impl TickRange {
    pub fn new(lower: i32, upper: i32) -> Self {
        Self { lower, upper }
    }

    pub fn width(&self) -> i32 {
        self.upper - self.lower
    }

    pub fn lower_price(&self) -> f64 {
        tick::tick_to_price(self.lower)
    }

    pub fn upper_price(&self) -> f64 {
        tick::tick_to_price(self.upper)
    }

    /// Inclusive price containment check.
    pub fn contains_price(&self, price: f64) -> bool {
        self.lower_price() <= price && price <= self.upper_price()
    }
}

impl std::fmt::Display for TickRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.lower, self.upper)
    }
}

/// Directional hedge decision from the trend classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HedgeSignal {
    /// Uptrend or not enough data: stay long.
    #[default]
    NoHedge,
    /// Downtrend: neutralize delta.
    Hedge,
}

impl HedgeSignal {
    pub fn ratio(self) -> f64 {
        match self {
            HedgeSignal::NoHedge => 0.0,
            HedgeSignal::Hedge => 1.0,
        }
    }
}

impl From<HedgeSignal> for f64 {
    fn from(signal: HedgeSignal) -> f64 {
        signal.ratio()
    }
}
