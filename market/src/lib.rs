//! Market-side analytics for the liquidity keeper.
//!
//! Data flow:
//! PriceFeed → PriceSeries → { RangeForecaster, TrendClassifier }
//!
//! Everything here is pure computation except `feed`, which talks HTTP.

pub mod backtest;
pub mod error;
pub mod feed;
pub mod range;
pub mod tick;
pub mod trend;
pub mod types;
pub mod volatility;

pub use error::ForecastError;
pub use range::{RangeForecast, RangeForecaster};
pub use trend::TrendClassifier;
pub use types::{HedgeSignal, PricePoint, PriceSeries, TickRange};
