pub mod coingecko;
pub mod errors;

pub use coingecko::CoinGeckoFeed;
pub use errors::FeedError;

use async_trait::async_trait;

use crate::types::PriceSeries;

/// Source of daily price history.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Chronological daily closes covering the last `lookback_days`.
    async fn fetch_history(&self, lookback_days: u32) -> Result<PriceSeries, FeedError>;
}
