use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{FeedError, PriceFeed};
use crate::types::{PricePoint, PriceSeries};

pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// `GET /coins/{id}/market_chart` envelope; each entry is `[ts_ms, price]`.
#[derive(Debug, Deserialize)]
pub struct MarketChart {
    pub prices: Vec<(f64, f64)>,
}

#[derive(Clone)]
pub struct CoinGeckoFeed {
    http: Client,
    base_url: String,
    asset_id: String,
    vs_currency: String,
}

impl CoinGeckoFeed {
    pub fn new(base_url: impl Into<String>, asset_id: impl Into<String>) -> Result<Self, FeedError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            asset_id: asset_id.into(),
            vs_currency: "usd".into(),
        })
    }

    pub fn chart_url(&self, lookback_days: u32) -> String {
        format!(
            "{}/coins/{}/market_chart?vs_currency={}&days={}&interval=daily",
            self.base_url, self.asset_id, self.vs_currency, lookback_days
        )
    }
}

/// Converts the feed envelope into a chronological series.
///
/// Entries are stably sorted by timestamp; non-finite entries are rejected.
pub fn series_from_chart(chart: MarketChart) -> Result<PriceSeries, FeedError> {
    if chart.prices.is_empty() {
        return Err(FeedError::Empty);
    }

    let mut points = Vec::with_capacity(chart.prices.len());
    for (ts, price) in chart.prices {
        if !(ts.is_finite() && ts >= 0.0 && price.is_finite()) {
            return Err(FeedError::InvalidResponse(format!(
                "bad entry [{ts}, {price}]"
            )));
        }
        points.push(PricePoint {
            ts_ms: ts as u64,
            price,
        });
    }
    points.sort_by_key(|p| p.ts_ms);

    Ok(PriceSeries::new(points))
}

#[async_trait]
impl PriceFeed for CoinGeckoFeed {
    #[instrument(skip(self), fields(asset = %self.asset_id), level = "debug")]
    async fn fetch_history(&self, lookback_days: u32) -> Result<PriceSeries, FeedError> {
        let url = self.chart_url(lookback_days);

        let resp = self.http.get(&url).send().await?.error_for_status()?;
        let chart: MarketChart = resp.json().await?;
        let series = series_from_chart(chart)?;

        debug!(points = series.len(), "price history fetched");

        Ok(series)
    }
}
