//! Market price and candle feed
//!
//! Advisory data only: the engine logs and skips feed errors, it never lets
//! them halt a cycle. Transient HTTP failures are retried briefly; anything
//! else surfaces as `Error::Feed`.

use async_trait::async_trait;
use backoff::ExponentialBackoff;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::FeedConfig;
use crate::error::{Error, Result};

/// One OHLCV candle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub unix_time: i64,
}

/// Price and candle source, mockable in tests.
#[async_trait]
pub trait MarketFeed: Send + Sync {
    async fn get_price(&self, token: &str) -> Result<f64>;

    /// Recent candles, oldest first.
    async fn get_candles(&self, token: &str, interval: &str, limit: usize) -> Result<Vec<Candle>>;
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    data: Option<PriceData>,
}

#[derive(Debug, Deserialize)]
struct PriceData {
    value: f64,
}

#[derive(Debug, Deserialize)]
struct CandlesResponse {
    data: Option<CandleData>,
}

#[derive(Debug, Deserialize)]
struct CandleData {
    items: Vec<CandleItem>,
}

#[derive(Debug, Deserialize)]
struct CandleItem {
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
    #[serde(rename = "unixTime")]
    unix_time: i64,
}

/// Birdeye-compatible HTTP feed client
pub struct HttpMarketFeed {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpMarketFeed {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Short retry window for transient failures; a feed miss only costs one
    /// cycle, so there is no point retrying for long.
    fn retry_policy() -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(200),
            max_interval: Duration::from_millis(800),
            max_elapsed_time: Some(Duration::from_secs(2)),
            ..Default::default()
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);

        backoff::future::retry(Self::retry_policy(), || async {
            let response = self
                .client
                .get(&url)
                .header("X-API-KEY", &self.api_key)
                .query(query)
                .send()
                .await
                .map_err(|e| {
                    backoff::Error::transient(Error::Feed(format!("HTTP request failed: {}", e)))
                })?;

            if response.status().is_server_error() {
                return Err(backoff::Error::transient(Error::Feed(format!(
                    "server error: {}",
                    response.status()
                ))));
            }

            response.json::<T>().await.map_err(|e| {
                backoff::Error::permanent(Error::Feed(format!("Failed to parse response: {}", e)))
            })
        })
        .await
    }
}

#[async_trait]
impl MarketFeed for HttpMarketFeed {
    async fn get_price(&self, token: &str) -> Result<f64> {
        let response: PriceResponse = self
            .get_json("/defi/price", &[("address", token.to_string())])
            .await?;

        debug!(token, "price fetched");

        response
            .data
            .map(|d| d.value)
            .ok_or_else(|| Error::Feed(format!("no price for {}", token)))
    }

    async fn get_candles(&self, token: &str, interval: &str, limit: usize) -> Result<Vec<Candle>> {
        let response: CandlesResponse = self
            .get_json(
                "/defi/ohlcv",
                &[
                    ("address", token.to_string()),
                    ("type", interval.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        let items = response
            .data
            .map(|d| d.items)
            .ok_or_else(|| Error::Feed(format!("no candles for {}", token)))?;

        Ok(items
            .into_iter()
            .map(|item| Candle {
                open: item.o,
                high: item.h,
                low: item.l,
                close: item.c,
                volume: item.v,
                unix_time: item.unix_time,
            })
            .collect())
    }
}
