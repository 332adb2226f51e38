//! Reference Price Feeds
//!
//! Native asset price in USD, used to turn gas costs into fiat.

use eyre::{eyre, Result};
use rand::Rng;
use reqwest::Client;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::trace;

use crate::config::{Config, PriceFeedKind};

/// Timeout for API calls
const API_TIMEOUT_SECS: u64 = 5;

/// Range of the demo feed
const MOCK_PRICE_MIN: f64 = 2000.0;
const MOCK_PRICE_MAX: f64 = 2500.0;

/// Source of the reference price
pub trait ReferencePriceFeed: Send + Sync + 'static {
    /// Current price of the native asset in USD
    fn fetch(&self) -> impl Future<Output = Result<f64>> + Send;
}

// ============================================
// COINGECKO
// ============================================

/// Price from CoinGecko's `simple/price` endpoint
#[derive(Debug, Clone)]
pub struct CoinGeckoPriceFeed {
    http_client: Client,
    api_url: String,
    asset_id: String,
}

impl CoinGeckoPriceFeed {
    pub fn new(api_url: impl Into<String>, asset_id: impl Into<String>) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .build()?;

        Ok(Self { http_client, api_url: api_url.into(), asset_id: asset_id.into() })
    }

    fn url(&self) -> String {
        format!(
            "{}/simple/price?ids={}&vs_currencies=usd",
            self.api_url.trim_end_matches('/'),
            self.asset_id
        )
    }

    fn parse_price(&self, body: &Value) -> Result<f64> {
        body.get(&self.asset_id)
            .and_then(|v| v.get("usd"))
            .and_then(|v| v.as_f64())
            .ok_or_else(|| eyre!("No USD price for {} in response", self.asset_id))
    }
}

impl ReferencePriceFeed for CoinGeckoPriceFeed {
    async fn fetch(&self) -> Result<f64> {
        let body: Value = self
            .http_client
            .get(self.url())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        trace!(response = ?body, "price response");

        self.parse_price(&body)
    }
}

// ============================================
// MOCK / FIXED
// ============================================

/// Demo feed: a fresh random price in [$2000, $2500) per call
#[derive(Debug, Clone, Copy, Default)]
pub struct MockPriceFeed;

impl ReferencePriceFeed for MockPriceFeed {
    async fn fetch(&self) -> Result<f64> {
        Ok(rand::thread_rng().gen_range(MOCK_PRICE_MIN..MOCK_PRICE_MAX))
    }
}

/// Always the same price
#[derive(Debug, Clone, Copy)]
pub struct FixedPriceFeed(pub f64);

impl ReferencePriceFeed for FixedPriceFeed {
    async fn fetch(&self) -> Result<f64> {
        Ok(self.0)
    }
}

// ============================================
// CONFIGURED FEED
// ============================================

/// The feed selected by configuration
#[derive(Debug, Clone)]
pub enum PriceFeed {
    CoinGecko(CoinGeckoPriceFeed),
    Mock(MockPriceFeed),
    Fixed(FixedPriceFeed),
}

impl PriceFeed {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(match config.price_feed {
            PriceFeedKind::CoinGecko => PriceFeed::CoinGecko(CoinGeckoPriceFeed::new(
                config.price_api_url.clone(),
                config.price_asset_id.clone(),
            )?),
            PriceFeedKind::Mock => PriceFeed::Mock(MockPriceFeed),
            PriceFeedKind::Fixed => PriceFeed::Fixed(FixedPriceFeed(config.fixed_price_usd)),
        })
    }
}

impl ReferencePriceFeed for PriceFeed {
    async fn fetch(&self) -> Result<f64> {
        match self {
            PriceFeed::CoinGecko(feed) => feed.fetch().await,
            PriceFeed::Mock(feed) => feed.fetch().await,
            PriceFeed::Fixed(feed) => feed.fetch().await,
        }
    }
}
