//! DexScreener aggregator source (venue B)
//!
//! Searches pairs by base token and reports a robust price from the most
//! liquid stablecoin-quoted pairs.

use super::{FeedError, PriceQuote, PriceSource, Venue};
use crate::symbol::Symbol;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

/// DexScreener API base URL
pub const DEXSCREENER_API_URL: &str = "https://api.dexscreener.com";

/// Quote tokens accepted as USD proxies
const STABLE_QUOTES: [&str; 2] = ["USDT", "USDC"];

/// Number of top-scoring pairs used for the median
const TOP_PAIRS: usize = 3;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    pairs: Option<Vec<DexPair>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DexPair {
    base_token: Token,
    quote_token: Token,
    price_usd: Option<String>,
    #[serde(default)]
    liquidity: Option<Liquidity>,
    #[serde(default)]
    volume: Option<Volume>,
}

#[derive(Debug, Deserialize)]
struct Token {
    symbol: String,
}

#[derive(Debug, Deserialize)]
struct Liquidity {
    usd: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Volume {
    h24: Option<f64>,
}

/// Pair quality thresholds
#[derive(Debug, Clone)]
pub struct DexScreenerConfig {
    pub base_url: String,
    pub timeout: Duration,
    /// Pairs with less liquidity are ignored
    pub min_liquidity_usd: f64,
    /// Pairs with less 24h volume are ignored
    pub min_volume_usd: f64,
}

impl Default for DexScreenerConfig {
    fn default() -> Self {
        Self {
            base_url: DEXSCREENER_API_URL.to_string(),
            timeout: Duration::from_secs(10),
            min_liquidity_usd: 1000.0,
            min_volume_usd: 100.0,
        }
    }
}

/// Polls DexScreener search for each symbol's base token
pub struct DexScreenerSource {
    config: DexScreenerConfig,
    client: Client,
}

impl DexScreenerSource {
    pub fn new() -> Result<Self, FeedError> {
        Self::with_config(DexScreenerConfig::default())
    }

    pub fn with_config(config: DexScreenerConfig) -> Result<Self, FeedError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    /// Median price of the best pairs, or None when no pair qualifies
    fn select_price(&self, base: &str, pairs: &[DexPair]) -> Option<Decimal> {
        let mut scored: Vec<(f64, Decimal)> = pairs
            .iter()
            .filter(|p| p.base_token.symbol.eq_ignore_ascii_case(base))
            .filter(|p| {
                STABLE_QUOTES
                    .iter()
                    .any(|q| p.quote_token.symbol.eq_ignore_ascii_case(q))
            })
            .filter_map(|p| {
                let liquidity = p.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0);
                let volume = p.volume.as_ref().and_then(|v| v.h24).unwrap_or(0.0);
                if liquidity <= self.config.min_liquidity_usd || volume <= self.config.min_volume_usd {
                    return None;
                }
                let price = Decimal::from_str(p.price_usd.as_deref()?).ok()?;
                if price <= Decimal::ZERO {
                    return None;
                }
                Some((liquidity * 0.7 + volume * 0.3, price))
            })
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        let mut prices: Vec<Decimal> = scored.into_iter().take(TOP_PAIRS).map(|(_, p)| p).collect();
        prices.sort();

        match prices.len() {
            0 => None,
            2 => Some((prices[0] + prices[1]) / Decimal::TWO),
            n => Some(prices[n / 2]),
        }
    }

    fn parse_search(&self, symbol: &Symbol, body: &str) -> Result<PriceQuote, FeedError> {
        let response: SearchResponse =
            serde_json::from_str(body).map_err(|_| FeedError::NoPrice(symbol.clone()))?;
        let pairs = response.pairs.unwrap_or_default();
        let price = self
            .select_price(symbol.base(), &pairs)
            .ok_or_else(|| FeedError::NoPrice(symbol.clone()))?;

        PriceQuote::new(symbol.clone(), Venue::Dex, price, Utc::now())
    }
}

#[async_trait]
impl PriceSource for DexScreenerSource {
    fn venue(&self) -> Venue {
        Venue::Dex
    }

    async fn poll(&self, symbol: &Symbol) -> Result<PriceQuote, FeedError> {
        let url = format!(
            "{}/latest/dex/search",
            self.config.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .get(&url)
            .query(&[("q", symbol.base())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            if status == 429 {
                tracing::warn!(symbol = %symbol, "DexScreener rate limit hit");
            }
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::Status { status, body });
        }

        let body = response.text().await?;
        self.parse_search(symbol, &body)
    }
}
