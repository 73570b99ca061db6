//! MEXC perpetual futures ticker source (venue A)

use super::{FeedError, PriceQuote, PriceSource, Venue};
use crate::symbol::Symbol;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

/// MEXC contract API base URL
pub const MEXC_CONTRACT_API_URL: &str = "https://contract.mexc.com";

/// Ticker response envelope
#[derive(Debug, Deserialize)]
struct TickerResponse {
    success: bool,
    #[serde(default)]
    data: Option<TickerData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerData {
    last_price: Option<Decimal>,
    /// Exchange time in milliseconds
    timestamp: Option<i64>,
}

/// Polls the last traded price of a USDT-margined perpetual
pub struct MexcSource {
    base_url: String,
    client: Client,
}

impl MexcSource {
    /// Create a source against the public MEXC endpoint
    pub fn new(timeout: Duration) -> Result<Self, FeedError> {
        Self::with_base_url(MEXC_CONTRACT_API_URL, timeout)
    }

    /// Create a source against a custom endpoint
    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FeedError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// `DIS/USDT` -> `DIS_USDT`
    fn contract_symbol(symbol: &Symbol) -> String {
        format!("{}_{}", symbol.base(), symbol.quote())
    }

    fn parse_ticker(symbol: &Symbol, body: &str) -> Result<PriceQuote, FeedError> {
        let response: TickerResponse =
            serde_json::from_str(body).map_err(|_| FeedError::NoPrice(symbol.clone()))?;
        if !response.success {
            return Err(FeedError::NoPrice(symbol.clone()));
        }
        let data = response.data.ok_or_else(|| FeedError::NoPrice(symbol.clone()))?;
        let price = data.last_price.ok_or_else(|| FeedError::NoPrice(symbol.clone()))?;
        let observed_at = data
            .timestamp
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now);

        PriceQuote::new(symbol.clone(), Venue::Cex, price, observed_at)
    }
}

#[async_trait]
impl PriceSource for MexcSource {
    fn venue(&self) -> Venue {
        Venue::Cex
    }

    async fn poll(&self, symbol: &Symbol) -> Result<PriceQuote, FeedError> {
        let url = format!("{}/api/v1/contract/ticker", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("symbol", Self::contract_symbol(symbol))])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::Status { status, body });
        }

        let body = response.text().await?;
        Self::parse_ticker(symbol, &body)
    }
}
