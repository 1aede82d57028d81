//! Finnhub provider implementation.
//!
//! This module provides data from the Finnhub API:
//! - Latest equity quotes via the /quote endpoint
//! - Company news via the /company-news endpoint
//!
//! Finnhub free tier is limited to 60 API calls per minute. When the limit
//! is hit it answers 429, or 200/403 with `{"error": "API limit reached..."}`.
//! API documentation: https://finnhub.io/docs/api

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Url;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::errors::ProviderFailure;
use crate::models::{NewsArticle, Quote};
use crate::provider::{HttpFetcher, ProviderAdapter, RequestContext};

const BASE_URL: &str = "https://finnhub.io/api/v1";
const PROVIDER_ID: &str = "FINNHUB";
const NEWS_PROVIDER_ID: &str = "FINNHUB_NEWS";

/// Default number of days of news to request.
const DEFAULT_NEWS_LOOKBACK_DAYS: u32 = 7;

/// Longest news lookback accepted; longer windows are clamped.
pub const MAX_NEWS_LOOKBACK_DAYS: u32 = 365;

// ============================================================================
// API Response Structures
// ============================================================================

/// Response from /quote endpoint
#[derive(Debug, Deserialize)]
struct QuoteResponse {
    /// Current price
    c: Option<f64>,
    /// High price of the day
    h: Option<f64>,
    /// Low price of the day
    l: Option<f64>,
    /// Open price of the day
    o: Option<f64>,
    /// Previous close price
    pc: Option<f64>,
    /// Timestamp (Unix)
    t: Option<i64>,
}

/// Item from /company-news endpoint
#[derive(Debug, Deserialize)]
struct NewsItem {
    headline: Option<String>,
    url: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    source: Option<String>,
    /// Unix timestamp
    #[serde(default)]
    datetime: Option<i64>,
}

// ============================================================================
// Shared client
// ============================================================================

/// Credentials and base URL shared by the Finnhub adapters.
#[derive(Clone)]
pub struct FinnhubClient {
    http: HttpFetcher,
    api_key: Option<String>,
    base_url: String,
}

// Keeps the key out of debug output
impl std::fmt::Debug for FinnhubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinnhubClient")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl FinnhubClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            http: HttpFetcher::new(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: BASE_URL.to_string(),
        }
    }

    /// Point the client at another host (used for tests and proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// GET an endpoint with the token passed as a query parameter.
    async fn get(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<Value, ProviderFailure> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ProviderFailure::MissingCredentials)?;

        let mut all_params: Vec<(&str, &str)> = params.to_vec();
        all_params.push(("token", api_key));

        let url = Url::parse_with_params(&format!("{}{}", self.base_url, endpoint), &all_params)
            .map_err(|e| ProviderFailure::Transport(format!("Failed to build URL: {}", e)))?;

        let body = self.http.get_json(url, timeout).await?;
        check_api_error(&body)?;
        Ok(body)
    }
}

/// Finnhub reports some failures as `{"error": "..."}` with a 2xx status.
fn check_api_error(body: &Value) -> Result<(), ProviderFailure> {
    match body.get("error").and_then(Value::as_str) {
        Some(message) => Err(ProviderFailure::Notice(message.to_string())),
        None => Ok(()),
    }
}

fn to_decimal(value: Option<f64>) -> Option<Decimal> {
    value.and_then(|v| Decimal::try_from(v).ok())
}

fn parse_quote(symbol: &str, body: Value) -> Result<Quote, ProviderFailure> {
    let response: QuoteResponse = serde_json::from_value(body)
        .map_err(|e| ProviderFailure::Decode(format!("Failed to parse quote response: {}", e)))?;

    let price = response
        .c
        .ok_or_else(|| ProviderFailure::MissingField("c".to_string()))?;

    // Finnhub returns zeros for unknown symbols instead of an error
    if price == 0.0 && response.o.unwrap_or(0.0) == 0.0 {
        return Err(ProviderFailure::MissingField(format!(
            "c (no trading data for {})",
            symbol
        )));
    }

    let timestamp = response
        .t
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
        .unwrap_or_else(Utc::now);

    let price = Decimal::try_from(price)
        .map_err(|_| ProviderFailure::Decode(format!("Invalid price: {}", price)))?;

    let mut quote = Quote::new(symbol.to_string(), timestamp, price, PROVIDER_ID.to_string());
    quote.open = to_decimal(response.o);
    quote.high = to_decimal(response.h);
    quote.low = to_decimal(response.l);
    quote.previous_close = to_decimal(response.pc);
    Ok(quote)
}

fn parse_news(body: Value) -> Result<Vec<NewsArticle>, ProviderFailure> {
    let items: Vec<NewsItem> = serde_json::from_value(body)
        .map_err(|e| ProviderFailure::Decode(format!("Failed to parse news response: {}", e)))?;

    Ok(items
        .into_iter()
        .filter_map(|item| {
            let title = item.headline.filter(|h| !h.trim().is_empty())?;
            let url = item.url.filter(|u| !u.trim().is_empty())?;
            Some(NewsArticle {
                title,
                url,
                summary: item.summary.filter(|s| !s.trim().is_empty()),
                source: item.source.unwrap_or_else(|| "Finnhub".to_string()),
                published_at: item
                    .datetime
                    .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
            })
        })
        .collect())
}

// ============================================================================
// Adapters
// ============================================================================

/// Latest quotes from Finnhub.
pub struct FinnhubQuoteProvider {
    client: FinnhubClient,
}

impl FinnhubQuoteProvider {
    pub fn new(client: FinnhubClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProviderAdapter<Quote> for FinnhubQuoteProvider {
    fn name(&self) -> &str {
        PROVIDER_ID
    }

    fn priority(&self) -> u8 {
        1
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    async fn fetch(
        &self,
        key: &str,
        _ctx: &RequestContext,
        timeout: Duration,
    ) -> Result<Quote, ProviderFailure> {
        let symbol = key.trim().to_uppercase();
        let body = self
            .client
            .get("/quote", &[("symbol", symbol.as_str())], timeout)
            .await?;
        parse_quote(&symbol, body)
    }
}

/// Company news from Finnhub.
///
/// Honors a `news_days` context parameter for the lookback window.
pub struct FinnhubNewsProvider {
    client: FinnhubClient,
}

impl FinnhubNewsProvider {
    pub fn new(client: FinnhubClient) -> Self {
        Self { client }
    }

    fn window(ctx: &RequestContext, now: DateTime<Utc>) -> (String, String) {
        let days = ctx
            .param("news_days")
            .and_then(|d| d.parse::<u32>().ok())
            .filter(|d| *d > 0)
            .unwrap_or(DEFAULT_NEWS_LOOKBACK_DAYS)
            .min(MAX_NEWS_LOOKBACK_DAYS);
        let from = now - chrono::Duration::days(i64::from(days));
        (
            from.format("%Y-%m-%d").to_string(),
            now.format("%Y-%m-%d").to_string(),
        )
    }
}

#[async_trait]
impl ProviderAdapter<Vec<NewsArticle>> for FinnhubNewsProvider {
    fn name(&self) -> &str {
        NEWS_PROVIDER_ID
    }

    fn priority(&self) -> u8 {
        1
    }

    async fn fetch(
        &self,
        key: &str,
        ctx: &RequestContext,
        timeout: Duration,
    ) -> Result<Vec<NewsArticle>, ProviderFailure> {
        let symbol = key.trim().to_uppercase();
        let (from, to) = Self::window(ctx, Utc::now());
        let body = self
            .client
            .get(
                "/company-news",
                &[
                    ("symbol", symbol.as_str()),
                    ("from", from.as_str()),
                    ("to", to.as_str()),
                ],
                timeout,
            )
            .await?;
        parse_news(body)
    }
}
