//! Alpha Vantage provider implementation.
//!
//! This module provides data from the Alpha Vantage API:
//! - Company fundamentals via the OVERVIEW function
//! - Latest equity quotes via the GLOBAL_QUOTE function
//!
//! Alpha Vantage rarely uses HTTP status codes for application errors. Rate
//! limits and bad keys arrive as a 200 with a "Note", "Information" or
//! "Error Message" field, which is surfaced here as a notice and classified
//! by its wording.
//! API documentation: https://www.alphavantage.co/documentation/

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use log::{debug, warn};
use reqwest::Url;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::errors::ProviderFailure;
use crate::models::{Fundamentals, Quote};
use crate::provider::{HttpFetcher, ProviderAdapter, RequestContext};

const BASE_URL: &str = "https://www.alphavantage.co/query";
const PROVIDER_ID: &str = "ALPHA_VANTAGE";
const QUOTE_PROVIDER_ID: &str = "ALPHA_VANTAGE_QUOTE";

// ============================================================================
// API Response Structures
// ============================================================================

/// OVERVIEW response for company fundamentals.
/// Only includes the fields that map to `Fundamentals`.
#[derive(Debug, Deserialize)]
struct CompanyOverviewResponse {
    #[serde(rename = "Symbol")]
    symbol: Option<String>,
    #[serde(rename = "Name")]
    name: Option<String>,
    #[serde(rename = "Description")]
    description: Option<String>,
    #[serde(rename = "Exchange")]
    exchange: Option<String>,
    #[serde(rename = "Currency")]
    currency: Option<String>,
    #[serde(rename = "Country")]
    country: Option<String>,
    #[serde(rename = "Sector")]
    sector: Option<String>,
    #[serde(rename = "Industry")]
    industry: Option<String>,
    #[serde(rename = "MarketCapitalization")]
    market_capitalization: Option<String>,
    #[serde(rename = "PERatio")]
    pe_ratio: Option<String>,
    #[serde(rename = "EPS")]
    eps: Option<String>,
    #[serde(rename = "DividendYield")]
    dividend_yield: Option<String>,
    #[serde(rename = "Beta")]
    beta: Option<String>,
    #[serde(rename = "52WeekHigh")]
    week_52_high: Option<String>,
    #[serde(rename = "52WeekLow")]
    week_52_low: Option<String>,
}

/// GLOBAL_QUOTE response wrapper
#[derive(Debug, Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<GlobalQuote>,
}

#[derive(Debug, Deserialize)]
struct GlobalQuote {
    #[serde(rename = "01. symbol")]
    symbol: Option<String>,
    #[serde(rename = "02. open")]
    open: Option<String>,
    #[serde(rename = "03. high")]
    high: Option<String>,
    #[serde(rename = "04. low")]
    low: Option<String>,
    #[serde(rename = "05. price")]
    price: Option<String>,
    #[serde(rename = "06. volume")]
    volume: Option<String>,
    #[serde(rename = "07. latest trading day")]
    latest_trading_day: Option<String>,
    #[serde(rename = "08. previous close")]
    previous_close: Option<String>,
}

// ============================================================================
// Shared client
// ============================================================================

/// Credentials and base URL shared by the Alpha Vantage adapters.
#[derive(Clone)]
pub struct AlphaVantageClient {
    http: HttpFetcher,
    api_key: Option<String>,
    base_url: String,
}

// Keeps the key out of debug output
impl std::fmt::Debug for AlphaVantageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlphaVantageClient")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl AlphaVantageClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            http: HttpFetcher::new(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Call a query function and return the body once API-level errors
    /// have been ruled out.
    async fn query(
        &self,
        params: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<Value, ProviderFailure> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ProviderFailure::MissingCredentials)?;

        let mut all_params: Vec<(&str, &str)> = params.to_vec();
        all_params.push(("apikey", api_key));

        let url = Url::parse_with_params(&self.base_url, &all_params)
            .map_err(|e| ProviderFailure::Transport(format!("Failed to build URL: {}", e)))?;

        let body = self.http.get_json(url, timeout).await?;
        check_api_error(&body)?;
        Ok(body)
    }
}

/// Surface Alpha Vantage's in-body error fields.
///
/// "Error Message" is an invalid call (unknown symbol, bad function),
/// "Note" and "Information" usually carry rate limit or key messages.
fn check_api_error(body: &Value) -> Result<(), ProviderFailure> {
    if let Some(msg) = body.get("Error Message").and_then(Value::as_str) {
        return Err(ProviderFailure::Notice(msg.to_string()));
    }

    for field in ["Note", "Information"] {
        if let Some(msg) = body.get(field).and_then(Value::as_str) {
            warn!("Alpha Vantage {}: {}", field.to_lowercase(), msg);
            return Err(ProviderFailure::Notice(msg.to_string()));
        }
    }

    Ok(())
}

/// Parse Alpha Vantage's stringly-typed numbers. "None" and "-" mean absent.
fn parse_number(value: &Option<String>) -> Option<f64> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != "None" && *v != "-")
        .and_then(|v| v.parse::<f64>().ok())
}

fn parse_decimal(value: &Option<String>) -> Option<Decimal> {
    value
        .as_deref()
        .map(str::trim)
        .and_then(|v| v.parse::<Decimal>().ok())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty() && v != "None")
}

fn parse_overview(symbol: &str, body: Value) -> Result<Fundamentals, ProviderFailure> {
    let response: CompanyOverviewResponse = serde_json::from_value(body).map_err(|e| {
        ProviderFailure::Decode(format!("Failed to parse company overview response: {}", e))
    })?;

    // An unknown symbol yields an empty object
    let returned_symbol = non_empty(response.symbol.clone())
        .ok_or_else(|| ProviderFailure::MissingField("Symbol".to_string()))?;

    debug!("Alpha Vantage: fetched company overview for {}", symbol);

    Ok(Fundamentals {
        symbol: returned_symbol,
        source: PROVIDER_ID.to_string(),
        name: non_empty(response.name),
        description: non_empty(response.description),
        exchange: non_empty(response.exchange),
        currency: non_empty(response.currency),
        country: non_empty(response.country),
        sector: non_empty(response.sector),
        industry: non_empty(response.industry),
        market_cap: parse_number(&response.market_capitalization),
        pe_ratio: parse_number(&response.pe_ratio),
        eps: parse_number(&response.eps),
        dividend_yield: parse_number(&response.dividend_yield),
        beta: parse_number(&response.beta),
        week_52_high: parse_number(&response.week_52_high),
        week_52_low: parse_number(&response.week_52_low),
    })
}

fn parse_global_quote(symbol: &str, body: Value) -> Result<Quote, ProviderFailure> {
    let response: GlobalQuoteResponse = serde_json::from_value(body)
        .map_err(|e| ProviderFailure::Decode(format!("Failed to parse quote response: {}", e)))?;

    let quote = response
        .global_quote
        .ok_or_else(|| ProviderFailure::MissingField("Global Quote".to_string()))?;

    let price = parse_decimal(&quote.price)
        .ok_or_else(|| ProviderFailure::MissingField("05. price".to_string()))?;

    let timestamp = quote
        .latest_trading_day
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
        .unwrap_or_else(Utc::now);

    let mut result = Quote::new(
        non_empty(quote.symbol).unwrap_or_else(|| symbol.to_string()),
        timestamp,
        price,
        PROVIDER_ID.to_string(),
    );
    result.open = parse_decimal(&quote.open);
    result.high = parse_decimal(&quote.high);
    result.low = parse_decimal(&quote.low);
    result.previous_close = parse_decimal(&quote.previous_close);
    result.volume = parse_decimal(&quote.volume);
    Ok(result)
}

// ============================================================================
// Adapters
// ============================================================================

/// Company fundamentals from the OVERVIEW function.
pub struct AlphaVantageFundamentalsProvider {
    client: AlphaVantageClient,
}

impl AlphaVantageFundamentalsProvider {
    pub fn new(client: AlphaVantageClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProviderAdapter<Fundamentals> for AlphaVantageFundamentalsProvider {
    fn name(&self) -> &str {
        PROVIDER_ID
    }

    fn priority(&self) -> u8 {
        1
    }

    async fn fetch(
        &self,
        key: &str,
        _ctx: &RequestContext,
        timeout: Duration,
    ) -> Result<Fundamentals, ProviderFailure> {
        let symbol = key.trim().to_uppercase();
        let body = self
            .client
            .query(&[("function", "OVERVIEW"), ("symbol", &symbol)], timeout)
            .await?;
        parse_overview(&symbol, body)
    }
}

/// Latest quotes from the GLOBAL_QUOTE function. Usually configured as a
/// fallback behind a faster quote source.
pub struct AlphaVantageQuoteProvider {
    client: AlphaVantageClient,
}

impl AlphaVantageQuoteProvider {
    pub fn new(client: AlphaVantageClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProviderAdapter<Quote> for AlphaVantageQuoteProvider {
    fn name(&self) -> &str {
        QUOTE_PROVIDER_ID
    }

    fn priority(&self) -> u8 {
        2
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
            .query(&[("function", "GLOBAL_QUOTE"), ("symbol", &symbol)], timeout)
            .await?;
        parse_global_quote(&symbol, body)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;
    use crate::errors::{classify, ErrorKind};

    #[test]
    fn test_note_is_classified_as_rate_limit() {
        let body = json!({
            "Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute and 500 calls per day."
        });
        let failure = check_api_error(&body).unwrap_err();
        assert_eq!(classify(PROVIDER_ID, &failure), ErrorKind::RateLimit);
    }

    #[test]
    fn test_information_about_premium_limit() {
        let body = json!({
            "Information": "We have detected your API key as XYZ and our standard API rate limit is 25 requests per day."
        });
        let failure = check_api_error(&body).unwrap_err();
        assert_eq!(classify(PROVIDER_ID, &failure), ErrorKind::RateLimit);
    }

    #[test]
    fn test_error_message_is_not_a_rate_limit() {
        let body = json!({
            "Error Message": "Invalid API call. Please retry or visit the documentation for OVERVIEW."
        });
        let failure = check_api_error(&body).unwrap_err();
        assert_eq!(classify(PROVIDER_ID, &failure), ErrorKind::InvalidResponse);
    }

    #[test]
    fn test_overview_parsing() {
        let body = json!({
            "Symbol": "IBM",
            "AssetType": "Common Stock",
            "Name": "International Business Machines",
            "Exchange": "NYSE",
            "Currency": "USD",
            "Country": "USA",
            "Sector": "TECHNOLOGY",
            "Industry": "COMPUTER & OFFICE EQUIPMENT",
            "MarketCapitalization": "175000000000",
            "PERatio": "22.5",
            "EPS": "8.14",
            "DividendYield": "0.0365",
            "Beta": "None",
            "52WeekHigh": "199.18",
            "52WeekLow": "135.87"
        });

        let fundamentals = parse_overview("IBM", body).unwrap();
        assert_eq!(fundamentals.symbol, "IBM");
        assert_eq!(fundamentals.source, "ALPHA_VANTAGE");
        assert_eq!(fundamentals.exchange.as_deref(), Some("NYSE"));
        assert_eq!(fundamentals.pe_ratio, Some(22.5));
        assert_eq!(fundamentals.beta, None);
        assert_eq!(fundamentals.week_52_low, Some(135.87));
        assert_eq!(fundamentals.description, None);
    }

    #[test]
    fn test_empty_overview_is_missing_data() {
        assert!(matches!(
            parse_overview("NOPE", json!({})),
            Err(ProviderFailure::MissingField(field)) if field == "Symbol"
        ));
    }

    #[test]
    fn test_global_quote_parsing() {
        let body = json!({
            "Global Quote": {
                "01. symbol": "IBM",
                "02. open": "187.5000",
                "03. high": "189.1200",
                "04. low": "186.9000",
                "05. price": "188.2000",
                "06. volume": "3412876",
                "07. latest trading day": "2024-03-08",
                "08. previous close": "187.0000",
                "09. change": "1.2000",
                "10. change percent": "0.6417%"
            }
        });

        let quote = parse_global_quote("IBM", body).unwrap();
        assert_eq!(quote.price, dec!(188.2000));
        assert_eq!(quote.volume, Some(dec!(3412876)));
        assert_eq!(quote.change(), Some(dec!(1.2000)));
        assert_eq!(quote.timestamp.format("%Y-%m-%d").to_string(), "2024-03-08");
    }

    #[test]
    fn test_empty_global_quote_is_missing_price() {
        let body = json!({"Global Quote": {}});
        assert!(matches!(
            parse_global_quote("NOPE", body),
            Err(ProviderFailure::MissingField(_))
        ));
    }

    #[test]
    fn test_parse_number_handles_placeholders() {
        assert_eq!(parse_number(&Some("None".into())), None);
        assert_eq!(parse_number(&Some("-".into())), None);
        assert_eq!(parse_number(&Some(" 1.5 ".into())), Some(1.5));
        assert_eq!(parse_number(&None), None);
    }

    #[test]
    fn test_adapters_have_distinct_names() {
        let client = AlphaVantageClient::new(Some("key".to_string()));
        let fundamentals = AlphaVantageFundamentalsProvider::new(client.clone());
        let quotes = AlphaVantageQuoteProvider::new(client);
        assert_eq!(fundamentals.name(), "ALPHA_VANTAGE");
        assert_eq!(quotes.name(), "ALPHA_VANTAGE_QUOTE");
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_network() {
        let provider = AlphaVantageFundamentalsProvider::new(AlphaVantageClient::new(None));
        let outcome = provider
            .fetch("IBM", &RequestContext::new(), Duration::from_secs(1))
            .await;
        assert!(matches!(outcome, Err(ProviderFailure::MissingCredentials)));
    }
}
