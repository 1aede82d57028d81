//! Metal Price API provider for precious metal spot prices.
//!
//! It supports the following metals:
//! - XAU (Gold)
//! - XAG (Silver)
//! - XPT (Platinum)
//! - XPD (Palladium)
//! - XRH (Rhodium)
//! - XRU (Ruthenium)
//! - XIR (Iridium)
//! - XOS (Osmium)
//!
//! The API quotes "1 base currency = rate troy ounces", so the price per
//! ounce is the reciprocal of the returned rate.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Url;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::errors::ProviderFailure;
use crate::models::CommodityPrice;
use crate::provider::{HttpFetcher, ProviderAdapter, RequestContext};

const BASE_URL: &str = "https://api.metalpriceapi.com/v1";
const PROVIDER_ID: &str = "METAL_PRICE_API";

/// Supported metal symbols
const SUPPORTED_METALS: &[&str] = &["XAU", "XAG", "XPT", "XPD", "XRH", "XRU", "XIR", "XOS"];

const DEFAULT_QUOTE_CURRENCY: &str = "USD";

/// API response from Metal Price API
#[derive(Debug, Deserialize)]
struct MetalPriceResponse {
    success: bool,
    /// Unix timestamp of the quote
    #[serde(default)]
    timestamp: Option<i64>,
    /// Rates for requested metals (1 base_currency = rate troy ounces)
    #[serde(default)]
    rates: HashMap<String, f64>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    info: Option<String>,
}

/// Metal Price API provider.
///
/// Keys are metal codes, optionally suffixed with a quote currency
/// (`XAU` or `XAU:EUR`).
///
/// # Example
///
/// ```ignore
/// use folio_market_data::provider::metal_price_api::MetalPriceProvider;
///
/// let provider = MetalPriceProvider::new(Some("your_api_key".to_string()));
/// ```
#[derive(Clone)]
pub struct MetalPriceProvider {
    http: HttpFetcher,
    api_key: Option<String>,
    base_url: String,
}

// Keeps the key out of debug output
impl std::fmt::Debug for MetalPriceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetalPriceProvider")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl MetalPriceProvider {
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

    /// Check if the given symbol is a supported metal.
    fn is_supported_metal(symbol: &str) -> bool {
        SUPPORTED_METALS.contains(&symbol)
    }

    /// Whether `key` (`XAU` or `XAU:EUR`) names a metal this provider quotes.
    pub fn supports(key: &str) -> bool {
        let (symbol, _) = parse_key(key);
        Self::is_supported_metal(&symbol)
    }
}

/// Split `XAU:EUR` into metal and quote currency.
fn parse_key(key: &str) -> (String, String) {
    let mut parts = key.trim().splitn(2, ':');
    let symbol = parts.next().unwrap_or_default().trim().to_uppercase();
    let currency = parts
        .next()
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| DEFAULT_QUOTE_CURRENCY.to_string());
    (symbol, currency)
}

fn parse_price(symbol: &str, currency: &str, body: Value) -> Result<CommodityPrice, ProviderFailure> {
    let response: MetalPriceResponse = serde_json::from_value(body)
        .map_err(|e| ProviderFailure::Decode(format!("Failed to parse metal price response: {}", e)))?;

    if !response.success {
        let (code, info) = response
            .error
            .map(|e| (e.code, e.info.unwrap_or_default()))
            .unwrap_or((None, String::new()));
        return Err(match code {
            // 101: missing key, 102: inactive account
            Some(101) | Some(102) => ProviderFailure::InvalidCredentials(info),
            Some(104) => ProviderFailure::Notice(format!("usage limit reached: {}", info)),
            _ => ProviderFailure::Notice(format!("API request failed: {}", info)),
        });
    }

    let rate = *response
        .rates
        .get(symbol)
        .ok_or_else(|| ProviderFailure::MissingField(format!("rates.{}", symbol)))?;

    if rate <= 0.0 {
        return Err(ProviderFailure::Decode(format!("Invalid rate: {}", rate)));
    }

    let price = Decimal::try_from(1.0 / rate)
        .map_err(|_| ProviderFailure::Decode("Failed to convert rate to decimal".to_string()))?
        .round_dp(4);

    let timestamp = response
        .timestamp
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
        .unwrap_or_else(Utc::now);

    Ok(CommodityPrice {
        symbol: symbol.to_string(),
        price,
        unit: "troy_ounce".to_string(),
        currency: currency.to_string(),
        timestamp,
        source: PROVIDER_ID.to_string(),
    })
}

#[async_trait]
impl ProviderAdapter<CommodityPrice> for MetalPriceProvider {
    fn name(&self) -> &str {
        PROVIDER_ID
    }

    fn priority(&self) -> u8 {
        4
    }

    async fn fetch(
        &self,
        key: &str,
        _ctx: &RequestContext,
        timeout: Duration,
    ) -> Result<CommodityPrice, ProviderFailure> {
        let (symbol, currency) = parse_key(key);

        if !Self::is_supported_metal(&symbol) {
            return Err(ProviderFailure::MissingField(format!(
                "unsupported metal {}",
                symbol
            )));
        }

        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ProviderFailure::MissingCredentials)?;

        let url = Url::parse_with_params(
            &format!("{}/latest", self.base_url),
            &[
                ("api_key", api_key),
                ("base", currency.as_str()),
                ("currencies", symbol.as_str()),
            ],
        )
        .map_err(|e| ProviderFailure::Transport(format!("Failed to build URL: {}", e)))?;

        let body = self.http.get_json(url, timeout).await?;
        parse_price(&symbol, &currency, body)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;
    use crate::errors::{classify, ErrorKind};

    #[test]
    fn test_parse_key() {
        assert_eq!(parse_key("xau"), ("XAU".to_string(), "USD".to_string()));
        assert_eq!(parse_key("XAG:eur"), ("XAG".to_string(), "EUR".to_string()));
        assert_eq!(parse_key("XPT:"), ("XPT".to_string(), "USD".to_string()));
    }

    #[test]
    fn test_price_is_reciprocal_of_rate() {
        let body = json!({
            "success": true,
            "base": "USD",
            "timestamp": 1704067200,
            "rates": {"XAU": 0.0005}
        });
        let price = parse_price("XAU", "USD", body).unwrap();
        assert_eq!(price.price, dec!(2000));
        assert_eq!(price.unit, "troy_ounce");
        assert_eq!(price.timestamp.timestamp(), 1704067200);
    }

    #[test]
    fn test_missing_rate() {
        let body = json!({"success": true, "rates": {}});
        assert!(matches!(
            parse_price("XAU", "USD", body),
            Err(ProviderFailure::MissingField(_))
        ));
    }

    #[test]
    fn test_usage_limit_is_rate_limit() {
        let body = json!({
            "success": false,
            "error": {"statusCode": 429, "code": 104, "info": "Monthly quota exhausted"}
        });
        let failure = parse_price("XAU", "USD", body).unwrap_err();
        assert_eq!(classify(PROVIDER_ID, &failure), ErrorKind::RateLimit);
    }

    #[test]
    fn test_invalid_key_is_auth_error() {
        let body = json!({"success": false, "error": {"code": 101, "info": "Invalid API key"}});
        let failure = parse_price("XAU", "USD", body).unwrap_err();
        assert_eq!(classify(PROVIDER_ID, &failure), ErrorKind::AuthError);
    }

    #[test]
    fn test_supports() {
        assert!(MetalPriceProvider::supports("xau"));
        assert!(MetalPriceProvider::supports("XAG:EUR"));
        assert!(!MetalPriceProvider::supports("GOLD"));
        assert!(!MetalPriceProvider::supports(":USD"));
    }

    #[tokio::test]
    async fn test_unsupported_metal_skips_request() {
        let provider = MetalPriceProvider::new(Some("key".to_string()));
        let outcome = provider
            .fetch("GOLD", &RequestContext::new(), Duration::from_secs(1))
            .await;
        assert!(matches!(outcome, Err(ProviderFailure::MissingField(_))));
    }
}
