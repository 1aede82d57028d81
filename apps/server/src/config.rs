use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use folio_market_data::BreakerConfig;

/// Yahoo Finance headline feed, used when `FOLIO_NEWS_FEEDS` is unset.
pub const DEFAULT_NEWS_FEED: &str =
    "https://feeds.finance.yahoo.com/rss/2.0/headline?s={symbol}&region=US&lang=en-US";

pub struct Config {
    pub listen_addr: SocketAddr,
    pub cors_allow: Vec<String>,
    pub request_timeout: Duration,
    pub finnhub_api_key: Option<String>,
    pub alpha_vantage_api_key: Option<String>,
    pub metal_price_api_key: Option<String>,
    /// Feed URL templates; `{symbol}` is replaced per request.
    pub news_feeds: Vec<String>,
    pub breaker: BreakerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            cors_allow: vec!["*".to_string()],
            request_timeout: Duration::from_secs(45),
            finnhub_api_key: None,
            alpha_vantage_api_key: None,
            metal_price_api_key: None,
            news_feeds: vec![DEFAULT_NEWS_FEED.to_string()],
            breaker: BreakerConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let listen_addr = match std::env::var("FOLIO_LISTEN_ADDR") {
            Ok(addr) => addr
                .parse()
                .with_context(|| format!("Invalid FOLIO_LISTEN_ADDR '{}'", addr))?,
            Err(_) => defaults.listen_addr,
        };
        let cors_allow = std::env::var("FOLIO_CORS_ALLOW_ORIGINS")
            .map(|v| split_list(&v))
            .unwrap_or(defaults.cors_allow);
        let request_timeout = env_u64("FOLIO_REQUEST_TIMEOUT_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.request_timeout);
        let news_feeds = std::env::var("FOLIO_NEWS_FEEDS")
            .map(|v| split_list(&v))
            .unwrap_or(defaults.news_feeds);

        let breaker = BreakerConfig {
            failure_threshold: env_u64("FOLIO_BREAKER_THRESHOLD")
                .map(|n| n.clamp(1, u32::MAX as u64) as u32)
                .unwrap_or(defaults.breaker.failure_threshold),
            failure_window: env_u64("FOLIO_BREAKER_WINDOW_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.breaker.failure_window),
            cooldown: env_u64("FOLIO_BREAKER_COOLDOWN_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.breaker.cooldown),
        };

        Ok(Self {
            listen_addr,
            cors_allow,
            request_timeout,
            finnhub_api_key: env_secret("FINNHUB_API_KEY"),
            alpha_vantage_api_key: env_secret("ALPHA_VANTAGE_API_KEY"),
            metal_price_api_key: env_secret("METAL_PRICE_API_KEY"),
            news_feeds,
            breaker,
        })
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Unparseable numbers fall back to the default, like an unset variable.
fn env_u64(key: &str) -> Option<u64> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!("Ignoring invalid {}='{}'", key, raw);
            None
        }
    }
}

fn env_secret(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
