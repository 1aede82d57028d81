use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::Request,
};
use chrono::{TimeZone, Utc};
use folio_market_data::{
    Fundamentals, ManualClock, NewsArticle, Orchestrator, OrchestratorConfig, ProviderAdapter,
    ProviderDescriptor, ProviderFailure, Quote, RequestContext,
};
use folio_server::{api::app_router, config::Config, providers::ProviderCatalog, AppState};
use rust_decimal::Decimal;
use tower::ServiceExt;

/// Quote provider that answers every symbol except `FAIL`.
struct StubQuotes {
    name: &'static str,
    failure: Option<fn() -> ProviderFailure>,
}

#[async_trait]
impl ProviderAdapter<Quote> for StubQuotes {
    fn name(&self) -> &str {
        self.name
    }

    async fn fetch(
        &self,
        key: &str,
        _ctx: &RequestContext,
        _timeout: Duration,
    ) -> Result<Quote, ProviderFailure> {
        if let Some(failure) = self.failure {
            return Err(failure());
        }
        if key == "FAIL" {
            return Err(ProviderFailure::Http {
                status: 500,
                body: "upstream exploded: internal trace id 1234".to_string(),
            });
        }
        Ok(Quote::new(
            key.to_string(),
            Utc.with_ymd_and_hms(2024, 3, 8, 21, 0, 0).unwrap(),
            Decimal::new(17250, 2),
            self.name.to_string(),
        ))
    }
}

struct StubNews {
    name: &'static str,
    urls: &'static [&'static str],
}

#[async_trait]
impl ProviderAdapter<Vec<NewsArticle>> for StubNews {
    fn name(&self) -> &str {
        self.name
    }

    async fn fetch(
        &self,
        _key: &str,
        ctx: &RequestContext,
        _timeout: Duration,
    ) -> Result<Vec<NewsArticle>, ProviderFailure> {
        let window = ctx.param("news_days").unwrap_or("default");
        Ok(self
            .urls
            .iter()
            .map(|url| NewsArticle {
                title: format!("{} story ({})", self.name, window),
                url: url.to_string(),
                summary: None,
                source: self.name.to_string(),
                published_at: None,
            })
            .collect())
    }
}

/// Fundamentals provider that can be switched off mid-test.
struct Overview {
    down: AtomicBool,
}

#[async_trait]
impl ProviderAdapter<Fundamentals> for Overview {
    fn name(&self) -> &str {
        "OVERVIEW"
    }

    async fn fetch(
        &self,
        key: &str,
        _ctx: &RequestContext,
        _timeout: Duration,
    ) -> Result<Fundamentals, ProviderFailure> {
        if self.down.load(Ordering::SeqCst) {
            return Err(ProviderFailure::Http {
                status: 502,
                body: "bad gateway".to_string(),
            });
        }
        Ok(Fundamentals {
            symbol: key.to_string(),
            source: "OVERVIEW".to_string(),
            name: Some("International Business Machines".to_string()),
            ..Fundamentals::default()
        })
    }
}

fn quotes(name: &'static str) -> ProviderDescriptor<Quote> {
    ProviderDescriptor::new(Arc::new(StubQuotes {
        name,
        failure: None,
    }))
}

fn failing_quotes(name: &'static str, failure: fn() -> ProviderFailure) -> ProviderDescriptor<Quote> {
    ProviderDescriptor::new(Arc::new(StubQuotes {
        name,
        failure: Some(failure),
    }))
}

fn rate_limited() -> ProviderFailure {
    ProviderFailure::Notice("Our standard API call frequency is 5 calls per minute".to_string())
}

fn app(catalog: ProviderCatalog) -> axum::Router {
    let orchestrator = Arc::new(Orchestrator::default());
    let state = Arc::new(AppState::new(orchestrator, catalog));
    app_router(state, &Config::default())
}

async fn get(app: &axum::Router, uri: &str) -> (u16, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status().as_u16();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null))
}

#[tokio::test]
async fn healthz_works() {
    let app = app(ProviderCatalog::default());
    let response = app
        .oneshot(Request::builder().uri("/api/v1/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn quote_is_served_then_cached() {
    let app = app(ProviderCatalog {
        quotes: vec![quotes("STUB")],
        ..ProviderCatalog::default()
    });

    let (status, body) = get(&app, "/api/v1/market/quotes/aapl").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["symbol"], "AAPL");
    assert_eq!(body["source"], "STUB");
    assert_eq!(body["cached"], false);
    assert_eq!(body["degraded"], false);
    assert_eq!(body["ageMs"], 0);

    let (status, body) = get(&app, "/api/v1/market/quotes/AAPL").await;
    assert_eq!(status, 200);
    assert_eq!(body["source"], "cache");
    assert_eq!(body["cached"], true);

    let (_, body) = get(&app, "/api/v1/market/quotes/AAPL?refresh=true").await;
    assert_eq!(body["source"], "STUB");
}

#[tokio::test]
async fn fallback_is_reported_as_degraded() {
    let app = app(ProviderCatalog {
        quotes: vec![failing_quotes("LIMITED", rate_limited), quotes("BACKUP")],
        ..ProviderCatalog::default()
    });

    let (status, body) = get(&app, "/api/v1/market/quotes/MSFT").await;
    assert_eq!(status, 200);
    assert_eq!(body["source"], "BACKUP");
    assert_eq!(body["degraded"], true);
}

#[tokio::test]
async fn every_provider_rate_limited_is_429() {
    let app = app(ProviderCatalog {
        quotes: vec![failing_quotes("LIMITED", rate_limited)],
        ..ProviderCatalog::default()
    });

    let (status, body) = get(&app, "/api/v1/market/quotes/AAPL").await;
    assert_eq!(status, 429);
    assert_eq!(body, serde_json::json!({ "error": "rate_limited" }));
}

#[tokio::test]
async fn exhaustion_is_503_without_upstream_details() {
    let app = app(ProviderCatalog {
        quotes: vec![quotes("STUB")],
        ..ProviderCatalog::default()
    });

    let (status, body) = get(&app, "/api/v1/market/quotes/FAIL").await;
    assert_eq!(status, 503);
    assert_eq!(body, serde_json::json!({ "error": "unavailable" }));
    assert!(!body.to_string().contains("trace id"));
}

#[tokio::test]
async fn empty_chain_is_503() {
    let app = app(ProviderCatalog::default());
    let (status, _) = get(&app, "/api/v1/market/commodities/XAU").await;
    assert_eq!(status, 503);
}

#[tokio::test]
async fn unknown_tier_is_400() {
    let app = app(ProviderCatalog {
        quotes: vec![quotes("STUB")],
        ..ProviderCatalog::default()
    });

    let (status, body) = get(&app, "/api/v1/market/quotes/AAPL?tier=platinum").await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn batch_quotes_report_each_symbol() {
    let app = app(ProviderCatalog {
        quotes: vec![quotes("STUB")],
        ..ProviderCatalog::default()
    });

    let (status, body) = get(&app, "/api/v1/market/quotes?symbols=aapl,FAIL,msft&tier=pro").await;
    assert_eq!(status, 200);

    let items = body.as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[0]["symbol"], "AAPL");
    assert_eq!(items[0]["data"]["source"], "STUB");
    assert_eq!(items[1]["symbol"], "FAIL");
    assert_eq!(items[1]["error"], "unavailable");
    assert!(items[1].get("data").is_none());
    assert_eq!(items[2]["symbol"], "MSFT");

    let (status, _) = get(&app, "/api/v1/market/quotes?symbols=").await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn news_is_merged_and_deduplicated() {
    let app = app(ProviderCatalog {
        news: vec![
            ProviderDescriptor::new(Arc::new(StubNews {
                name: "API",
                urls: &["https://news.example.com/a", "https://news.example.com/b"],
            })),
            ProviderDescriptor::new(Arc::new(StubNews {
                name: "FEED",
                urls: &["https://NEWS.example.com/a", "https://news.example.com/c"],
            })),
        ],
        ..ProviderCatalog::default()
    });

    let (status, body) = get(&app, "/api/v1/market/news/AAPL").await;
    assert_eq!(status, 200);
    assert_eq!(body["source"], "API");

    let articles = body["data"].as_array().unwrap();
    assert_eq!(articles.len(), 3);
    assert_eq!(articles[0]["source"], "API");
    assert_eq!(articles[2]["url"], "https://news.example.com/c");
}

#[tokio::test]
async fn stats_reflect_traffic() {
    let app = app(ProviderCatalog {
        quotes: vec![failing_quotes("LIMITED", rate_limited), quotes("BACKUP")],
        ..ProviderCatalog::default()
    });

    get(&app, "/api/v1/market/quotes/AAPL").await;
    get(&app, "/api/v1/market/quotes/AAPL").await;

    let (status, body) = get(&app, "/api/v1/market/stats").await;
    assert_eq!(status, 200);
    assert_eq!(body["totalCalls"], 2);
    assert_eq!(body["cacheHits"], 1);

    let providers = body["providers"].as_array().unwrap();
    let limited = providers
        .iter()
        .find(|p| p["provider"] == "LIMITED")
        .unwrap();
    assert_eq!(limited["failures"], 1);
    assert_eq!(limited["failuresByKind"]["RATE_LIMIT"], 1);
}

#[tokio::test]
async fn stale_fundamentals_are_served_when_every_provider_fails() {
    let clock = Arc::new(ManualClock::new());
    let orchestrator = Arc::new(Orchestrator::with_clock(
        OrchestratorConfig::default(),
        clock.clone(),
    ));
    let overview = Arc::new(Overview {
        down: AtomicBool::new(false),
    });
    let catalog = ProviderCatalog {
        fundamentals: vec![ProviderDescriptor::new(overview.clone())],
        ..ProviderCatalog::default()
    };
    let app = app_router(
        Arc::new(AppState::new(orchestrator, catalog)),
        &Config::default(),
    );

    let (status, body) = get(&app, "/api/v1/market/fundamentals/ibm").await;
    assert_eq!(status, 200);
    assert_eq!(body["source"], "OVERVIEW");

    overview.down.store(true, Ordering::SeqCst);
    clock.advance(Duration::from_secs(3 * 24 * 60 * 60));

    let (status, body) = get(&app, "/api/v1/market/fundamentals/IBM").await;
    assert_eq!(status, 200);
    assert_eq!(body["source"], "stale-cache");
    assert_eq!(body["cached"], false);
    assert_eq!(body["degraded"], true);
    assert_eq!(body["ageMs"], 3 * 24 * 60 * 60 * 1000u64);
    assert_eq!(body["data"]["name"], "International Business Machines");
    assert!(!body.to_string().contains("bad gateway"));
}

#[tokio::test]
async fn news_days_selects_its_own_window() {
    let app = app(ProviderCatalog {
        news: vec![ProviderDescriptor::new(Arc::new(StubNews {
            name: "API",
            urls: &["https://news.example.com/a"],
        }))],
        ..ProviderCatalog::default()
    });

    let (status, body) = get(&app, "/api/v1/market/news/AAPL?days=3").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"][0]["title"], "API story (3)");

    // The default window is cached separately
    let (status, body) = get(&app, "/api/v1/market/news/AAPL").await;
    assert_eq!(status, 200);
    assert_eq!(body["cached"], false);
    assert_eq!(body["data"][0]["title"], "API story (default)");

    let (_, body) = get(&app, "/api/v1/market/news/AAPL?days=3").await;
    assert_eq!(body["cached"], true);
}

#[tokio::test]
async fn out_of_range_news_days_is_400() {
    let app = app(ProviderCatalog {
        news: vec![ProviderDescriptor::new(Arc::new(StubNews {
            name: "API",
            urls: &["https://news.example.com/a"],
        }))],
        ..ProviderCatalog::default()
    });

    for days in ["0", "366", "100000000"] {
        let (status, body) = get(&app, &format!("/api/v1/market/news/AAPL?days={}", days)).await;
        assert_eq!(status, 400, "days={}", days);
        assert_eq!(body["error"], "bad_request");
    }
}

#[tokio::test]
async fn unsupported_commodity_is_400() {
    let app = app(ProviderCatalog::default());

    let (status, body) = get(&app, "/api/v1/market/commodities/GOLD").await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "bad_request");

    let (status, _) = get(&app, "/api/v1/market/commodities/xau:eur").await;
    assert_eq!(status, 503);
}
