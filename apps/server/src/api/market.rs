use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use folio_market_data::config::UnknownTier;
use folio_market_data::provider::finnhub::MAX_NEWS_LOOKBACK_DAYS;
use folio_market_data::{
    CommodityPrice, FetchRequest, FetchResult, Fundamentals, MergeRequest, MetalPriceProvider,
    NewsArticle, ProviderDescriptor, Quote, RequestContext, StatsSnapshot, Tier,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiError, ApiResult},
    main_lib::AppState,
};

/// Upper bound on symbols in one batch quote call.
const MAX_BATCH_SYMBOLS: usize = 50;

#[derive(Deserialize, Default)]
#[serde(default)]
struct MarketQuery {
    tier: Option<String>,
    refresh: bool,
    /// News lookback window.
    days: Option<u32>,
    /// Comma-separated list for batch quotes.
    symbols: String,
}

impl MarketQuery {
    fn tier(&self) -> ApiResult<Tier> {
        match &self.tier {
            None => Ok(Tier::default()),
            Some(raw) => raw
                .parse()
                .map_err(|e: UnknownTier| ApiError::BadRequest(e.to_string())),
        }
    }

    /// News lookback, when one was asked for.
    fn news_days(&self) -> ApiResult<Option<u32>> {
        match self.days {
            Some(days) if days == 0 || days > MAX_NEWS_LOOKBACK_DAYS => {
                Err(ApiError::BadRequest(format!(
                    "days must be between 1 and {}",
                    MAX_NEWS_LOOKBACK_DAYS
                )))
            }
            days => Ok(days),
        }
    }
}

/// Body of a successful market data response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketResponse<T> {
    pub data: T,
    pub source: String,
    pub cached: bool,
    pub age_ms: u64,
    /// Stale data, or some provider failed on the way.
    pub degraded: bool,
}

/// One symbol of a batch response. Failed symbols carry `error` instead of
/// `data`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem<T> {
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<MarketResponse<T>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

fn normalize_symbol(raw: &str) -> ApiResult<String> {
    let symbol = raw.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(ApiError::BadRequest("symbol must not be empty".to_string()));
    }
    Ok(symbol)
}

fn build_request<T>(
    symbol: String,
    providers: &[ProviderDescriptor<T>],
    prefix: &str,
    query: &MarketQuery,
) -> ApiResult<FetchRequest<T>> {
    Ok(FetchRequest::new(symbol, providers.to_vec())
        .cache_key_prefix(prefix)
        .tier(query.tier()?)
        .bypass_cache(query.refresh))
}

fn market_response<T>(result: FetchResult<T>) -> Result<MarketResponse<T>, ApiError> {
    if !result.errors.is_empty() {
        let kinds: Vec<_> = result
            .errors
            .iter()
            .map(|e| format!("{}={}", e.provider, e.code))
            .collect();
        tracing::warn!(
            "Degraded fetch ({}): {}",
            kinds.join(", "),
            result.metadata.summary()
        );
    }

    let degraded = result.is_degraded();
    let error = ApiError::for_empty(&result);
    match (result.data, result.source) {
        (Some(data), Some(source)) => Ok(MarketResponse {
            data,
            source: source.to_string(),
            cached: result.cached,
            age_ms: result.age.as_millis() as u64,
            degraded,
        }),
        _ => Err(error),
    }
}

async fn get_quote(
    Path(symbol): Path<String>,
    Query(query): Query<MarketQuery>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<MarketResponse<Quote>>> {
    let symbol = normalize_symbol(&symbol)?;
    let request = build_request(symbol, &state.providers.quotes, "quote", &query)?;
    let result = state.orchestrator.fetch_with_fallback(request).await;
    Ok(Json(market_response(result)?))
}

async fn get_quotes(
    Query(query): Query<MarketQuery>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<BatchItem<Quote>>>> {
    let symbols = query
        .symbols
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(normalize_symbol)
        .collect::<ApiResult<Vec<_>>>()?;
    if symbols.is_empty() {
        return Err(ApiError::BadRequest("symbols must not be empty".to_string()));
    }
    if symbols.len() > MAX_BATCH_SYMBOLS {
        return Err(ApiError::BadRequest(format!(
            "at most {} symbols per request",
            MAX_BATCH_SYMBOLS
        )));
    }

    let requests = symbols
        .iter()
        .map(|s| build_request(s.clone(), &state.providers.quotes, "quote", &query))
        .collect::<ApiResult<Vec<_>>>()?;
    let results = state.orchestrator.batch_fetch(requests).await;

    let items = symbols
        .into_iter()
        .zip(results)
        .map(|(symbol, result)| match market_response(result) {
            Ok(response) => BatchItem {
                symbol,
                data: Some(response),
                error: None,
            },
            Err(e) => BatchItem {
                symbol,
                data: None,
                error: Some(e.code()),
            },
        })
        .collect();
    Ok(Json(items))
}

async fn get_fundamentals(
    Path(symbol): Path<String>,
    Query(query): Query<MarketQuery>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<MarketResponse<Fundamentals>>> {
    let symbol = normalize_symbol(&symbol)?;
    let request = build_request(symbol, &state.providers.fundamentals, "fundamentals", &query)?
        .allow_stale(true);
    let result = state.orchestrator.fetch_with_fallback(request).await;
    Ok(Json(market_response(result)?))
}

async fn get_commodity(
    Path(symbol): Path<String>,
    Query(query): Query<MarketQuery>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<MarketResponse<CommodityPrice>>> {
    let symbol = normalize_symbol(&symbol)?;
    if !MetalPriceProvider::supports(&symbol) {
        return Err(ApiError::BadRequest(format!(
            "unsupported commodity '{}'",
            symbol
        )));
    }
    let request = build_request(symbol, &state.providers.commodities, "commodity", &query)?
        .allow_stale(true);
    let result = state.orchestrator.fetch_with_fallback(request).await;
    Ok(Json(market_response(result)?))
}

async fn get_news(
    Path(symbol): Path<String>,
    Query(query): Query<MarketQuery>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<MarketResponse<Vec<NewsArticle>>>> {
    let symbol = normalize_symbol(&symbol)?;
    let days = query.news_days()?;
    let mut request = build_request(symbol, &state.providers.news, "news", &query)?;
    if let Some(days) = days {
        // Separate cache slot per window, same TTL as the default window
        let ttl = state
            .orchestrator
            .config()
            .cache_policy
            .ttl_for("news", request.tier);
        request = request
            .cache_key_prefix(format!("news:{}d", days))
            .ttl(ttl)
            .context(RequestContext::new().with_param("news_days", days.to_string()));
    }

    let merge = MergeRequest::list(request, NewsArticle::dedupe_key);
    let result = state.orchestrator.fetch_with_merge(merge).await;
    Ok(Json(market_response(result)?))
}

async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsSnapshot> {
    Json(state.orchestrator.get_stats())
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/market/quotes", get(get_quotes))
        .route("/market/quotes/{symbol}", get(get_quote))
        .route("/market/fundamentals/{symbol}", get(get_fundamentals))
        .route("/market/commodities/{symbol}", get(get_commodity))
        .route("/market/news/{symbol}", get(get_news))
        .route("/market/stats", get(get_stats))
}
