//! Folio Market Data Crate
//!
//! This crate is the resilient external-data access layer of the Folio
//! portfolio tracker. It fetches quotes, fundamentals, commodity prices and
//! news from unreliable, rate-limited third-party providers and shields the
//! rest of the system from that unreliability.
//!
//! # Overview
//!
//! The market data crate supports:
//! - Fallback chains: providers tried in priority order until one succeeds
//! - Merged fan-out: several providers combined, with deduplication
//! - Batches under a global per-provider concurrency ceiling
//! - TTL caching with tier-aware freshness and explicit stale fallback
//! - Per-provider circuit breaking and error classification
//!
//! # Architecture
//!
//! ```text
//! +------------------+
//! |     Caller       |  (HTTP handler, job)
//! +------------------+
//!          |
//!          v
//! +------------------+     +------------------+
//! |   Orchestrator   | --> |  CacheAdapter    |  (fresh hit / stale fallback)
//! +------------------+     +------------------+
//!          |
//!          v
//! +------------------+
//! | CircuitBreakers  |  (skip OPEN / disabled providers)
//! +------------------+
//!          |
//!          v
//! +------------------+     +------------------+
//! | ProviderAdapter  | --> | ErrorClassifier  |  (raw failure -> ErrorKind)
//! +------------------+     +------------------+
//!          |
//!          v
//! +------------------+
//! |  FetchResult     |  (+ StatsCollector)
//! +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`Orchestrator`] - Composes cache, breakers and providers
//! - [`FetchRequest`] / [`MergeRequest`] - What to fetch and how
//! - [`FetchResult`] - Typed outcome; never an error
//! - [`ProviderAdapter`] - Contract every upstream integration implements
//! - [`CircuitBreakerRegistry`] - Per-provider failure gate
//! - [`CacheAdapter`] - TTL-aware key/value store
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use folio_market_data::{FetchRequest, Orchestrator, ProviderDescriptor, Tier};
//! use folio_market_data::provider::finnhub::{FinnhubClient, FinnhubQuoteProvider};
//!
//! let orchestrator = Orchestrator::default();
//! let finnhub = FinnhubClient::new(std::env::var("FINNHUB_API_KEY").ok());
//! let chain = vec![ProviderDescriptor::new(Arc::new(FinnhubQuoteProvider::new(finnhub)))];
//!
//! let result = orchestrator
//!     .fetch_with_fallback(FetchRequest::new("AAPL", chain).cache_key_prefix("quote").tier(Tier::Pro))
//!     .await;
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod provider;
pub mod registry;
pub mod stats;

// Re-export all public types from models
pub use models::{CommodityPrice, Fundamentals, NewsArticle, ProviderId, Quote};

pub use cache::{CacheAdapter, CacheEntry, MemoryCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CachePolicy, OrchestratorConfig, Tier};
pub use errors::{ErrorKind, FetchError, ProviderFailure, RetryClass};

// Re-export orchestrator types
pub use orchestrator::{
    merge_list, with_fallback, Cacheable, DataSource, FetchMetadata, FetchRequest, FetchResult,
    MergeRequest, Merged, Orchestrator,
};

// Re-export provider types
pub use provider::alpha_vantage::{
    AlphaVantageClient, AlphaVantageFundamentalsProvider, AlphaVantageQuoteProvider,
};
pub use provider::finnhub::{FinnhubClient, FinnhubNewsProvider, FinnhubQuoteProvider};
pub use provider::metal_price_api::MetalPriceProvider;
pub use provider::rss::RssNewsProvider;
pub use provider::{ProviderAdapter, ProviderDescriptor, RequestContext};

// Re-export registry types
pub use registry::{
    BreakerConfig, CircuitBreakerRegistry, CircuitMetrics, CircuitState, ProviderPermits,
    SkipReason, SkippedProvider, TrialGuard,
};
pub use stats::{ProviderStats, StatsCollector, StatsSnapshot};
