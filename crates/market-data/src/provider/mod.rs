//! Upstream provider abstractions and implementations.
//!
//! This module contains:
//! - The `ProviderAdapter` trait that all providers implement
//! - `ProviderDescriptor`, the per-chain handle with priority and timeout
//! - `RequestContext` carrying cancellation and adapter parameters
//! - Concrete provider implementations (Finnhub, Alpha Vantage, etc.)
//!
//! # Architecture
//!
//! Adapters are deliberately thin:
//! - **Single attempt**: one upstream request per call, no internal retry
//! - **Raw failures**: adapters report what happened as a `ProviderFailure`;
//!   classification and failover belong to the orchestrator
//! - **Named**: the adapter name keys circuit breakers, stats and
//!   concurrency ceilings

mod context;
mod http;
mod traits;

pub mod alpha_vantage;
pub mod finnhub;
pub mod metal_price_api;
pub mod rss;

// Re-exports
pub use context::RequestContext;
pub use http::{redact_url, HttpFetcher};
pub use traits::{
    sort_by_priority, ProviderAdapter, ProviderDescriptor, DEFAULT_PRIORITY,
    DEFAULT_PROVIDER_TIMEOUT,
};
