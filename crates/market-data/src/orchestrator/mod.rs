//! The orchestrator: cache, breakers, permits and providers composed into
//! three call shapes.
//!
//! - [`Orchestrator::fetch_with_fallback`]: sequential substitution over a
//!   priority-ordered chain
//! - [`Orchestrator::fetch_with_merge`]: bounded fan-out, results combined by
//!   a reducer
//! - [`Orchestrator::batch_fetch`]: many fallback calls under a global
//!   per-provider concurrency ceiling
//!
//! Every call returns a [`FetchResult`]; provider failures are recorded, never
//! propagated.
//!
//! Failure handling per [`ErrorKind`]:
//!
//! | Kind             | Next provider | Breaker             |
//! |------------------|---------------|---------------------|
//! | RATE_LIMIT       | yes           | counts as a failure |
//! | TIMEOUT          | yes           | counts as a failure |
//! | NETWORK_ERROR    | yes           | counts as a failure |
//! | HTTP_ERROR       | yes           | counts as a failure |
//! | INVALID_RESPONSE | yes           | none, logged loudly |
//! | AUTH_ERROR       | yes           | provider disabled   |
//!
//! Cancellation and an exhausted call budget stop the chain without
//! penalizing the provider that was in flight.

mod fallback;
mod request;
mod result;

pub use fallback::{with_fallback, Attempt, FallbackOutcome};
pub use request::{merge_list, FetchRequest, MergeRequest, Merged, Reducer};
pub use result::{DataSource, FetchMetadata, FetchResult};

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::Instant;

use crate::cache::{CacheAdapter, CacheEntry, MemoryCache};
use crate::clock::{Clock, SystemClock};
use crate::config::OrchestratorConfig;
use crate::errors::{ErrorKind, FetchError, ProviderFailure, RetryClass};
use crate::models::ProviderId;
use crate::provider::{sort_by_priority, ProviderDescriptor, RequestContext};
use crate::registry::{
    CircuitBreakerRegistry, CircuitState, ProviderPermits, SkipReason, SkippedProvider,
};
use crate::stats::{StatsCollector, StatsSnapshot};

/// Values the orchestrator can fetch and cache.
pub trait Cacheable: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Cacheable for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Composes the cache, breakers and providers.
///
/// Cheap to share behind an `Arc`; all mutable state lives in the shared
/// components.
pub struct Orchestrator {
    cache: Arc<dyn CacheAdapter>,
    breakers: Arc<CircuitBreakerRegistry>,
    permits: Arc<ProviderPermits>,
    stats: Arc<StatsCollector>,
    clock: Arc<dyn Clock>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// In-memory cache and wall-clock time.
    pub fn new(config: OrchestratorConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// In-memory cache and breakers driven by `clock`.
    pub fn with_clock(config: OrchestratorConfig, clock: Arc<dyn Clock>) -> Self {
        let cache = Arc::new(MemoryCache::with_clock(Arc::clone(&clock)));
        let breakers = Arc::new(CircuitBreakerRegistry::with_config(
            config.breaker.clone(),
            Arc::clone(&clock),
        ));
        Self::with_parts(config, cache, breakers, clock)
    }

    /// Assemble from existing components. `clock` must be the one the
    /// cache measures ages with.
    pub fn with_parts(
        config: OrchestratorConfig,
        cache: Arc<dyn CacheAdapter>,
        breakers: Arc<CircuitBreakerRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let permits = Arc::new(ProviderPermits::new(config.per_provider_concurrency));
        Self {
            cache,
            breakers,
            permits,
            stats: Arc::new(StatsCollector::new()),
            clock,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<dyn CacheAdapter> {
        &self.cache
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    pub fn permits(&self) -> &Arc<ProviderPermits> {
        &self.permits
    }

    /// Aggregated per-provider counters plus live breaker state.
    pub fn get_stats(&self) -> StatsSnapshot {
        let mut snapshot = self.stats.snapshot();
        snapshot.circuits = self.breakers.metrics();
        snapshot
    }

    /// Fetch `request.key` from the first provider that succeeds.
    ///
    /// 1. A fresh cache entry is returned without calling any provider
    ///    (unless `bypass_cache`).
    /// 2. Providers are tried in priority order, one at a time; providers
    ///    whose circuit is open are skipped.
    /// 3. The first success is written through to the cache.
    /// 4. On exhaustion, an expired entry is served if `allow_stale`,
    ///    otherwise the result has no data.
    pub async fn fetch_with_fallback<T: Cacheable>(&self, request: FetchRequest<T>) -> FetchResult<T> {
        let started = Instant::now();
        let deadline = started + self.config.call_timeout;
        self.stats.record_call();

        let cache_key = request.cache_key();
        if !request.bypass_cache {
            if let Some(result) = self.fresh_from_cache(&request, &cache_key).await {
                return result;
            }
        }

        let mut providers = request.providers.clone();
        sort_by_priority(&mut providers);

        let key = request.key.as_str();
        let ctx = &request.context;
        let outcome = with_fallback(&providers, move |provider| {
            self.attempt(provider, key, ctx, deadline)
        })
        .await;

        let mut metadata = FetchMetadata {
            circuit_breaker_triggered: self.breaker_triggered(&outcome.attempted, &outcome.skipped),
            providers_attempted: outcome.attempted,
            skipped: outcome.skipped,
            ..FetchMetadata::default()
        };

        match outcome.value {
            Some((provider, value)) => {
                self.write_through(&request, &cache_key, &value).await;
                metadata.providers_succeeded.push(provider.clone());
                metadata.total_duration = started.elapsed();
                debug!("Fetched '{}' from {}: {}", cache_key, provider, metadata.summary());

                FetchResult {
                    data: Some(value),
                    source: Some(DataSource::Provider(provider)),
                    cached: false,
                    timestamp: Utc::now(),
                    age: Duration::ZERO,
                    errors: outcome.errors,
                    metadata,
                }
            }
            None => {
                self.exhausted(&request, &cache_key, outcome.errors, metadata, started)
                    .await
            }
        }
    }

    /// Call every eligible provider concurrently (at most
    /// `max_concurrency` at a time) and combine the successes.
    ///
    /// Results reach the reducer in priority order, regardless of which
    /// provider answered first. Partial success is success; `source` names
    /// the highest-priority provider that contributed.
    pub async fn fetch_with_merge<T: Cacheable>(&self, merge: MergeRequest<T>) -> FetchResult<T> {
        let MergeRequest { request, reducer } = merge;
        let started = Instant::now();
        let deadline = started + self.config.call_timeout;
        self.stats.record_call();

        let cache_key = request.cache_key();
        if !request.bypass_cache {
            if let Some(result) = self.fresh_from_cache(&request, &cache_key).await {
                return result;
            }
        }

        let mut providers = request.providers.clone();
        sort_by_priority(&mut providers);

        let key = request.key.as_str();
        let ctx = &request.context;
        let attempts: Vec<(ProviderId, Attempt<T>)> = stream::iter(providers)
            .map(move |provider| {
                let name = provider.name().clone();
                let attempt = self.attempt(provider, key, ctx, deadline);
                async move { (name, attempt.await) }
            })
            .buffered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        let mut metadata = FetchMetadata::default();
        let mut errors = Vec::new();
        let mut values = Vec::new();

        for (name, attempt) in attempts {
            match attempt {
                Attempt::Success(value) => {
                    metadata.providers_attempted.push(name.clone());
                    metadata.providers_succeeded.push(name);
                    values.push(value);
                }
                Attempt::Failed(error) | Attempt::Aborted(error, _) => {
                    metadata.providers_attempted.push(name);
                    errors.push(error);
                }
                Attempt::Skipped(reason) | Attempt::Halted(reason) => {
                    metadata.skipped.push(SkippedProvider {
                        provider: name,
                        reason,
                    });
                }
            }
        }
        metadata.circuit_breaker_triggered =
            self.breaker_triggered(&metadata.providers_attempted, &metadata.skipped);

        let Some(source) = metadata.providers_succeeded.first().cloned() else {
            return self
                .exhausted(&request, &cache_key, errors, metadata, started)
                .await;
        };

        let merged = reducer(values);
        metadata.deduplicated = merged.deduplicated;
        self.write_through(&request, &cache_key, &merged.value).await;
        metadata.total_duration = started.elapsed();
        debug!("Merged '{}': {}", cache_key, metadata.summary());

        FetchResult {
            data: Some(merged.value),
            source: Some(DataSource::Provider(source)),
            cached: false,
            timestamp: Utc::now(),
            age: Duration::ZERO,
            errors,
            metadata,
        }
    }

    /// Run many fallback calls concurrently; results come back in input
    /// order.
    ///
    /// In-flight calls per provider never exceed the configured ceiling,
    /// counted together with every other call using this orchestrator.
    pub async fn batch_fetch<T: Cacheable>(&self, requests: Vec<FetchRequest<T>>) -> Vec<FetchResult<T>> {
        let calls = requests
            .into_iter()
            .map(|request| self.fetch_with_fallback(request));
        futures::future::join_all(calls).await
    }

    /// One provider's turn: gate, permit, call, settle.
    async fn attempt<T: Cacheable>(
        &self,
        provider: ProviderDescriptor<T>,
        key: &str,
        ctx: &RequestContext,
        deadline: Instant,
    ) -> Attempt<T> {
        let name = provider.name().clone();

        if ctx.is_cancelled() {
            return Attempt::Halted(SkipReason::Cancelled);
        }
        if deadline <= Instant::now() {
            return Attempt::Halted(SkipReason::DeadlineExceeded);
        }

        // Any trial slot is released when this future finishes or is dropped
        // without a recorded outcome
        let _trial = match self.breakers.admit(&name) {
            Ok(trial) => trial,
            Err(reason) => {
                debug!("Skipping '{}' for '{}': {:?}", name, key, reason);
                return Attempt::Skipped(reason);
            }
        };

        let _permit = tokio::select! {
            biased;
            _ = ctx.cancelled() => return Attempt::Halted(SkipReason::Cancelled),
            _ = tokio::time::sleep_until(deadline) => {
                return Attempt::Halted(SkipReason::DeadlineExceeded);
            }
            permit = self.permits.acquire(&name) => permit,
        };

        let budget = deadline.saturating_duration_since(Instant::now());
        let started = Instant::now();
        let outcome = provider.call(key, ctx, budget).await;
        let latency = started.elapsed();

        match outcome {
            Ok(value) => {
                self.breakers.record_success(&name);
                self.stats.record_success(&name, latency);
                Attempt::Success(value)
            }
            Err(failure) => self.settle_failure(&provider, failure, budget, latency),
        }
    }

    /// Classify a failure and apply its persistent effect.
    fn settle_failure<T>(
        &self,
        provider: &ProviderDescriptor<T>,
        failure: ProviderFailure,
        budget: Duration,
        latency: Duration,
    ) -> Attempt<T> {
        let name = provider.name();

        // The caller went away, or the overall budget (not the provider's
        // own timeout) ran out: stop without blaming the provider.
        let stop = match &failure {
            ProviderFailure::Cancelled => Some(SkipReason::Cancelled),
            ProviderFailure::Timeout(_) if budget < provider.timeout() => {
                Some(SkipReason::DeadlineExceeded)
            }
            _ => None,
        };
        if let Some(reason) = stop {
            debug!("'{}' interrupted: {:?}", name, reason);
            let error = FetchError::new(name.clone(), ErrorKind::Timeout, failure);
            return Attempt::Aborted(error, reason);
        }

        let kind = provider.classify(&failure);
        self.stats.record_failure(name, kind, latency);

        match kind.retry_class() {
            RetryClass::FailoverWithPenalty => {
                debug!("'{}' failed with {}: {}", name, kind, failure);
                if self.breakers.record_failure(name) {
                    self.stats.record_trip(name);
                }
            }
            RetryClass::NextProvider => {
                warn!(
                    "'{}' returned an unusable response, upstream contract may have changed: {}",
                    name, failure
                );
            }
            RetryClass::Disable => {
                self.breakers.disable(name);
            }
        }

        Attempt::Failed(FetchError::new(name.clone(), kind, failure))
    }

    fn ttl_for<T>(&self, request: &FetchRequest<T>) -> Duration {
        request.ttl.unwrap_or_else(|| {
            self.config
                .cache_policy
                .ttl_for(&request.cache_key_prefix, request.tier)
        })
    }

    async fn fresh_from_cache<T: Cacheable>(
        &self,
        request: &FetchRequest<T>,
        cache_key: &str,
    ) -> Option<FetchResult<T>> {
        let entry = self.cache.get(cache_key).await?;
        let age = entry.age(self.clock.now());

        // Tier TTL can be stricter than the TTL the entry was written with
        if age >= self.ttl_for(request) {
            return None;
        }

        let value = decode_entry::<T>(cache_key, &entry)?;
        self.stats.record_cache_hit();
        debug!("Cache hit for '{}' (age {:?})", cache_key, age);

        Some(FetchResult {
            data: Some(value),
            source: Some(DataSource::Cache),
            cached: true,
            timestamp: entry.stored_at_utc,
            age,
            errors: Vec::new(),
            metadata: FetchMetadata::default(),
        })
    }

    async fn write_through<T: Cacheable>(&self, request: &FetchRequest<T>, cache_key: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(json) => self.cache.set(cache_key, json, self.ttl_for(request)).await,
            Err(e) => warn!("Not caching '{}': {}", cache_key, e),
        }
    }

    /// Every provider failed or was skipped.
    async fn exhausted<T: Cacheable>(
        &self,
        request: &FetchRequest<T>,
        cache_key: &str,
        errors: Vec<FetchError>,
        mut metadata: FetchMetadata,
        started: Instant,
    ) -> FetchResult<T> {
        self.stats.record_exhausted();

        if request.allow_stale {
            if let Some(entry) = self.cache.get_stale(cache_key).await {
                if let Some(value) = decode_entry::<T>(cache_key, &entry) {
                    let age = entry.age(self.clock.now());
                    self.stats.record_stale_hit();
                    metadata.total_duration = started.elapsed();
                    warn!(
                        "All providers failed for '{}', serving stale cache (age {:?}): {}",
                        cache_key,
                        age,
                        metadata.summary()
                    );

                    return FetchResult {
                        data: Some(value),
                        source: Some(DataSource::StaleCache),
                        cached: false,
                        timestamp: entry.stored_at_utc,
                        age,
                        errors,
                        metadata,
                    };
                }
            }
        }

        metadata.total_duration = started.elapsed();
        info!(
            "All providers failed for '{}' (tier {}): {}",
            cache_key,
            request.tier,
            metadata.summary()
        );

        FetchResult {
            data: None,
            source: None,
            cached: false,
            timestamp: Utc::now(),
            age: Duration::ZERO,
            errors,
            metadata,
        }
    }

    /// A breaker kept a provider out, or an attempted provider is now open.
    fn breaker_triggered(
        &self,
        attempted: &[ProviderId],
        skipped: &[SkippedProvider],
    ) -> bool {
        skipped.iter().any(|s| s.reason.is_circuit())
            || attempted
                .iter()
                .any(|p| self.breakers.state(p) == CircuitState::Open)
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(OrchestratorConfig::default())
    }
}

fn decode_entry<T: DeserializeOwned>(cache_key: &str, entry: &CacheEntry) -> Option<T> {
    match serde_json::from_value(entry.value.clone()) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring undecodable cache entry '{}': {}", cache_key, e);
            None
        }
    }
}
