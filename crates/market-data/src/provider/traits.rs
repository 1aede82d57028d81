//! Provider adapter trait definitions.
//!
//! This module defines the `ProviderAdapter` trait every upstream
//! integration implements, and `ProviderDescriptor`, the handle the
//! orchestrator works with.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::RequestContext;
use crate::errors::{classify, ErrorClassifier, ErrorKind, ProviderFailure};
use crate::models::ProviderId;

/// Default per-call timeout for provider requests.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// Default priority; lower values are tried first.
pub const DEFAULT_PRIORITY: u8 = 10;

/// Trait for upstream data providers.
///
/// Implement this trait to add a new data source. Adapters fetch exactly
/// once per call and never retry internally; substituting another provider
/// is the orchestrator's job.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use folio_market_data::provider::{ProviderAdapter, RequestContext};
///
/// struct MyProvider;
///
/// #[async_trait]
/// impl ProviderAdapter<Quote> for MyProvider {
///     fn name(&self) -> &str {
///         "MY_PROVIDER"
///     }
///
///     async fn fetch(
///         &self,
///         key: &str,
///         ctx: &RequestContext,
///         timeout: Duration,
///     ) -> Result<Quote, ProviderFailure> {
///         // ... one request, no retries
///     }
/// }
/// ```
#[async_trait]
pub trait ProviderAdapter<T>: Send + Sync {
    /// Unique identifier for this provider.
    ///
    /// Used for logging, circuit breaker tracking, stats and concurrency
    /// ceilings, so two configured instances must not share a name.
    fn name(&self) -> &str;

    /// Provider priority for ordering. Lower values = higher priority.
    fn priority(&self) -> u8 {
        DEFAULT_PRIORITY
    }

    /// Per-call timeout this adapter enforces.
    fn timeout(&self) -> Duration {
        DEFAULT_PROVIDER_TIMEOUT
    }

    /// Fetch the value for `key` with a single upstream request.
    ///
    /// `timeout` is the budget for this call; adapters pass it down to
    /// their HTTP client.
    async fn fetch(
        &self,
        key: &str,
        ctx: &RequestContext,
        timeout: Duration,
    ) -> Result<T, ProviderFailure>;

    /// Classify a failure from this provider.
    ///
    /// Defaults to the shared rules; override when an upstream signals
    /// errors in its own dialect.
    fn classify_error(&self, failure: &ProviderFailure) -> ErrorKind {
        classify(self.name(), failure)
    }
}

/// A provider registered in a fallback chain.
///
/// Wraps the adapter with its effective name, priority, timeout and error
/// classifier, and enforces that timeout (and the caller's cancellation)
/// around each call.
pub struct ProviderDescriptor<T> {
    adapter: Arc<dyn ProviderAdapter<T>>,
    name: ProviderId,
    priority: u8,
    timeout: Duration,
    classifier: Option<Arc<dyn ErrorClassifier>>,
}

impl<T> Clone for ProviderDescriptor<T> {
    fn clone(&self) -> Self {
        Self {
            adapter: Arc::clone(&self.adapter),
            name: self.name.clone(),
            priority: self.priority,
            timeout: self.timeout,
            classifier: self.classifier.clone(),
        }
    }
}

impl<T> std::fmt::Debug for ProviderDescriptor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("timeout", &self.timeout)
            .field("custom_classifier", &self.classifier.is_some())
            .finish()
    }
}

impl<T> ProviderDescriptor<T> {
    pub fn new(adapter: Arc<dyn ProviderAdapter<T>>) -> Self {
        let name = ProviderId::Owned(adapter.name().to_string());
        let priority = adapter.priority();
        let timeout = adapter.timeout();
        Self {
            adapter,
            name,
            priority,
            timeout,
            classifier: None,
        }
    }

    /// Override the adapter's default priority (e.g. from user settings).
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Classify this provider's failures with `classifier` instead of the
    /// adapter's own rules.
    pub fn with_classifier(mut self, classifier: impl ErrorClassifier + 'static) -> Self {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    pub fn name(&self) -> &ProviderId {
        &self.name
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn classify(&self, failure: &ProviderFailure) -> ErrorKind {
        match &self.classifier {
            Some(classifier) => classifier.classify(&self.name, failure),
            None => self.adapter.classify_error(failure),
        }
    }

    /// Call the provider once, bounded by `budget` (capped at this
    /// provider's own timeout) and by the context's cancellation.
    ///
    /// Dropping the in-flight future on timeout or cancellation aborts the
    /// underlying HTTP request.
    pub async fn call(
        &self,
        key: &str,
        ctx: &RequestContext,
        budget: Duration,
    ) -> Result<T, ProviderFailure> {
        let timeout = self.timeout.min(budget);
        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(ProviderFailure::Cancelled),
            outcome = tokio::time::timeout(timeout, self.adapter.fetch(key, ctx, timeout)) => {
                outcome.unwrap_or(Err(ProviderFailure::Timeout(timeout)))
            }
        }
    }
}

/// Sort a chain by priority. The sort is stable, so providers with equal
/// priority keep their input order.
pub fn sort_by_priority<T>(providers: &mut [ProviderDescriptor<T>]) {
    providers.sort_by_key(|p| p.priority());
}
