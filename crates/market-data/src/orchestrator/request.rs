use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Tier;
use crate::provider::{ProviderDescriptor, RequestContext};

/// Everything one `fetch_with_fallback` call needs.
///
/// # Example
///
/// ```ignore
/// let request = FetchRequest::new("AAPL", vec![finnhub, alpha_vantage])
///     .cache_key_prefix("quote")
///     .tier(Tier::Pro)
///     .allow_stale(true);
/// ```
pub struct FetchRequest<T> {
    pub key: String,
    pub providers: Vec<ProviderDescriptor<T>>,
    pub cache_key_prefix: String,
    pub tier: Tier,
    /// Serve an expired cache entry when every provider fails.
    pub allow_stale: bool,
    /// Skip the fresh-cache lookup (the result is still written back).
    pub bypass_cache: bool,
    /// Overrides the cache policy's TTL for this call.
    pub ttl: Option<Duration>,
    pub context: RequestContext,
}

impl<T> Clone for FetchRequest<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            providers: self.providers.clone(),
            cache_key_prefix: self.cache_key_prefix.clone(),
            tier: self.tier,
            allow_stale: self.allow_stale,
            bypass_cache: self.bypass_cache,
            ttl: self.ttl,
            context: self.context.clone(),
        }
    }
}

impl<T> std::fmt::Debug for FetchRequest<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchRequest")
            .field("key", &self.key)
            .field("providers", &self.providers)
            .field("cache_key_prefix", &self.cache_key_prefix)
            .field("tier", &self.tier)
            .field("allow_stale", &self.allow_stale)
            .field("bypass_cache", &self.bypass_cache)
            .finish_non_exhaustive()
    }
}

impl<T> FetchRequest<T> {
    pub fn new(key: impl Into<String>, providers: Vec<ProviderDescriptor<T>>) -> Self {
        Self {
            key: key.into(),
            providers,
            cache_key_prefix: "default".to_string(),
            tier: Tier::default(),
            allow_stale: false,
            bypass_cache: false,
            ttl: None,
            context: RequestContext::default(),
        }
    }

    pub fn cache_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.cache_key_prefix = prefix.into();
        self
    }

    pub fn tier(mut self, tier: Tier) -> Self {
        self.tier = tier;
        self
    }

    pub fn allow_stale(mut self, allow: bool) -> Self {
        self.allow_stale = allow;
        self
    }

    pub fn bypass_cache(mut self, bypass: bool) -> Self {
        self.bypass_cache = bypass;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }

    /// Cache key: `{prefix}:{key}`.
    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.cache_key_prefix, self.key)
    }
}

/// Output of a merge reducer.
#[derive(Clone, Debug, PartialEq)]
pub struct Merged<T> {
    pub value: T,
    /// Whether the reducer dropped duplicate entries.
    pub deduplicated: bool,
}

/// Combines successful provider results, given in priority order.
pub type Reducer<T> = Arc<dyn Fn(Vec<T>) -> Merged<T> + Send + Sync>;

/// A fan-out request: every eligible provider is called and the successful
/// results are combined by `reducer`.
pub struct MergeRequest<T> {
    pub request: FetchRequest<T>,
    pub reducer: Reducer<T>,
}

impl<T> MergeRequest<T> {
    pub fn new(
        request: FetchRequest<T>,
        reducer: impl Fn(Vec<T>) -> Merged<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            request,
            reducer: Arc::new(reducer),
        }
    }
}

impl<I: Send + 'static> MergeRequest<Vec<I>> {
    /// Concatenate list results and drop entries whose `dedupe_key` was
    /// already seen, keeping the first occurrence.
    pub fn list<K>(request: FetchRequest<Vec<I>>, dedupe_key: K) -> Self
    where
        K: Fn(&I) -> String + Send + Sync + 'static,
    {
        Self::new(request, move |lists| merge_list(lists, &dedupe_key))
    }
}

/// Flatten `lists` in order, keeping the first item for each key.
pub fn merge_list<I, K>(lists: Vec<Vec<I>>, dedupe_key: K) -> Merged<Vec<I>>
where
    K: Fn(&I) -> String,
{
    let mut seen = HashSet::new();
    let mut value = Vec::new();
    let mut deduplicated = false;

    for item in lists.into_iter().flatten() {
        if seen.insert(dedupe_key(&item)) {
            value.push(item);
        } else {
            deduplicated = true;
        }
    }

    Merged {
        value,
        deduplicated,
    }
}

impl<T> Clone for MergeRequest<T> {
    fn clone(&self) -> Self {
        Self {
            request: self.request.clone(),
            reducer: Arc::clone(&self.reducer),
        }
    }
}

impl<T> std::fmt::Debug for MergeRequest<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeRequest")
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}
