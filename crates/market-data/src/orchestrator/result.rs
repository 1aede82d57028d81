use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::errors::{ErrorKind, FetchError};
use crate::models::ProviderId;
use crate::registry::SkippedProvider;

/// Where the data in a [`FetchResult`] came from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DataSource {
    /// Fetched from the named provider during this call.
    Provider(ProviderId),
    /// Fresh cache entry; no provider was called.
    Cache,
    /// Expired cache entry served after every provider failed.
    StaleCache,
}

impl DataSource {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Provider(name) => name.as_ref(),
            Self::Cache => "cache",
            Self::StaleCache => "stale-cache",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DataSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Diagnostics for one orchestrator call.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchMetadata {
    /// Providers actually called, in priority order.
    pub providers_attempted: Vec<ProviderId>,
    /// Providers that returned data (more than one only in merge mode).
    pub providers_succeeded: Vec<ProviderId>,
    /// Providers passed over, with the reason.
    pub skipped: Vec<SkippedProvider>,
    #[serde(rename = "totalDurationMs", serialize_with = "as_millis")]
    pub total_duration: Duration,
    /// A breaker kept a provider out of this call, or opened during it.
    pub circuit_breaker_triggered: bool,
    /// The merge reducer removed duplicates.
    pub deduplicated: bool,
}

impl FetchMetadata {
    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        let attempted: Vec<&str> = self.providers_attempted.iter().map(|p| p.as_ref()).collect();
        let skipped: Vec<String> = self
            .skipped
            .iter()
            .map(|s| format!("{}({:?})", s.provider, s.reason))
            .collect();
        format!(
            "attempted=[{}] skipped=[{}] duration={}ms breaker={}",
            attempted.join(","),
            skipped.join(","),
            self.total_duration.as_millis(),
            self.circuit_breaker_triggered
        )
    }
}

/// Typed outcome of every orchestrator call. Never an `Err`: a chain that
/// produced nothing is `data: None` with the collected errors.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResult<T> {
    pub data: Option<T>,
    /// `None` exactly when `data` is `None`.
    pub source: Option<DataSource>,
    /// Served from a fresh cache entry; no provider was called.
    pub cached: bool,
    /// When the data was produced upstream (cache write time for hits).
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "ageMs", serialize_with = "as_millis")]
    pub age: Duration,
    pub errors: Vec<FetchError>,
    pub metadata: FetchMetadata,
}

impl<T> FetchResult<T> {
    pub fn is_success(&self) -> bool {
        self.data.is_some()
    }

    /// No data, and at least one provider reported RATE_LIMIT.
    pub fn rate_limited(&self) -> bool {
        self.data.is_none() && self.errors.iter().any(|e| e.code == ErrorKind::RateLimit)
    }

    /// Data was served, but not cleanly: stale, or some provider failed.
    pub fn is_degraded(&self) -> bool {
        self.source == Some(DataSource::StaleCache) || !self.errors.is_empty()
    }

    /// HTTP status an API layer should answer with:
    ///
    /// | Outcome                         | Status |
    /// |---------------------------------|--------|
    /// | data (provider, cache, stale)   | 200    |
    /// | no data, a RATE_LIMIT error     | 429    |
    /// | no data otherwise               | 503    |
    pub fn http_status(&self) -> u16 {
        if self.data.is_some() {
            200
        } else if self.rate_limited() {
            429
        } else {
            503
        }
    }

    /// Transform the payload, keeping source and diagnostics.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FetchResult<U> {
        FetchResult {
            data: self.data.map(f),
            source: self.source,
            cached: self.cached,
            timestamp: self.timestamp,
            age: self.age,
            errors: self.errors,
            metadata: self.metadata,
        }
    }
}
