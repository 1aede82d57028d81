//! Per-call observability counters.
//!
//! The orchestrator reports every provider outcome, cache hit and exhausted
//! chain here. Counters are process-lifetime and exposed as a serializable
//! snapshot.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::warn;
use serde::Serialize;

use crate::errors::ErrorKind;
use crate::registry::CircuitMetrics;

#[derive(Debug, Default)]
struct ProviderCounters {
    successes: u64,
    failures: u64,
    circuit_trips: u64,
    total_latency: Duration,
    failures_by_kind: BTreeMap<&'static str, u64>,
}

#[derive(Debug, Default)]
struct Counters {
    providers: HashMap<String, ProviderCounters>,
    total_calls: u64,
    cache_hits: u64,
    stale_hits: u64,
    exhausted: u64,
}

/// Aggregated stats for one provider.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStats {
    pub provider: String,
    pub successes: u64,
    pub failures: u64,
    pub circuit_trips: u64,
    /// Mean latency across successes and failures.
    pub avg_latency_ms: f64,
    pub failures_by_kind: BTreeMap<String, u64>,
}

/// Point-in-time copy of all counters.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// Sorted by provider name.
    pub providers: Vec<ProviderStats>,
    pub total_calls: u64,
    pub cache_hits: u64,
    pub stale_hits: u64,
    pub exhausted: u64,
    /// Live breaker state, filled in by the orchestrator.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub circuits: Vec<CircuitMetrics>,
}

impl StatsSnapshot {
    pub fn provider(&self, name: &str) -> Option<&ProviderStats> {
        self.providers.iter().find(|p| p.provider == name)
    }
}

/// Thread-safe stats sink shared by all orchestrator calls.
#[derive(Debug, Default)]
pub struct StatsCollector {
    counters: Mutex<Counters>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the counters mutex, recovering from poison if necessary.
    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(|poisoned| {
            warn!("Stats mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn record_call(&self) {
        self.lock().total_calls += 1;
    }

    pub fn record_cache_hit(&self) {
        self.lock().cache_hits += 1;
    }

    pub fn record_stale_hit(&self) {
        self.lock().stale_hits += 1;
    }

    /// Every provider failed or was skipped.
    pub fn record_exhausted(&self) {
        self.lock().exhausted += 1;
    }

    pub fn record_success(&self, provider: &str, latency: Duration) {
        let mut counters = self.lock();
        let entry = counters.providers.entry(provider.to_string()).or_default();
        entry.successes += 1;
        entry.total_latency += latency;
    }

    pub fn record_failure(&self, provider: &str, kind: ErrorKind, latency: Duration) {
        let mut counters = self.lock();
        let entry = counters.providers.entry(provider.to_string()).or_default();
        entry.failures += 1;
        entry.total_latency += latency;
        *entry.failures_by_kind.entry(kind.as_str()).or_insert(0) += 1;
    }

    pub fn record_trip(&self, provider: &str) {
        let mut counters = self.lock();
        counters
            .providers
            .entry(provider.to_string())
            .or_default()
            .circuit_trips += 1;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let counters = self.lock();

        let mut providers: Vec<ProviderStats> = counters
            .providers
            .iter()
            .map(|(name, c)| {
                let calls = c.successes + c.failures;
                let avg_latency_ms = if calls == 0 {
                    0.0
                } else {
                    c.total_latency.as_secs_f64() * 1000.0 / calls as f64
                };
                ProviderStats {
                    provider: name.clone(),
                    successes: c.successes,
                    failures: c.failures,
                    circuit_trips: c.circuit_trips,
                    avg_latency_ms,
                    failures_by_kind: c
                        .failures_by_kind
                        .iter()
                        .map(|(k, v)| (k.to_string(), *v))
                        .collect(),
                }
            })
            .collect();
        providers.sort_by(|a, b| a.provider.cmp(&b.provider));

        StatsSnapshot {
            providers,
            total_calls: counters.total_calls,
            cache_hits: counters.cache_hits,
            stale_hits: counters.stale_hits,
            exhausted: counters.exhausted,
            circuits: Vec::new(),
        }
    }
}
