//! Scripted in-memory providers for driving the orchestrator in tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use folio_market_data::{
    ManualClock, Orchestrator, OrchestratorConfig, ProviderAdapter, ProviderDescriptor,
    ProviderFailure, RequestContext,
};

type Responder<T> = Box<dyn Fn(&str) -> Result<T, ProviderFailure> + Send + Sync>;

/// A provider whose answers are decided by a closure over the request key.
pub struct Scripted<T> {
    name: String,
    priority: u8,
    timeout: Duration,
    delay: Duration,
    respond: Responder<T>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl<T: Send + Sync + 'static> Scripted<T> {
    pub fn new(
        name: &str,
        priority: u8,
        respond: impl Fn(&str) -> Result<T, ProviderFailure> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.to_string(),
            priority,
            timeout: Duration::from_secs(10),
            delay: Duration::ZERO,
            respond: Box::new(respond),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn ok(name: &str, priority: u8, value: T) -> Self
    where
        T: Clone,
    {
        Self::new(name, priority, move |_| Ok(value.clone()))
    }

    pub fn failing(name: &str, priority: u8, failure: fn() -> ProviderFailure) -> Self {
        Self::new(name, priority, move |_| Err(failure()))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> ProviderAdapter<T> for Scripted<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch(
        &self,
        key: &str,
        _ctx: &RequestContext,
        _timeout: Duration,
    ) -> Result<T, ProviderFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.respond)(key)
    }
}

pub fn descriptor<T: Send + Sync + 'static>(provider: &Arc<Scripted<T>>) -> ProviderDescriptor<T> {
    ProviderDescriptor::new(Arc::clone(provider) as Arc<dyn ProviderAdapter<T>>)
}

/// Orchestrator with default config on a manual clock.
pub fn orchestrator() -> (Orchestrator, Arc<ManualClock>) {
    orchestrator_with(OrchestratorConfig::default())
}

pub fn orchestrator_with(config: OrchestratorConfig) -> (Orchestrator, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let orchestrator = Orchestrator::with_clock(config, clock.clone());
    (orchestrator, clock)
}

pub fn names<S: AsRef<str>>(ids: &[S]) -> Vec<&str> {
    ids.iter().map(|id| id.as_ref()).collect()
}

pub fn timeout() -> ProviderFailure {
    ProviderFailure::Timeout(Duration::from_secs(10))
}

pub fn rate_limit_notice() -> ProviderFailure {
    ProviderFailure::Notice("API rate limit exceeded, try again later".to_string())
}

pub fn server_error() -> ProviderFailure {
    ProviderFailure::Http {
        status: 502,
        body: "bad gateway".to_string(),
    }
}

pub fn malformed() -> ProviderFailure {
    ProviderFailure::Decode("expected value at line 1 column 1".to_string())
}

pub fn missing_key() -> ProviderFailure {
    ProviderFailure::MissingCredentials
}
