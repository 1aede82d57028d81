//! Per-provider concurrency ceilings.
//!
//! Every outbound call takes a permit from its provider's semaphore, so a
//! burst of end-user requests cannot multiply into an unbounded number of
//! in-flight calls against one upstream. Semaphores are created on demand
//! with the default width, or can be pre-configured per provider.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, warn};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Default number of concurrent calls per provider.
pub const DEFAULT_PROVIDER_CONCURRENCY: usize = 5;

/// Registry of per-provider semaphores.
#[derive(Debug)]
pub struct ProviderPermits {
    default_limit: usize,
    semaphores: Mutex<HashMap<String, Arc<Semaphore>>>,
    limits: Mutex<HashMap<String, usize>>,
}

impl ProviderPermits {
    pub fn new(default_limit: usize) -> Self {
        Self {
            default_limit: default_limit.max(1),
            semaphores: Mutex::new(HashMap::new()),
            limits: Mutex::new(HashMap::new()),
        }
    }

    /// Lock the semaphores mutex, recovering from poison if necessary.
    fn lock_semaphores(&self) -> MutexGuard<'_, HashMap<String, Arc<Semaphore>>> {
        self.semaphores.lock().unwrap_or_else(|poisoned| {
            warn!("Provider permits mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_limits(&self) -> MutexGuard<'_, HashMap<String, usize>> {
        self.limits.lock().unwrap_or_else(|poisoned| {
            warn!("Provider limits mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Configure the ceiling for a specific provider.
    ///
    /// Takes effect for permits acquired after the call; permits already
    /// handed out stay valid against the old semaphore.
    pub fn configure(&self, provider: &str, limit: usize) {
        let mut limits = self.lock_limits();
        limits.insert(provider.to_string(), limit.max(1));
        drop(limits); // Release limits lock before acquiring semaphores lock

        let mut semaphores = self.lock_semaphores();
        semaphores.remove(provider);
    }

    /// Ceiling that applies to a provider.
    pub fn limit(&self, provider: &str) -> usize {
        self.lock_limits()
            .get(provider)
            .copied()
            .unwrap_or(self.default_limit)
    }

    fn semaphore(&self, provider: &str) -> Arc<Semaphore> {
        let limit = self.limit(provider);
        let mut semaphores = self.lock_semaphores();
        semaphores
            .entry(provider.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(limit)))
            .clone()
    }

    /// Wait for a permit to call `provider`.
    ///
    /// The permit is released when dropped. Returns `None` only if the
    /// semaphore was closed, which this registry never does.
    pub async fn acquire(&self, provider: &str) -> Option<OwnedSemaphorePermit> {
        let semaphore = self.semaphore(provider);
        if semaphore.available_permits() == 0 {
            debug!("Provider permits: waiting for a slot on '{}'", provider);
        }
        semaphore.acquire_owned().await.ok()
    }

    /// Permits currently available for a provider.
    pub fn available(&self, provider: &str) -> usize {
        self.semaphore(provider).available_permits()
    }
}

impl Default for ProviderPermits {
    fn default() -> Self {
        Self::new(DEFAULT_PROVIDER_CONCURRENCY)
    }
}
