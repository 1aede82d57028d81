//! Per-provider circuit breakers for fault tolerance.
//!
//! Implements the circuit breaker pattern to bound the latency impact of a
//! dead or rate-limited provider. Each provider name has its own circuit:
//!
//! - **Closed**: Normal operation, requests are allowed through.
//! - **Open**: Provider is failing, requests are blocked until the cooldown elapses.
//! - **HalfOpen**: A single trial request is allowed to test recovery.
//!
//! The circuit opens once `failure_threshold` failures of the current run
//! fall inside a trailing `failure_window`; older failures age out of the
//! run. Any success clears the run.
//!
//! HalfOpen trial slots handed out by [`CircuitBreakerRegistry::admit`] are
//! held by a [`TrialGuard`]. A trial that ends without a recorded outcome
//! (cancelled, dropped, unusable payload) gives its slot back when the guard
//! drops, so HalfOpen always resolves to Closed or Open.
//!
//! The registry is in-memory and lives for the lifetime of the process. It is
//! constructed explicitly and handed to the orchestrator; the clock is
//! injectable so tests can drive cooldowns without sleeping.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use serde::Serialize;

use super::SkipReason;
use crate::clock::{Clock, SystemClock};

/// Default number of failures within the window before opening the circuit.
const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Default window in which failures must accumulate.
const DEFAULT_FAILURE_WINDOW: Duration = Duration::from_secs(60);

/// Default time to wait before transitioning from Open to HalfOpen.
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

/// Circuit breaker state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation - requests are allowed.
    Closed,
    /// Provider is failing - requests are blocked.
    Open,
    /// Testing recovery - one trial request allowed.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// Outcome of asking the registry whether a provider may be called.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Admission {
    /// Circuit is closed.
    Allowed,
    /// Circuit is half-open and this caller holds the single trial slot.
    Trial,
    /// The provider must be skipped.
    Denied(SkipReason),
}

/// Internal circuit state for a single provider.
#[derive(Debug)]
struct Circuit {
    state: CircuitState,
    /// Failure times of the current run, oldest first.
    recent_failures: VecDeque<Instant>,
    last_failure_at: Option<Instant>,
    opened_at: Option<Instant>,
    /// A HalfOpen trial call is currently in flight.
    trial_in_flight: bool,
    /// Identifies the latest trial handed out.
    trial_id: u64,
    /// Credentials were rejected; unusable until reset.
    disabled: bool,
    /// Number of Closed/HalfOpen -> Open transitions.
    trips: u32,
}

impl Circuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            recent_failures: VecDeque::new(),
            last_failure_at: None,
            opened_at: None,
            trial_in_flight: false,
            trial_id: 0,
            disabled: false,
            trips: 0,
        }
    }

    fn failure_count(&self) -> u32 {
        self.recent_failures.len() as u32
    }

    /// Add a failure to the run and drop the ones older than `window`.
    fn push_failure(&mut self, now: Instant, window: Duration) {
        self.recent_failures.push_back(now);
        while let Some(&oldest) = self.recent_failures.front() {
            if now.saturating_duration_since(oldest) > window {
                self.recent_failures.pop_front();
            } else {
                break;
            }
        }
    }

    fn start_trial(&mut self) -> u64 {
        self.trial_in_flight = true;
        self.trial_id += 1;
        self.trial_id
    }

    fn open(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.trial_in_flight = false;
        self.trips += 1;
    }
}

/// Circuit breaker configuration.
#[derive(Clone, Debug)]
pub struct BreakerConfig {
    /// Number of failures within `failure_window` before opening the circuit.
    pub failure_threshold: u32,
    /// Window in which failures must accumulate.
    pub failure_window: Duration,
    /// Time to wait in Open before allowing a trial call.
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            failure_window: DEFAULT_FAILURE_WINDOW,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

/// Registry of per-provider circuit breakers.
///
/// Thread-safe: all state sits behind a single mutex that is never held
/// across an await point.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    circuits: Mutex<HashMap<String, Circuit>>,
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
}

impl CircuitBreakerRegistry {
    /// Create a registry with default settings and the system clock.
    pub fn new() -> Self {
        Self::with_config(BreakerConfig::default(), Arc::new(SystemClock))
    }

    /// Create a registry with custom configuration and clock.
    pub fn with_config(config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            circuits: Mutex::new(HashMap::new()),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Lock the circuits mutex, recovering from poison if necessary.
    ///
    /// The worst case after a poisoned lock is slightly incorrect circuit
    /// state, which is better than panicking inside the fetch path.
    fn lock_circuits(&self) -> MutexGuard<'_, HashMap<String, Circuit>> {
        self.circuits.lock().unwrap_or_else(|poisoned| {
            warn!("Circuit breaker mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Ask to call a provider.
    ///
    /// Handles the Open -> HalfOpen transition once the cooldown has elapsed
    /// and hands out the single HalfOpen trial slot. A caller that receives
    /// [`Admission::Trial`] must finish with `record_success`,
    /// `record_failure` or `release_trial`; prefer [`Self::admit`], which
    /// does the release on drop.
    pub fn try_acquire(&self, provider: &str) -> Admission {
        self.acquire_slot(provider).0
    }

    /// Ask to call a provider, holding any HalfOpen trial slot in a guard.
    ///
    /// `Ok(None)` means the circuit is closed; `Ok(Some(guard))` means this
    /// caller runs the trial.
    pub fn admit(&self, provider: &str) -> Result<Option<TrialGuard<'_>>, SkipReason> {
        match self.acquire_slot(provider) {
            (Admission::Allowed, _) => Ok(None),
            (Admission::Trial, trial_id) => Ok(Some(TrialGuard {
                registry: self,
                provider: provider.to_string(),
                trial_id,
            })),
            (Admission::Denied(reason), _) => Err(reason),
        }
    }

    fn acquire_slot(&self, provider: &str) -> (Admission, u64) {
        let now = self.clock.now();
        let mut circuits = self.lock_circuits();
        let circuit = circuits
            .entry(provider.to_string())
            .or_insert_with(Circuit::new);

        if circuit.disabled {
            return (Admission::Denied(SkipReason::Disabled), 0);
        }

        match circuit.state {
            CircuitState::Closed => (Admission::Allowed, 0),
            CircuitState::HalfOpen => {
                if circuit.trial_in_flight {
                    (Admission::Denied(SkipReason::TrialInFlight), 0)
                } else {
                    (Admission::Trial, circuit.start_trial())
                }
            }
            CircuitState::Open => {
                let cooled_down = circuit
                    .opened_at
                    .map(|opened_at| now.saturating_duration_since(opened_at) >= self.config.cooldown)
                    .unwrap_or(true);

                if cooled_down {
                    info!(
                        "Circuit breaker: transitioning '{}' from Open to HalfOpen",
                        provider
                    );
                    circuit.state = CircuitState::HalfOpen;
                    (Admission::Trial, circuit.start_trial())
                } else {
                    (Admission::Denied(SkipReason::CircuitOpen), 0)
                }
            }
        }
    }

    /// Non-mutating check: would a call be admitted right now?
    pub fn is_allowed(&self, provider: &str) -> bool {
        let now = self.clock.now();
        let circuits = self.lock_circuits();
        match circuits.get(provider) {
            None => true,
            Some(circuit) if circuit.disabled => false,
            Some(circuit) => match circuit.state {
                CircuitState::Closed => true,
                CircuitState::HalfOpen => !circuit.trial_in_flight,
                CircuitState::Open => circuit
                    .opened_at
                    .map(|opened_at| now.saturating_duration_since(opened_at) >= self.config.cooldown)
                    .unwrap_or(true),
            },
        }
    }

    /// Record a successful call. Closes the circuit and resets the count.
    pub fn record_success(&self, provider: &str) {
        let mut circuits = self.lock_circuits();
        let circuit = circuits
            .entry(provider.to_string())
            .or_insert_with(Circuit::new);

        if circuit.state != CircuitState::Closed {
            info!(
                "Circuit breaker: closing circuit for '{}' after successful trial",
                provider
            );
        } else if !circuit.recent_failures.is_empty() {
            debug!(
                "Circuit breaker: success for '{}', failure count reset",
                provider
            );
        }

        circuit.state = CircuitState::Closed;
        circuit.recent_failures.clear();
        circuit.opened_at = None;
        circuit.trial_in_flight = false;
    }

    /// Record a classified failure.
    ///
    /// Returns `true` when this failure tripped the circuit open.
    pub fn record_failure(&self, provider: &str) -> bool {
        let now = self.clock.now();
        let mut circuits = self.lock_circuits();
        let circuit = circuits
            .entry(provider.to_string())
            .or_insert_with(Circuit::new);

        circuit.last_failure_at = Some(now);

        match circuit.state {
            CircuitState::Closed => {
                circuit.push_failure(now, self.config.failure_window);

                if circuit.failure_count() >= self.config.failure_threshold {
                    info!(
                        "Circuit breaker: opening circuit for '{}' after {} failures",
                        provider,
                        circuit.failure_count()
                    );
                    circuit.open(now);
                    true
                } else {
                    debug!(
                        "Circuit breaker: failure for '{}' ({}/{})",
                        provider,
                        circuit.failure_count(),
                        self.config.failure_threshold
                    );
                    false
                }
            }
            CircuitState::HalfOpen => {
                info!(
                    "Circuit breaker: reopening circuit for '{}' after failed trial",
                    provider
                );
                circuit.push_failure(now, self.config.failure_window);
                circuit.open(now);
                true
            }
            CircuitState::Open => {
                debug!(
                    "Circuit breaker: additional failure for '{}' (already open)",
                    provider
                );
                false
            }
        }
    }

    /// Give back a HalfOpen trial slot without deciding the outcome.
    ///
    /// Used when the trial call was cancelled or returned an unusable payload.
    pub fn release_trial(&self, provider: &str) {
        let mut circuits = self.lock_circuits();
        if let Some(circuit) = circuits.get_mut(provider) {
            circuit.trial_in_flight = false;
        }
    }

    /// Give back trial `trial_id` if it is still the one in flight.
    fn release_trial_id(&self, provider: &str, trial_id: u64) {
        let mut circuits = self.lock_circuits();
        if let Some(circuit) = circuits.get_mut(provider) {
            if circuit.trial_in_flight && circuit.trial_id == trial_id {
                debug!(
                    "Circuit breaker: trial for '{}' ended without an outcome",
                    provider
                );
                circuit.trial_in_flight = false;
            }
        }
    }

    /// Mark a provider unusable for the rest of the process lifetime.
    pub fn disable(&self, provider: &str) {
        let mut circuits = self.lock_circuits();
        let circuit = circuits
            .entry(provider.to_string())
            .or_insert_with(Circuit::new);

        if !circuit.disabled {
            error!(
                "Circuit breaker: disabling '{}' after credentials were rejected",
                provider
            );
        }
        circuit.disabled = true;
        circuit.trial_in_flight = false;
    }

    pub fn is_disabled(&self, provider: &str) -> bool {
        let circuits = self.lock_circuits();
        circuits.get(provider).map(|c| c.disabled).unwrap_or(false)
    }

    /// Get the current state for a provider.
    pub fn state(&self, provider: &str) -> CircuitState {
        let circuits = self.lock_circuits();
        circuits
            .get(provider)
            .map(|c| c.state)
            .unwrap_or(CircuitState::Closed)
    }

    /// Get the failure count for a provider.
    pub fn failure_count(&self, provider: &str) -> u32 {
        let circuits = self.lock_circuits();
        circuits
            .get(provider)
            .map(|c| c.failure_count())
            .unwrap_or(0)
    }

    /// Reset the circuit for a provider to its initial state.
    pub fn reset(&self, provider: &str) {
        let mut circuits = self.lock_circuits();
        if circuits.remove(provider).is_some() {
            info!(
                "Circuit breaker: manually resetting circuit for '{}'",
                provider
            );
        }
    }

    /// Reset all circuits to their initial state.
    pub fn reset_all(&self) {
        let mut circuits = self.lock_circuits();
        circuits.clear();
        info!("Circuit breaker: all circuits reset");
    }

    /// Get metrics for all tracked providers, sorted by provider name.
    pub fn metrics(&self) -> Vec<CircuitMetrics> {
        let now = self.clock.now();
        let circuits = self.lock_circuits();

        let mut metrics: Vec<_> = circuits
            .iter()
            .map(|(provider, circuit)| CircuitMetrics {
                provider: provider.clone(),
                state: circuit.state,
                failure_count: circuit.failure_count(),
                trips: circuit.trips,
                disabled: circuit.disabled,
                ms_since_last_failure: circuit
                    .last_failure_at
                    .map(|at| now.saturating_duration_since(at).as_millis() as u64),
            })
            .collect();
        metrics.sort_by(|a, b| a.provider.cmp(&b.provider));
        metrics
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A HalfOpen trial slot held by one caller.
///
/// Dropping the guard releases the slot unless the trial already resolved
/// through `record_success`, `record_failure` or `disable`.
#[must_use = "dropping the guard releases the trial slot"]
#[derive(Debug)]
pub struct TrialGuard<'a> {
    registry: &'a CircuitBreakerRegistry,
    provider: String,
    trial_id: u64,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        self.registry.release_trial_id(&self.provider, self.trial_id);
    }
}

/// Metrics for a single circuit.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitMetrics {
    pub provider: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub trips: u32,
    pub disabled: bool,
    pub ms_since_last_failure: Option<u64>,
}
