//! Provider gating module.
//!
//! This module holds the shared, per-provider state consulted before every
//! upstream call:
//! - Circuit breaking for fault tolerance
//! - Concurrency ceilings per provider
//! - Skip reasons for diagnostics

mod circuit_breaker;
mod permits;
mod skip_reason;

pub use circuit_breaker::{
    Admission, BreakerConfig, CircuitBreakerRegistry, CircuitMetrics, CircuitState, TrialGuard,
};
pub use permits::{ProviderPermits, DEFAULT_PROVIDER_CONCURRENCY};
pub use skip_reason::{SkipReason, SkippedProvider};
