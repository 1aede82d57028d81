//! Orchestrator configuration and cache policy.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::{BreakerConfig, DEFAULT_PROVIDER_CONCURRENCY};

/// Default fan-out width for merge calls.
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

/// Default ceiling on one orchestrator call, cache lookups included.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// TTL used for cache prefixes without an explicit entry.
const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Caller's subscription level.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Pro,
    Enterprise,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }

    /// Scale applied to the base TTL. Higher tiers see fresher data.
    fn ttl_factor(&self) -> f64 {
        match self {
            Self::Free => 2.0,
            Self::Pro => 1.0,
            Self::Enterprise => 0.5,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Unknown tier '{0}'")]
pub struct UnknownTier(pub String);

impl FromStr for Tier {
    type Err = UnknownTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "pro" => Ok(Self::Pro),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(UnknownTier(other.to_string())),
        }
    }
}

/// Base TTL per cache key prefix, scaled by tier.
#[derive(Clone, Debug)]
pub struct CachePolicy {
    default_ttl: Duration,
    ttls: HashMap<String, Duration>,
}

impl CachePolicy {
    /// A policy with no per-prefix entries.
    pub fn uniform(default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            ttls: HashMap::new(),
        }
    }

    pub fn with_ttl(mut self, prefix: impl Into<String>, ttl: Duration) -> Self {
        self.ttls.insert(prefix.into(), ttl);
        self
    }

    /// Base TTL for a prefix, before the tier factor.
    pub fn base_ttl(&self, prefix: &str) -> Duration {
        self.ttls.get(prefix).copied().unwrap_or(self.default_ttl)
    }

    pub fn ttl_for(&self, prefix: &str, tier: Tier) -> Duration {
        self.base_ttl(prefix).mul_f64(tier.ttl_factor())
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::uniform(DEFAULT_TTL)
            .with_ttl("quote", Duration::from_secs(60))
            .with_ttl("commodity", Duration::from_secs(5 * 60))
            .with_ttl("news", Duration::from_secs(15 * 60))
            .with_ttl("fundamentals", Duration::from_secs(24 * 60 * 60))
    }
}

/// Knobs for [`crate::Orchestrator`].
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    pub breaker: BreakerConfig,
    /// Fan-out width for merge calls.
    pub max_concurrency: usize,
    /// In-flight ceiling per provider, shared by every call path.
    pub per_provider_concurrency: usize,
    /// Overall budget for one orchestrator call.
    pub call_timeout: Duration,
    pub cache_policy: CachePolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            breaker: BreakerConfig::default(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            per_provider_concurrency: DEFAULT_PROVIDER_CONCURRENCY,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            cache_policy: CachePolicy::default(),
        }
    }
}
