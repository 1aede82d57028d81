//! Skip reason tracking for provider selection diagnostics.

use serde::Serialize;

use crate::models::ProviderId;

/// Why a provider was not called during a fetch.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    /// Circuit breaker is open for this provider.
    CircuitOpen,

    /// Circuit is half-open and another caller holds the trial slot.
    TrialInFlight,

    /// Credentials were rejected earlier in this process.
    Disabled,

    /// The parent request was cancelled before this provider's turn.
    Cancelled,

    /// The overall call budget ran out before this provider's turn.
    DeadlineExceeded,
}

impl SkipReason {
    /// Skips caused by circuit-breaker state, as opposed to the caller.
    pub fn is_circuit(&self) -> bool {
        matches!(self, Self::CircuitOpen | Self::TrialInFlight | Self::Disabled)
    }
}

/// A provider that was passed over, with the reason.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedProvider {
    pub provider: ProviderId,
    pub reason: SkipReason,
}
