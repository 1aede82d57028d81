/// Classification for failover policy.
///
/// Used to determine how the orchestrator should respond to a classified
/// provider failure. A provider is never retried against itself within one
/// call; every class below moves on to the next provider in the chain.
///
/// # Behavior Summary
///
/// | Class | Try Next Provider? | Record Circuit Breaker Failure? |
/// |-------|-------------------|--------------------------------|
/// | `FailoverWithPenalty` | Yes | Yes (affects future requests) |
/// | `NextProvider` | Yes | No |
/// | `Disable` | Yes | Provider unusable for the process lifetime |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Failover to next provider and record a circuit breaker penalty.
    ///
    /// Used for transient errors like rate limiting (429), timeouts and
    /// connection failures. After enough failures the circuit opens and the
    /// provider is temporarily excluded from the chain.
    FailoverWithPenalty,

    /// Try next provider without recording any penalty.
    ///
    /// Used when the provider answered but the payload is unusable. This
    /// usually means upstream contract drift and is logged loudly.
    NextProvider,

    /// Credentials are missing or rejected. The provider is marked unusable
    /// until it is manually reset.
    Disable,
}
