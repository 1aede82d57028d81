//! Sequential retry-by-substitution.
//!
//! [`with_fallback`] walks a provider chain in order and stops at the first
//! success. It knows nothing about caches, breakers or timeouts: the
//! `attempt` closure decides what each provider's turn amounts to. A
//! same-provider retry/backoff policy, if ever needed, belongs in a separate
//! combinator wrapped around `attempt`.

use std::future::Future;

use crate::errors::FetchError;
use crate::models::ProviderId;
use crate::provider::ProviderDescriptor;
use crate::registry::{SkipReason, SkippedProvider};

/// Outcome of one provider's turn.
#[derive(Debug)]
pub enum Attempt<T> {
    /// The provider returned data; the chain stops.
    Success(T),
    /// The provider was called and failed; move to the next one.
    Failed(FetchError),
    /// The provider was called, failed, and the whole chain must stop
    /// (cancellation, exhausted budget). Remaining providers are skipped
    /// with the given reason.
    Aborted(FetchError, SkipReason),
    /// The provider was not called; move to the next one.
    Skipped(SkipReason),
    /// The provider was not called and the chain must stop.
    Halted(SkipReason),
}

/// What a walk over the chain produced.
#[derive(Debug)]
pub struct FallbackOutcome<T> {
    /// The winning provider and its value.
    pub value: Option<(ProviderId, T)>,
    /// Called providers, in chain order.
    pub attempted: Vec<ProviderId>,
    pub errors: Vec<FetchError>,
    pub skipped: Vec<SkippedProvider>,
}

impl<T> Default for FallbackOutcome<T> {
    fn default() -> Self {
        Self {
            value: None,
            attempted: Vec::new(),
            errors: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

/// Try `providers` one at a time, in the given order, until one succeeds.
///
/// Each provider gets at most one turn per call.
pub async fn with_fallback<T, F, Fut>(
    providers: &[ProviderDescriptor<T>],
    mut attempt: F,
) -> FallbackOutcome<T>
where
    F: FnMut(ProviderDescriptor<T>) -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    let mut outcome = FallbackOutcome::default();
    let mut remaining = providers.iter();

    while let Some(provider) = remaining.next() {
        let name = provider.name().clone();
        match attempt(provider.clone()).await {
            Attempt::Success(value) => {
                outcome.attempted.push(name.clone());
                outcome.value = Some((name, value));
                break;
            }
            Attempt::Failed(error) => {
                outcome.attempted.push(name);
                outcome.errors.push(error);
            }
            Attempt::Skipped(reason) => {
                outcome.skipped.push(SkippedProvider {
                    provider: name,
                    reason,
                });
            }
            Attempt::Aborted(error, reason) => {
                outcome.attempted.push(name);
                outcome.errors.push(error);
                skip_rest(&mut outcome, remaining, reason);
                break;
            }
            Attempt::Halted(reason) => {
                outcome.skipped.push(SkippedProvider {
                    provider: name,
                    reason: reason.clone(),
                });
                skip_rest(&mut outcome, remaining, reason);
                break;
            }
        }
    }

    outcome
}

fn skip_rest<'a, T: 'a>(
    outcome: &mut FallbackOutcome<T>,
    rest: impl Iterator<Item = &'a ProviderDescriptor<T>>,
    reason: SkipReason,
) {
    outcome.skipped.extend(rest.map(|p| SkippedProvider {
        provider: p.name().clone(),
        reason: reason.clone(),
    }));
}
