use std::collections::BTreeMap;

use tokio_util::sync::CancellationToken;

/// Per-request context handed to every provider call.
///
/// Carries the caller's cancellation token and free-form parameters that
/// some adapters need (e.g. a news lookback window).
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    cancel: Option<CancellationToken>,
    params: BTreeMap<String, String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tie provider calls to a parent request's cancellation.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(CancellationToken::is_cancelled)
            .unwrap_or(false)
    }

    /// Completes when the parent request is cancelled; never completes
    /// when no token was attached.
    pub async fn cancelled(&self) {
        match &self.cancel {
            Some(token) => token.cancelled().await,
            None => std::future::pending::<()>().await,
        }
    }
}
