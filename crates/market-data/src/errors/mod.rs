//! Error taxonomy for the external-data access layer.
//!
//! This module provides:
//! - [`ProviderFailure`]: the raw failure an adapter hands back to the orchestrator
//! - [`ErrorKind`]: the closed classification every failure is reduced to
//! - [`FetchError`]: the structured record of one failed provider attempt
//! - [`RetryClass`]: how the orchestrator reacts to each kind
//! - [`ErrorClassifier`]: the strategy that turns a failure into a kind

mod classifier;
mod retry;

pub use classifier::{
    classify, json_mentions_rate_limit, text_mentions_rate_limit, DefaultClassifier,
    ErrorClassifier,
};
pub use retry::RetryClass;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::ProviderId;

/// Closed classification of provider failures.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// HTTP 429 or a rate-limit notice embedded in the body.
    RateLimit,
    /// The call exceeded its timeout or was aborted.
    Timeout,
    /// Connection-level failure (DNS, refused, reset).
    NetworkError,
    /// Any other non-2xx response.
    HttpError,
    /// Unparseable body or missing required fields.
    InvalidResponse,
    /// Missing or rejected credentials.
    AuthError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimit => "RATE_LIMIT",
            Self::Timeout => "TIMEOUT",
            Self::NetworkError => "NETWORK_ERROR",
            Self::HttpError => "HTTP_ERROR",
            Self::InvalidResponse => "INVALID_RESPONSE",
            Self::AuthError => "AUTH_ERROR",
        }
    }

    /// Returns how the orchestrator should react to this kind of failure.
    ///
    /// ```
    /// use folio_market_data::errors::{ErrorKind, RetryClass};
    ///
    /// assert_eq!(ErrorKind::RateLimit.retry_class(), RetryClass::FailoverWithPenalty);
    /// assert_eq!(ErrorKind::AuthError.retry_class(), RetryClass::Disable);
    /// ```
    pub fn retry_class(self) -> RetryClass {
        match self {
            Self::RateLimit | Self::Timeout | Self::NetworkError | Self::HttpError => {
                RetryClass::FailoverWithPenalty
            }
            Self::InvalidResponse => RetryClass::NextProvider,
            Self::AuthError => RetryClass::Disable,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw failure produced by a provider adapter.
///
/// Adapters never classify; they describe what happened and leave the
/// classification to the provider's [`ErrorClassifier`].
#[derive(Error, Debug)]
pub enum ProviderFailure {
    /// Non-2xx HTTP response.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The per-call timeout elapsed.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The parent request was cancelled while the call was in flight.
    #[error("Request cancelled")]
    Cancelled,

    /// Could not establish or keep a connection.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Any other transport-level error.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The body could not be parsed.
    #[error("Malformed response: {0}")]
    Decode(String),

    /// The body parsed but a required field was absent.
    #[error("Missing field: {0}")]
    MissingField(String),

    /// A 2xx response whose body carries an error or notice message
    /// instead of data.
    #[error("Provider notice: {0}")]
    Notice(String),

    /// No API key configured for this provider.
    #[error("Missing credentials")]
    MissingCredentials,

    /// The provider rejected the configured credentials.
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),
}

/// One failed provider attempt, as reported in a fetch result.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchError {
    pub provider: ProviderId,
    pub code: ErrorKind,
    /// Raw provider text. Never forward this to end users.
    pub message: String,
    #[serde(skip)]
    pub original: Option<Arc<ProviderFailure>>,
}

impl FetchError {
    pub fn new(provider: ProviderId, code: ErrorKind, failure: ProviderFailure) -> Self {
        Self {
            provider,
            code,
            message: failure.to_string(),
            original: Some(Arc::new(failure)),
        }
    }
}
