//! Reduces raw provider failures to an [`ErrorKind`].
//!
//! Upstream APIs signal rate limiting in inconsistent ways: proper 429s,
//! 403s on quota exhaustion, and 200 responses whose JSON body carries a
//! textual notice ("Thank you for using Alpha Vantage! Our standard API
//! call frequency is..."). The phrase scan lives here so adapters only
//! describe what they saw.

use log::debug;
use serde_json::Value;

use super::{ErrorKind, ProviderFailure};

/// Phrases that mark a message as a rate-limit notice. Matched case-insensitively.
const RATE_LIMIT_PHRASES: &[&str] = &[
    "rate limit",
    "rate-limit",
    "ratelimit",
    "api call frequency",
    "too many requests",
    "limit reached",
    "quota exceeded",
    "requests per minute",
];

/// Phrases that mark a body-level notice as a credentials problem.
const AUTH_PHRASES: &[&str] = &[
    "invalid api key",
    "invalid apikey",
    "api key is invalid",
    "apikey is invalid",
    "missing api key",
    "invalid token",
    "unauthorized",
];

/// Strategy that turns a raw failure into an [`ErrorKind`].
///
/// Registered on a chain entry with `ProviderDescriptor::with_classifier`
/// when a provider's error dialect needs rules of its own. Entries without
/// one fall back to the adapter's `classify_error`, which applies
/// [`DefaultClassifier`]'s rules unless the adapter overrides it.
pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, provider: &str, failure: &ProviderFailure) -> ErrorKind;
}

/// The shared detection rules.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultClassifier;

impl ErrorClassifier for DefaultClassifier {
    fn classify(&self, provider: &str, failure: &ProviderFailure) -> ErrorKind {
        classify(provider, failure)
    }
}

/// Classify a failure using the shared detection rules.
pub fn classify(provider: &str, failure: &ProviderFailure) -> ErrorKind {
    let kind = match failure {
        ProviderFailure::Http { status: 429, .. } => ErrorKind::RateLimit,
        ProviderFailure::Http { status: 401, .. } => ErrorKind::AuthError,
        ProviderFailure::Http { status: 403, body } => {
            // Some providers answer quota exhaustion with 403
            if body_mentions_rate_limit(body) {
                ErrorKind::RateLimit
            } else {
                ErrorKind::AuthError
            }
        }
        ProviderFailure::Http { body, .. } => {
            if body_mentions_rate_limit(body) {
                ErrorKind::RateLimit
            } else {
                ErrorKind::HttpError
            }
        }
        ProviderFailure::Timeout(_) | ProviderFailure::Cancelled => ErrorKind::Timeout,
        ProviderFailure::Connect(_) | ProviderFailure::Transport(_) => ErrorKind::NetworkError,
        ProviderFailure::Decode(_) | ProviderFailure::MissingField(_) => {
            ErrorKind::InvalidResponse
        }
        ProviderFailure::Notice(message) => {
            if text_mentions_rate_limit(message) {
                ErrorKind::RateLimit
            } else if text_mentions_auth_problem(message) {
                ErrorKind::AuthError
            } else {
                ErrorKind::InvalidResponse
            }
        }
        ProviderFailure::MissingCredentials | ProviderFailure::InvalidCredentials(_) => {
            ErrorKind::AuthError
        }
    };

    debug!("Classified failure from '{}' as {}: {}", provider, kind, failure);
    kind
}

/// Case-insensitive scan of free text for rate-limit phrasing.
pub fn text_mentions_rate_limit(text: &str) -> bool {
    let lower = text.to_lowercase();
    RATE_LIMIT_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

fn text_mentions_auth_problem(text: &str) -> bool {
    let lower = text.to_lowercase();
    AUTH_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

/// Recursively scans every string in a JSON document for rate-limit phrasing.
pub fn json_mentions_rate_limit(value: &Value) -> bool {
    match value {
        Value::String(s) => text_mentions_rate_limit(s),
        Value::Array(items) => items.iter().any(json_mentions_rate_limit),
        Value::Object(map) => map.values().any(json_mentions_rate_limit),
        _ => false,
    }
}

fn body_mentions_rate_limit(body: &str) -> bool {
    match serde_json::from_str::<Value>(body) {
        Ok(json) => json_mentions_rate_limit(&json),
        Err(_) => text_mentions_rate_limit(body),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    fn http(status: u16, body: &str) -> ProviderFailure {
        ProviderFailure::Http {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_429_is_rate_limit() {
        assert_eq!(classify("P", &http(429, "")), ErrorKind::RateLimit);
    }

    #[test]
    fn test_rate_limit_phrase_in_error_body() {
        let body = r#"{"error": {"details": ["You hit the Rate Limit for today"]}}"#;
        assert_eq!(classify("P", &http(500, body)), ErrorKind::RateLimit);
        assert_eq!(
            classify("P", &http(503, "Too Many Requests, slow down")),
            ErrorKind::RateLimit
        );
    }

    #[test]
    fn test_403_splits_between_quota_and_auth() {
        assert_eq!(
            classify("P", &http(403, r#"{"error":"API limit reached"}"#)),
            ErrorKind::RateLimit
        );
        assert_eq!(
            classify("P", &http(403, r#"{"error":"forbidden"}"#)),
            ErrorKind::AuthError
        );
        assert_eq!(classify("P", &http(401, "")), ErrorKind::AuthError);
    }

    #[test]
    fn test_other_status_is_http_error() {
        assert_eq!(classify("P", &http(502, "bad gateway")), ErrorKind::HttpError);
        assert_eq!(classify("P", &http(404, "")), ErrorKind::HttpError);
    }

    #[test]
    fn test_timeout_and_abort() {
        assert_eq!(
            classify("P", &ProviderFailure::Timeout(Duration::from_secs(5))),
            ErrorKind::Timeout
        );
        assert_eq!(classify("P", &ProviderFailure::Cancelled), ErrorKind::Timeout);
    }

    #[test]
    fn test_connection_failures() {
        assert_eq!(
            classify("P", &ProviderFailure::Connect("refused".into())),
            ErrorKind::NetworkError
        );
        assert_eq!(
            classify("P", &ProviderFailure::Transport("reset".into())),
            ErrorKind::NetworkError
        );
    }

    #[test]
    fn test_invalid_payloads() {
        assert_eq!(
            classify("P", &ProviderFailure::Decode("expected value".into())),
            ErrorKind::InvalidResponse
        );
        assert_eq!(
            classify("P", &ProviderFailure::MissingField("price".into())),
            ErrorKind::InvalidResponse
        );
    }

    #[test]
    fn test_notices_in_successful_bodies() {
        let note = "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute.";
        assert_eq!(
            classify("P", &ProviderFailure::Notice(note.into())),
            ErrorKind::RateLimit
        );
        assert_eq!(
            classify("P", &ProviderFailure::Notice("Invalid API key".into())),
            ErrorKind::AuthError
        );
        assert_eq!(
            classify("P", &ProviderFailure::Notice("Unknown symbol".into())),
            ErrorKind::InvalidResponse
        );
    }

    #[test]
    fn test_credentials() {
        assert_eq!(
            classify("P", &ProviderFailure::MissingCredentials),
            ErrorKind::AuthError
        );
        assert_eq!(
            classify("P", &ProviderFailure::InvalidCredentials("revoked".into())),
            ErrorKind::AuthError
        );
    }

    #[test]
    fn test_json_scan_recurses() {
        let body = json!({
            "meta": {"status": "ok"},
            "notes": [1, {"Information": "rate limit exceeded"}]
        });
        assert!(json_mentions_rate_limit(&body));
        assert!(!json_mentions_rate_limit(&json!({"price": "12.5"})));
    }
}
