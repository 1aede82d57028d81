//! Shared HTTP plumbing for REST and feed adapters.
//!
//! Performs exactly one request per call and maps transport and status
//! problems to [`ProviderFailure`] without interpreting them further.

use std::time::Duration;

use log::debug;
use reqwest::{Client, Url};

use crate::errors::ProviderFailure;

/// Longest slice of an error body kept for diagnostics.
const MAX_ERROR_BODY: usize = 512;

/// Query parameters whose values are masked in logs.
const SECRET_PARAMS: &[&str] = &["apikey", "api_key", "token", "access_key"];

/// Thin wrapper over a shared `reqwest::Client`.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let client = Client::builder()
            .user_agent(concat!("folio-market-data/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// GET `url` and return the body of a 2xx response.
    pub async fn get_text(&self, url: Url, timeout: Duration) -> Result<String, ProviderFailure> {
        debug!("GET {} (timeout {:?})", redact_url(&url), timeout);

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderFailure::Http {
                status: status.as_u16(),
                body: truncate(body),
            });
        }

        response
            .text()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))
    }

    /// GET `url` and parse the body as JSON.
    pub async fn get_json(
        &self,
        url: Url,
        timeout: Duration,
    ) -> Result<serde_json::Value, ProviderFailure> {
        let body = self.get_text(url, timeout).await?;
        serde_json::from_str(&body).map_err(|e| ProviderFailure::Decode(e.to_string()))
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

fn map_reqwest_error(error: reqwest::Error, timeout: Duration) -> ProviderFailure {
    if error.is_timeout() {
        ProviderFailure::Timeout(timeout)
    } else if error.is_connect() {
        ProviderFailure::Connect(error.without_url().to_string())
    } else if error.is_decode() || error.is_body() {
        ProviderFailure::Decode(error.without_url().to_string())
    } else {
        ProviderFailure::Transport(error.without_url().to_string())
    }
}

fn truncate(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}

/// Render a URL for logging with credential parameters masked.
pub fn redact_url(url: &Url) -> String {
    let mut redacted = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let value = if SECRET_PARAMS.contains(&k.to_lowercase().as_str()) {
                "***".to_string()
            } else {
                v.into_owned()
            };
            (k.into_owned(), value)
        })
        .collect();

    if pairs.is_empty() {
        return redacted.to_string();
    }

    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string()
}
