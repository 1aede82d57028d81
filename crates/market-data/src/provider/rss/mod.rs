//! RSS/Atom news feed provider.
//!
//! Each configured feed is its own provider with its own name, so breakers,
//! stats and concurrency ceilings are tracked per feed.
//!
//! Feeds are addressed by a URL template in which `{symbol}` is replaced by
//! the URL-encoded request key, e.g.
//! `https://feeds.finance.yahoo.com/rss/2.0/headline?s={symbol}`.

mod parser;

pub use parser::{clean_text, parse_feed};

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Url;

use crate::errors::ProviderFailure;
use crate::models::NewsArticle;
use crate::provider::{HttpFetcher, ProviderAdapter, RequestContext, DEFAULT_PRIORITY};

/// Placeholder substituted with the request key.
const SYMBOL_PLACEHOLDER: &str = "{symbol}";

/// Upper bound on articles kept from a single feed.
const DEFAULT_MAX_ITEMS: usize = 50;

/// News from an RSS 2.0 or Atom feed.
#[derive(Clone, Debug)]
pub struct RssNewsProvider {
    http: HttpFetcher,
    name: String,
    url_template: String,
    priority: u8,
    max_items: usize,
}

impl RssNewsProvider {
    /// Create a feed provider. `name` doubles as the article source label.
    pub fn new(name: impl Into<String>, url_template: impl Into<String>) -> Self {
        Self {
            http: HttpFetcher::new(),
            name: name.into(),
            url_template: url_template.into(),
            priority: DEFAULT_PRIORITY,
            max_items: DEFAULT_MAX_ITEMS,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    /// Resolve the feed URL for `key`.
    pub fn feed_url(&self, key: &str) -> Result<Url, ProviderFailure> {
        let encoded = urlencoding::encode(key.trim());
        let url = self.url_template.replace(SYMBOL_PLACEHOLDER, &encoded);
        Url::parse(&url)
            .map_err(|e| ProviderFailure::Transport(format!("Invalid feed URL '{}': {}", url, e)))
    }
}

#[async_trait]
impl ProviderAdapter<Vec<NewsArticle>> for RssNewsProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    async fn fetch(
        &self,
        key: &str,
        _ctx: &RequestContext,
        timeout: Duration,
    ) -> Result<Vec<NewsArticle>, ProviderFailure> {
        let url = self.feed_url(key)?;
        let body = self.http.get_text(url, timeout).await?;

        let mut articles = parse_feed(&body, &self.name)?;
        articles.truncate(self.max_items);

        debug!("{}: parsed {} articles for {}", self.name, articles.len(), key);
        Ok(articles)
    }
}
