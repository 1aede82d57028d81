use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A news article from a REST news API or an RSS/Atom feed
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsArticle {
    /// Headline, entity-decoded with markup stripped
    pub title: String,

    /// Link to the full article
    pub url: String,

    /// Short plain-text summary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Publisher or feed name
    pub source: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl NewsArticle {
    /// Key used to collapse the same story served by several sources.
    ///
    /// URLs are compared case-insensitively and without surrounding whitespace.
    pub fn dedupe_key(&self) -> String {
        self.url.trim().to_lowercase()
    }
}
