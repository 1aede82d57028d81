//! RSS 2.0 / Atom feed parsing.
//!
//! Streams the document with `quick-xml` and collects one [`NewsArticle`]
//! per `<item>` (RSS) or `<entry>` (Atom). Titles and descriptions are
//! entity-decoded and stripped of embedded HTML.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use scraper::Html;

use crate::errors::ProviderFailure;
use crate::models::NewsArticle;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Description,
    Summary,
    Content,
    Published,
}

impl Field {
    fn from_local_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Self::Title),
            b"link" => Some(Self::Link),
            b"description" => Some(Self::Description),
            b"summary" => Some(Self::Summary),
            b"content" | b"encoded" => Some(Self::Content),
            b"pubDate" | b"published" | b"updated" | b"date" => Some(Self::Published),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct ItemBuilder {
    title: String,
    link: String,
    description: String,
    summary: String,
    content: String,
    published: String,
}

impl ItemBuilder {
    fn push(&mut self, field: Field, text: &str) {
        let target = match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::Description => &mut self.description,
            Field::Summary => &mut self.summary,
            Field::Content => &mut self.content,
            // Atom carries both published and updated; keep the first seen
            Field::Published if !self.published.is_empty() => return,
            Field::Published => &mut self.published,
        };
        target.push_str(text);
    }

    fn build(self, source: &str) -> Option<NewsArticle> {
        let title = clean_text(&self.title);
        let url = self.link.trim().to_string();
        if title.is_empty() || url.is_empty() {
            return None;
        }

        let summary = [self.description, self.summary, self.content]
            .into_iter()
            .map(|s| clean_text(&s))
            .find(|s| !s.is_empty());

        Some(NewsArticle {
            title,
            url,
            summary,
            source: source.to_string(),
            published_at: parse_date(&self.published),
        })
    }
}

/// Parse an RSS or Atom document into articles attributed to `source`.
///
/// Items without a title or link are dropped. A document that is not a
/// feed at all is a decode failure; an empty feed is an empty list.
pub fn parse_feed(xml: &str, source: &str) -> Result<Vec<NewsArticle>, ProviderFailure> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut articles = Vec::new();
    let mut saw_feed_root = false;
    let mut item: Option<ItemBuilder> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let local = e.local_name();
                match local.as_ref() {
                    b"rss" | b"feed" | b"RDF" => saw_feed_root = true,
                    b"item" | b"entry" => {
                        item = Some(ItemBuilder::default());
                        field = None;
                    }
                    name => {
                        if let Some(current) = item.as_mut() {
                            field = Field::from_local_name(name);
                            if field == Some(Field::Link) {
                                if let Some(href) = href_attribute(&e) {
                                    current.link = href;
                                    field = None;
                                }
                            }
                        }
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                // Atom: <link rel="alternate" href="..."/>
                if e.local_name().as_ref() == b"link" {
                    if let Some(current) = item.as_mut() {
                        if current.link.is_empty() && is_alternate_link(&e) {
                            if let Some(href) = href_attribute(&e) {
                                current.link = href;
                            }
                        }
                    }
                }
            }
            Ok(Event::Text(text)) => {
                if let (Some(current), Some(f)) = (item.as_mut(), field) {
                    let decoded = match text.unescape() {
                        Ok(decoded) => decoded.into_owned(),
                        // Feeds often carry HTML entities such as &nbsp; that XML does not define
                        Err(_) => String::from_utf8_lossy(&text).into_owned(),
                    };
                    current.push(f, &decoded);
                }
            }
            Ok(Event::CData(data)) => {
                if let (Some(current), Some(f)) = (item.as_mut(), field) {
                    current.push(f, &String::from_utf8_lossy(&data));
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"item" | b"entry" => {
                    if let Some(article) = item.take().and_then(|b| b.build(source)) {
                        articles.push(article);
                    }
                    field = None;
                }
                _ => field = None,
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(ProviderFailure::Decode(format!(
                    "Malformed feed at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
    }

    if !saw_feed_root {
        return Err(ProviderFailure::Decode(
            "Document is not an RSS or Atom feed".to_string(),
        ));
    }

    Ok(articles)
}

fn href_attribute(e: &BytesStart<'_>) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == b"href")
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn is_alternate_link(e: &BytesStart<'_>) -> bool {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == b"rel")
        .and_then(|a| a.unescape_value().ok())
        .map(|rel| rel == "alternate")
        .unwrap_or(true)
}

/// Strip markup and collapse whitespace.
pub fn clean_text(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }

    let text: String = if raw.contains('<') || raw.contains('&') {
        let fragment = Html::parse_fragment(raw);
        fragment.root_element().text().collect::<Vec<_>>().join(" ")
    } else {
        raw.to_string()
    };

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// RSS uses RFC 2822 dates, Atom uses RFC 3339.
fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
