//! Integration tests for `Orchestrator::fetch_with_merge`.

mod common;

use std::time::Duration;

use common::*;
use folio_market_data::provider::rss::parse_feed;
use folio_market_data::{
    DataSource, ErrorKind, FetchRequest, MergeRequest, Merged, NewsArticle, SkipReason,
};

fn article(title: &str, url: &str, source: &str) -> NewsArticle {
    NewsArticle {
        title: title.to_string(),
        url: url.to_string(),
        summary: None,
        source: source.to_string(),
        published_at: None,
    }
}

fn news_request(providers: Vec<folio_market_data::ProviderDescriptor<Vec<NewsArticle>>>) -> MergeRequest<Vec<NewsArticle>> {
    MergeRequest::list(
        FetchRequest::new("AAPL", providers).cache_key_prefix("news"),
        NewsArticle::dedupe_key,
    )
}

#[tokio::test]
async fn test_merge_dedupes_by_url_keeping_first_seen() {
    let (orchestrator, _clock) = orchestrator();
    let first = Scripted::ok(
        "FIRST",
        1,
        vec![
            article("Apple beats estimates", "https://news.example.com/Apple-Beats", "FIRST"),
            article("Fed holds", "https://news.example.com/fed", "FIRST"),
        ],
    )
    .arc();
    let second = Scripted::ok(
        "SECOND",
        2,
        vec![
            article("Apple tops forecasts", "https://NEWS.example.com/apple-beats", "SECOND"),
            article("Oil rallies", "https://news.example.com/oil", "SECOND"),
        ],
    )
    .arc();

    let result = orchestrator
        .fetch_with_merge(news_request(vec![descriptor(&first), descriptor(&second)]))
        .await;

    let articles = result.data.unwrap();
    let titles: Vec<_> = articles.iter().map(|a| a.title.as_str()).collect();
    assert_eq!(titles, vec!["Apple beats estimates", "Fed holds", "Oil rallies"]);
    assert!(result.metadata.deduplicated);
    assert_eq!(
        names(&result.metadata.providers_succeeded),
        vec!["FIRST", "SECOND"]
    );
    assert_eq!(result.source, Some(DataSource::Provider("FIRST".into())));
}

#[tokio::test]
async fn test_merge_without_duplicates_reports_none() {
    let (orchestrator, _clock) = orchestrator();
    let a = Scripted::ok("A", 1, vec![article("a", "https://a.example.com/1", "A")]).arc();
    let b = Scripted::ok("B", 2, vec![article("b", "https://b.example.com/1", "B")]).arc();

    let result = orchestrator
        .fetch_with_merge(news_request(vec![descriptor(&a), descriptor(&b)]))
        .await;

    assert_eq!(result.data.unwrap().len(), 2);
    assert!(!result.metadata.deduplicated);
}

#[tokio::test]
async fn test_partial_success_is_success() {
    let (orchestrator, _clock) = orchestrator();
    let broken = Scripted::<Vec<NewsArticle>>::failing("BROKEN", 1, server_error).arc();
    let healthy = Scripted::ok(
        "HEALTHY",
        2,
        vec![article("Oil rallies", "https://news.example.com/oil", "HEALTHY")],
    )
    .arc();

    let result = orchestrator
        .fetch_with_merge(news_request(vec![descriptor(&broken), descriptor(&healthy)]))
        .await;

    assert_eq!(result.data.as_ref().map(Vec::len), Some(1));
    assert_eq!(result.source, Some(DataSource::Provider("HEALTHY".into())));
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].code, ErrorKind::HttpError);
    assert_eq!(
        names(&result.metadata.providers_attempted),
        vec!["BROKEN", "HEALTHY"]
    );
    assert!(result.is_degraded());
}

#[tokio::test(start_paused = true)]
async fn test_results_reach_reducer_in_priority_order() {
    let (orchestrator, _clock) = orchestrator();
    let slow_primary = Scripted::ok("PRIMARY", 1, vec![article("p", "https://p.example.com", "PRIMARY")])
        .with_delay(Duration::from_millis(200))
        .arc();
    let fast_secondary = Scripted::ok("SECONDARY", 2, vec![article("s", "https://s.example.com", "SECONDARY")])
        .with_delay(Duration::from_millis(100))
        .arc();

    let result = orchestrator
        .fetch_with_merge(news_request(vec![
            descriptor(&fast_secondary),
            descriptor(&slow_primary),
        ]))
        .await;

    let sources: Vec<_> = result
        .data
        .unwrap()
        .into_iter()
        .map(|a| a.source)
        .collect();
    assert_eq!(sources, vec!["PRIMARY", "SECONDARY"]);
    // Both calls overlapped
    assert!(result.metadata.total_duration < Duration::from_millis(300));
}

#[tokio::test]
async fn test_custom_reducer() {
    let (orchestrator, _clock) = orchestrator();
    let a = Scripted::ok("A", 1, 3u32).arc();
    let b = Scripted::ok("B", 2, 9u32).arc();

    let request = MergeRequest::new(
        FetchRequest::new("AAPL", vec![descriptor(&a), descriptor(&b)]).cache_key_prefix("max"),
        |values: Vec<u32>| Merged {
            value: values.into_iter().max().unwrap_or_default(),
            deduplicated: false,
        },
    );
    let result = orchestrator.fetch_with_merge(request).await;

    assert_eq!(result.data, Some(9));
}

#[tokio::test]
async fn test_open_circuit_is_left_out_of_the_merge() {
    let (orchestrator, _clock) = orchestrator();
    let tripped = Scripted::ok("TRIPPED", 1, vec![article("t", "https://t.example.com", "TRIPPED")]).arc();
    let healthy = Scripted::ok("HEALTHY", 2, vec![article("h", "https://h.example.com", "HEALTHY")]).arc();

    for _ in 0..3 {
        orchestrator.breakers().record_failure("TRIPPED");
    }

    let result = orchestrator
        .fetch_with_merge(news_request(vec![descriptor(&tripped), descriptor(&healthy)]))
        .await;

    assert_eq!(result.data.as_ref().map(Vec::len), Some(1));
    assert_eq!(names(&result.metadata.providers_attempted), vec!["HEALTHY"]);
    assert_eq!(result.metadata.skipped[0].reason, SkipReason::CircuitOpen);
    assert!(result.metadata.circuit_breaker_triggered);
    assert_eq!(tripped.calls(), 0);
}

#[tokio::test]
async fn test_merge_with_every_provider_failing() {
    let (orchestrator, _clock) = orchestrator();
    let a = Scripted::<Vec<NewsArticle>>::failing("A", 1, rate_limit_notice).arc();
    let b = Scripted::<Vec<NewsArticle>>::failing("B", 2, timeout).arc();

    let result = orchestrator
        .fetch_with_merge(news_request(vec![descriptor(&a), descriptor(&b)]))
        .await;

    assert!(result.data.is_none());
    assert!(result.source.is_none());
    assert_eq!(result.errors.len(), 2);
    assert_eq!(result.http_status(), 429);
}

#[tokio::test]
async fn test_merged_result_is_cached() {
    let (orchestrator, _clock) = orchestrator();
    let a = Scripted::ok("A", 1, vec![article("a", "https://a.example.com", "A")]).arc();

    orchestrator
        .fetch_with_merge(news_request(vec![descriptor(&a)]))
        .await;
    let second = orchestrator
        .fetch_with_merge(news_request(vec![descriptor(&a)]))
        .await;

    assert!(second.cached);
    assert_eq!(second.source, Some(DataSource::Cache));
    assert_eq!(a.calls(), 1);
}

#[tokio::test]
async fn test_feed_articles_merge_with_api_articles() {
    let (orchestrator, _clock) = orchestrator();
    let feed = Scripted::new("YAHOO_RSS", 1, |_| {
        parse_feed(include_str!("fixtures/yahoo_headlines.xml"), "Yahoo Finance")
    })
    .arc();
    let api = Scripted::ok(
        "FINNHUB_NEWS",
        2,
        vec![
            article(
                "Chip stocks fall on new export rules",
                "https://finance.example.com/news/chips-slide",
                "Reuters",
            ),
            article("Oil rallies", "https://news.example.com/oil", "Reuters"),
        ],
    )
    .arc();

    let result = orchestrator
        .fetch_with_merge(news_request(vec![descriptor(&api), descriptor(&feed)]))
        .await;

    let articles = result.data.unwrap();
    assert_eq!(articles.len(), 4);
    assert!(result.metadata.deduplicated);

    let chips = articles
        .iter()
        .find(|a| a.dedupe_key() == "https://finance.example.com/news/chips-slide")
        .unwrap();
    assert_eq!(chips.title, "Chipmakers slide after export curbs");
    assert_eq!(chips.source, "Yahoo Finance");
    assert_eq!(articles.last().map(|a| a.title.as_str()), Some("Oil rallies"));
}
