//! Provider chains per data category, built once at startup.

use std::sync::Arc;

use folio_market_data::{
    AlphaVantageClient, AlphaVantageFundamentalsProvider, AlphaVantageQuoteProvider,
    CommodityPrice, FinnhubClient, FinnhubNewsProvider, FinnhubQuoteProvider, Fundamentals,
    MetalPriceProvider, NewsArticle, ProviderDescriptor, Quote, RssNewsProvider,
};

use crate::config::Config;

/// Feeds are tried after the REST news API.
const FIRST_FEED_PRIORITY: u8 = 5;

#[derive(Clone, Default)]
pub struct ProviderCatalog {
    pub quotes: Vec<ProviderDescriptor<Quote>>,
    pub fundamentals: Vec<ProviderDescriptor<Fundamentals>>,
    pub commodities: Vec<ProviderDescriptor<CommodityPrice>>,
    pub news: Vec<ProviderDescriptor<Vec<NewsArticle>>>,
}

impl ProviderCatalog {
    /// Every adapter is registered even without an API key; a missing key
    /// surfaces as AUTH_ERROR on first use and disables that provider.
    pub fn from_config(config: &Config) -> Self {
        let finnhub = FinnhubClient::new(config.finnhub_api_key.clone());
        let alpha_vantage = AlphaVantageClient::new(config.alpha_vantage_api_key.clone());

        let quotes = vec![
            ProviderDescriptor::new(Arc::new(FinnhubQuoteProvider::new(finnhub.clone()))),
            ProviderDescriptor::new(Arc::new(AlphaVantageQuoteProvider::new(
                alpha_vantage.clone(),
            ))),
        ];
        let fundamentals = vec![ProviderDescriptor::new(Arc::new(
            AlphaVantageFundamentalsProvider::new(alpha_vantage),
        ))];
        let commodities = vec![ProviderDescriptor::new(Arc::new(MetalPriceProvider::new(
            config.metal_price_api_key.clone(),
        )))];

        let mut news: Vec<ProviderDescriptor<Vec<NewsArticle>>> = vec![ProviderDescriptor::new(
            Arc::new(FinnhubNewsProvider::new(finnhub)),
        )];
        for (i, template) in config.news_feeds.iter().enumerate() {
            let priority = FIRST_FEED_PRIORITY.saturating_add(i as u8);
            let feed = RssNewsProvider::new(format!("RSS_{}", i + 1), template.clone())
                .with_priority(priority);
            news.push(ProviderDescriptor::new(Arc::new(feed)));
        }

        tracing::info!(
            "Provider catalog: {} quote, {} fundamentals, {} commodity, {} news providers",
            quotes.len(),
            fundamentals.len(),
            commodities.len(),
            news.len()
        );

        Self {
            quotes,
            fundamentals,
            commodities,
            news,
        }
    }
}
