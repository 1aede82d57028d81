//! Market data models
//!
//! This module contains the data types served by the access layer:
//! - `types` - Type aliases for common identifiers (ProviderId)
//! - `quote` - Latest quote for a listed security (Quote)
//! - `fundamentals` - Company overview and ratios (Fundamentals)
//! - `commodity` - Spot price of a commodity (CommodityPrice)
//! - `news` - News articles from APIs and feeds (NewsArticle)

mod commodity;
mod fundamentals;
mod news;
mod quote;
mod types;

pub use commodity::CommodityPrice;
pub use fundamentals::Fundamentals;
pub use news::NewsArticle;
pub use quote::Quote;
pub use types::ProviderId;
