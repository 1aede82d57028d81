use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Spot price of a commodity (precious metals, energy)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommodityPrice {
    /// Commodity code (e.g., "XAU" for gold)
    pub symbol: String,

    /// Price per unit in `currency`
    pub price: Decimal,

    /// Unit the price refers to (e.g., "troy_ounce")
    pub unit: String,

    pub currency: String,

    pub timestamp: DateTime<Utc>,

    pub source: String,
}
