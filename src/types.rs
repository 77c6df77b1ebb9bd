//! Domain records returned by the market data client

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Normalized market record for one coin
///
/// Every numeric field is always a number: values missing upstream are 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinSummary {
    pub id: String,
    pub name: String,
    pub symbol: String,
    /// Logo URL
    pub image: String,
    pub price: f64,
    pub market_cap: f64,
    pub volume_24h: f64,
    pub price_change_percentage_1h: f64,
    pub price_change_percentage_24h: f64,
    pub price_change_percentage_7d: f64,
    pub price_change_percentage_30d: f64,
    pub price_change_percentage_1y: f64,
}

/// A free-text search match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub name: String,
    pub symbol: String,
    /// Thumbnail URL
    pub image: String,
}

/// Full detail record for one coin
///
/// Nested structures that upstream omits are `None`; consumers render them
/// as "N/A". Fields this crate does not model are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinDetail {
    pub id: String,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image: Option<CoinImage>,
    #[serde(default)]
    pub description: Option<CoinDescription>,
    #[serde(default)]
    pub links: Option<CoinLinks>,
    #[serde(default)]
    pub market_data: Option<CoinMarketData>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CoinDetail {
    pub fn current_price(&self, vs_currency: &str) -> Option<f64> {
        self.market_data.as_ref()?.current_price.get(vs_currency).copied()
    }

    pub fn market_cap(&self, vs_currency: &str) -> Option<f64> {
        self.market_data.as_ref()?.market_cap.get(vs_currency).copied()
    }

    /// All-time high in `vs_currency`
    pub fn ath(&self, vs_currency: &str) -> Option<f64> {
        self.market_data.as_ref()?.ath.get(vs_currency).copied()
    }

    pub fn ath_date(&self, vs_currency: &str) -> Option<DateTime<Utc>> {
        self.market_data.as_ref()?.ath_date.get(vs_currency).copied()
    }

    /// First non-empty homepage link
    pub fn homepage(&self) -> Option<&str> {
        self.links
            .as_ref()?
            .homepage
            .iter()
            .map(|url| url.trim())
            .find(|url| !url.is_empty())
    }

    /// English description, if non-empty
    pub fn description_en(&self) -> Option<&str> {
        self.description
            .as_ref()
            .and_then(|d| d.en.as_deref())
            .filter(|text| !text.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinImage {
    #[serde(default)]
    pub thumb: Option<String>,
    #[serde(default)]
    pub small: Option<String>,
    #[serde(default)]
    pub large: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinDescription {
    #[serde(default)]
    pub en: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinLinks {
    #[serde(default, deserialize_with = "null_as_default")]
    pub homepage: Vec<String>,
    #[serde(default)]
    pub twitter_screen_name: Option<String>,
    #[serde(default)]
    pub facebook_username: Option<String>,
    #[serde(default)]
    pub subreddit_url: Option<String>,
}

/// Market figures of a detail record, keyed by quote currency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinMarketData {
    #[serde(default, deserialize_with = "null_as_default")]
    pub current_price: HashMap<String, f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub market_cap: HashMap<String, f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_volume: HashMap<String, f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ath: HashMap<String, f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ath_date: HashMap<String, DateTime<Utc>>,
    #[serde(default)]
    pub total_supply: Option<f64>,
    #[serde(default)]
    pub circulating_supply: Option<f64>,
    #[serde(default)]
    pub max_supply: Option<f64>,
}

/// Global market aggregates, passed through from upstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalStats {
    #[serde(default)]
    pub active_cryptocurrencies: Option<u64>,
    #[serde(default)]
    pub markets: Option<u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_market_cap: HashMap<String, f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_volume: HashMap<String, f64>,
    /// Dominance by coin symbol, in percent
    #[serde(default, deserialize_with = "null_as_default")]
    pub market_cap_percentage: HashMap<String, f64>,
    #[serde(default)]
    pub market_cap_change_percentage_24h_usd: Option<f64>,
    /// Unix seconds
    #[serde(default)]
    pub updated_at: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GlobalStats {
    pub fn total_market_cap_in(&self, vs_currency: &str) -> Option<f64> {
        self.total_market_cap.get(vs_currency).copied()
    }

    pub fn total_volume_in(&self, vs_currency: &str) -> Option<f64> {
        self.total_volume.get(vs_currency).copied()
    }

    /// Market share of `symbol` in percent
    pub fn dominance(&self, symbol: &str) -> Option<f64> {
        self.market_cap_percentage
            .get(&symbol.to_lowercase())
            .copied()
    }
}

/// Historical series from the market chart endpoint
///
/// Each point is `[timestamp_ms, value]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    #[serde(default, deserialize_with = "null_as_default")]
    pub prices: Vec<[f64; 2]>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub market_caps: Vec<[f64; 2]>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_volumes: Vec<[f64; 2]>,
}

impl ChartSeries {
    /// Price points with their timestamps decoded
    pub fn price_points(&self) -> impl Iterator<Item = (DateTime<Utc>, f64)> + '_ {
        self.prices.iter().filter_map(|[ts, price]| {
            DateTime::from_timestamp_millis(*ts as i64).map(|time| (time, *price))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

/// Range of a market chart query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChartDays {
    /// The last N days
    Days(u32),
    /// Full history
    Max,
}

impl From<u32> for ChartDays {
    fn from(days: u32) -> Self {
        ChartDays::Days(days)
    }
}

impl fmt::Display for ChartDays {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChartDays::Days(days) => write!(f, "{}", days),
            ChartDays::Max => write!(f, "max"),
        }
    }
}

/// Treats an explicit JSON `null` like an absent field
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
