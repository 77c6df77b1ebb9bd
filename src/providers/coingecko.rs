//! CoinGecko market data API
//!
//! Request construction, raw response schemas and the normalization step
//! for each endpoint. Every method here performs exactly one HTTP attempt;
//! retrying and caching are layered on top by the client.

use crate::{
    constants::{
        COINGECKO_COINS_ENDPOINT, COINGECKO_GLOBAL_ENDPOINT, COINGECKO_MARKETS_ENDPOINT,
        COINGECKO_SEARCH_ENDPOINT, COINGECKO_TRENDING_ENDPOINT, PRICE_CHANGE_WINDOWS,
    },
    error::ProviderError,
    transport::Transport,
    types::{
        null_as_default, ChartDays, ChartSeries, CoinDetail, CoinSummary, GlobalStats,
        SearchResult,
    },
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;

/// Raw `/coins/markets` record; any field may be missing or null
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawMarketCoin {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    current_price: Option<f64>,
    #[serde(default)]
    market_cap: Option<f64>,
    #[serde(default)]
    total_volume: Option<f64>,
    #[serde(default)]
    price_change_percentage_1h_in_currency: Option<f64>,
    #[serde(default)]
    price_change_percentage_24h_in_currency: Option<f64>,
    #[serde(default)]
    price_change_percentage_7d_in_currency: Option<f64>,
    #[serde(default)]
    price_change_percentage_30d_in_currency: Option<f64>,
    #[serde(default)]
    price_change_percentage_1y_in_currency: Option<f64>,
}

impl From<RawMarketCoin> for CoinSummary {
    fn from(raw: RawMarketCoin) -> Self {
        Self {
            id: raw.id,
            name: raw.name.unwrap_or_default(),
            symbol: raw.symbol.unwrap_or_default(),
            image: raw.image.unwrap_or_default(),
            price: raw.current_price.unwrap_or(0.0),
            market_cap: raw.market_cap.unwrap_or(0.0),
            volume_24h: raw.total_volume.unwrap_or(0.0),
            price_change_percentage_1h: raw.price_change_percentage_1h_in_currency.unwrap_or(0.0),
            price_change_percentage_24h: raw.price_change_percentage_24h_in_currency.unwrap_or(0.0),
            price_change_percentage_7d: raw.price_change_percentage_7d_in_currency.unwrap_or(0.0),
            price_change_percentage_30d: raw.price_change_percentage_30d_in_currency.unwrap_or(0.0),
            price_change_percentage_1y: raw.price_change_percentage_1y_in_currency.unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawSearchResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    coins: Vec<RawSearchCoin>,
}

#[derive(Debug, Deserialize)]
struct RawSearchCoin {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    thumb: Option<String>,
}

impl From<RawSearchCoin> for SearchResult {
    fn from(raw: RawSearchCoin) -> Self {
        Self {
            id: raw.id,
            name: raw.name.unwrap_or_default(),
            symbol: raw.symbol.unwrap_or_default(),
            image: raw.thumb.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawGlobalResponse {
    data: GlobalStats,
}

#[derive(Debug, Deserialize)]
struct RawTrendingResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    coins: Vec<RawTrendingEntry>,
}

#[derive(Debug, Deserialize)]
struct RawTrendingEntry {
    item: RawTrendingItem,
}

#[derive(Debug, Deserialize)]
struct RawTrendingItem {
    id: String,
}

/// CoinGecko v3 endpoints
pub struct CoinGeckoApi {
    transport: Arc<dyn Transport>,
    base_url: String,
    vs_currency: String,
}

impl CoinGeckoApi {
    /// Creates an API wrapper on top of `transport`
    pub fn new(
        transport: Arc<dyn Transport>,
        base_url: impl Into<String>,
        vs_currency: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            vs_currency: vs_currency.into(),
        }
    }

    pub fn vs_currency(&self) -> &str {
        &self.vs_currency
    }

    /// Builds the full URL for an endpoint path
    fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let url = self.build_url(path);
        let response = self.transport.get(&url, query).await?.error_for_status()?;

        serde_json::from_str(&response.body).map_err(|e| {
            ProviderError::invalid_response(format!(
                "Failed to parse CoinGecko response from {}: {}",
                path, e
            ))
        })
    }

    /// One page of coins ordered by market cap, normalized
    pub async fn markets_page(
        &self,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<CoinSummary>, ProviderError> {
        let query = [
            ("vs_currency", self.vs_currency.clone()),
            ("order", "market_cap_desc".to_string()),
            ("per_page", per_page.to_string()),
            ("page", page.to_string()),
            ("price_change_percentage", PRICE_CHANGE_WINDOWS.to_string()),
        ];
        let raw: Vec<RawMarketCoin> = self.get_json(COINGECKO_MARKETS_ENDPOINT, &query).await?;

        tracing::debug!(page, per_page, count = raw.len(), "Fetched market page from CoinGecko");
        Ok(raw.into_iter().map(CoinSummary::from).collect())
    }

    /// Market records for exactly `ids`, normalized
    pub async fn markets_for_ids(&self, ids: &[String]) -> Result<Vec<CoinSummary>, ProviderError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let query = [
            ("vs_currency", self.vs_currency.clone()),
            ("ids", ids.join(",")),
            ("per_page", ids.len().max(1).to_string()),
            ("price_change_percentage", PRICE_CHANGE_WINDOWS.to_string()),
        ];
        let raw: Vec<RawMarketCoin> = self.get_json(COINGECKO_MARKETS_ENDPOINT, &query).await?;
        Ok(raw.into_iter().map(CoinSummary::from).collect())
    }

    /// Detail record for one coin
    pub async fn coin(&self, id: &str) -> Result<CoinDetail, ProviderError> {
        let path = format!("{}/{}", COINGECKO_COINS_ENDPOINT, encode_path_segment(id)?);
        self.get_json(&path, &[]).await
    }

    /// Free-text search matches
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ProviderError> {
        let raw: RawSearchResponse = self
            .get_json(COINGECKO_SEARCH_ENDPOINT, &[("query", query.to_string())])
            .await?;
        Ok(raw.coins.into_iter().map(SearchResult::from).collect())
    }

    /// Global market aggregates
    pub async fn global(&self) -> Result<GlobalStats, ProviderError> {
        let raw: RawGlobalResponse = self.get_json(COINGECKO_GLOBAL_ENDPOINT, &[]).await?;
        Ok(raw.data)
    }

    /// Ids of currently trending coins, in upstream order
    pub async fn trending_ids(&self) -> Result<Vec<String>, ProviderError> {
        let raw: RawTrendingResponse = self.get_json(COINGECKO_TRENDING_ENDPOINT, &[]).await?;
        Ok(raw.coins.into_iter().map(|entry| entry.item.id).collect())
    }

    /// Historical price, market cap and volume series
    pub async fn market_chart(
        &self,
        id: &str,
        vs_currency: &str,
        days: ChartDays,
    ) -> Result<ChartSeries, ProviderError> {
        let path = format!(
            "{}/{}/market_chart",
            COINGECKO_COINS_ENDPOINT,
            encode_path_segment(id)?
        );
        let query = [
            ("vs_currency", vs_currency.to_string()),
            ("days", days.to_string()),
        ];
        self.get_json(&path, &query).await
    }
}

/// Coin ids are lowercase slugs; anything that would escape the path
/// segment is rejected before a request is built
fn encode_path_segment(id: &str) -> Result<&str, ProviderError> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && id != "."
        && id != "..";

    if valid {
        Ok(id)
    } else {
        Err(ProviderError::setup(format!("Invalid coin id: {:?}", id)))
    }
}
