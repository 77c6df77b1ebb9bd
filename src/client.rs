//! Market data client
//!
//! Single gateway for upstream market-data reads. Every operation consults
//! the cache first, falls back to a retried live fetch, and writes the
//! normalized result back with the configured TTL.
//!
//! Operations come in two flavors:
//!
//! - `try_*` returns `Result<T, ProviderError>` so callers can tell a failed
//!   fetch from an empty answer.
//! - The plain names log the categorized failure and return an empty
//!   collection or `None` instead. No error crosses into the caller.
//!
//! ```no_run
//! use coin_market_client::{ClientConfig, MarketDataClient};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(MarketDataClient::new(ClientConfig::from_env()?)?);
//!
//! for coin in client.list_coins(1, 50, false).await {
//!     println!("{:<8} ${:.2}", coin.symbol, coin.price);
//! }
//!
//! match client.try_get_global_stats(false).await {
//!     Ok(stats) => println!("BTC dominance: {:?}", stats.dominance("btc")),
//!     Err(e) => eprintln!("Global stats unavailable: {}", e),
//! }
//! # Ok(())
//! # }
//! ```

use crate::{
    cache::{wait_for_flight, Flight, ResponseCache},
    config::ClientConfig,
    constants::{MOVERS_LIMIT, MOVERS_SAMPLE_SIZE},
    error::{FailureKind, ProviderError},
    metrics::{ClientMetrics, MetricsCollector},
    providers::CoinGeckoApi,
    retry::execute_with_retry,
    transport::{HttpTransport, Transport},
    types::{ChartDays, ChartSeries, CoinDetail, CoinSummary, GlobalStats, SearchResult},
};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use uuid::Uuid;

/// Direction for ranking coins by 24h change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Movers {
    Gainers,
    Losers,
}

/// Cached, retrying client for the market data API
pub struct MarketDataClient {
    api: CoinGeckoApi,
    cache: ResponseCache,
    metrics: MetricsCollector,
    config: ClientConfig,
}

impl MarketDataClient {
    /// Creates a client backed by a reqwest transport
    pub fn new(config: ClientConfig) -> Result<Self, ProviderError> {
        let transport = Arc::new(HttpTransport::new()?);
        Ok(Self::with_transport(config, transport))
    }

    /// Creates a client on top of a custom transport
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        tracing::debug!(
            transport = transport.transport_name(),
            base_url = %config.base_url,
            ttl_secs = config.cache_ttl.as_secs(),
            max_retries = config.retry.max_retries,
            "Creating market data client"
        );

        let api = CoinGeckoApi::new(transport, config.base_url.clone(), config.vs_currency.clone());
        let cache = ResponseCache::new(config.cache_ttl);

        Self {
            api,
            cache,
            metrics: MetricsCollector::new(),
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The response cache owned by this client
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Gets request metrics including latency percentiles and cache hit rate
    pub async fn metrics(&self) -> ClientMetrics {
        self.metrics.get_metrics().await
    }

    /// Drops the cached entry for `key`
    pub async fn invalidate(&self, key: &str) -> bool {
        self.cache.remove(key).await
    }

    /// Drops every cached entry
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    /// Drops cached entries whose TTL has elapsed
    pub async fn purge_expired(&self) -> usize {
        self.cache.purge_expired().await
    }

    // ---------------------------------------------------------------------
    // Fallible operations
    // ---------------------------------------------------------------------

    /// Fetches page `page` (1-indexed) of `per_page` coins by market cap
    pub async fn try_list_coins(
        &self,
        page: u32,
        per_page: u32,
        force_refresh: bool,
    ) -> Result<Vec<CoinSummary>, ProviderError> {
        if page == 0 || per_page == 0 {
            return Err(ProviderError::setup(format!(
                "page and per_page must be at least 1 (got {} and {})",
                page, per_page
            )));
        }

        let key = format!("coins_{}_{}", page, per_page);
        self.cached("list_coins", &key, force_refresh, |request_id| {
            self.request(request_id, "list_coins", move |_| {
                self.api.markets_page(page, per_page)
            })
        })
        .await
    }

    /// Fetches the full detail record for one coin
    pub async fn try_get_coin_by_id(
        &self,
        id: &str,
        force_refresh: bool,
    ) -> Result<CoinDetail, ProviderError> {
        let key = format!("coin_{}", id);
        self.cached("get_coin_by_id", &key, force_refresh, |request_id| {
            self.request(request_id, "get_coin_by_id", move |_| self.api.coin(id))
        })
        .await
    }

    /// Fetches fuzzy matches for `query`
    ///
    /// Surrounding whitespace is ignored, so `" btc "` and `"btc"` share one
    /// cache entry. A blank query matches nothing and issues no request.
    pub async fn try_search_coins(
        &self,
        query: &str,
        force_refresh: bool,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let key = format!("search_{}", query);
        self.cached("search_coins", &key, force_refresh, |request_id| {
            self.request(request_id, "search_coins", move |_| self.api.search(query))
        })
        .await
    }

    /// Fetches global market aggregates
    pub async fn try_get_global_stats(
        &self,
        force_refresh: bool,
    ) -> Result<GlobalStats, ProviderError> {
        self.cached("get_global_stats", "global_stats", force_refresh, |request_id| {
            self.request(request_id, "get_global_stats", |_| self.api.global())
        })
        .await
    }

    /// Fetches market records for the currently trending coins
    ///
    /// The result holds exactly the trending ids, in trending order. Ids the
    /// market lookup does not return are left out.
    pub async fn try_get_trending(
        &self,
        force_refresh: bool,
    ) -> Result<Vec<CoinSummary>, ProviderError> {
        self.cached("get_trending", "trending", force_refresh, |request_id| {
            self.fetch_trending(request_id)
        })
        .await
    }

    /// Top 10 coins by 24h change among the 100 largest
    pub async fn try_get_top_gainers(
        &self,
        force_refresh: bool,
    ) -> Result<Vec<CoinSummary>, ProviderError> {
        self.movers(Movers::Gainers, force_refresh).await
    }

    /// Bottom 10 coins by 24h change among the 100 largest
    pub async fn try_get_top_losers(
        &self,
        force_refresh: bool,
    ) -> Result<Vec<CoinSummary>, ProviderError> {
        self.movers(Movers::Losers, force_refresh).await
    }

    /// Fetches the historical series for one coin
    pub async fn try_get_coin_market_chart(
        &self,
        id: &str,
        vs_currency: &str,
        days: ChartDays,
        force_refresh: bool,
    ) -> Result<ChartSeries, ProviderError> {
        let key = format!("chart_{}_{}_{}", id, vs_currency, days);
        self.cached("get_coin_market_chart", &key, force_refresh, |request_id| {
            self.request(request_id, "get_coin_market_chart", move |_| {
                self.api.market_chart(id, vs_currency, days)
            })
        })
        .await
    }

    // ---------------------------------------------------------------------
    // Infallible operations
    // ---------------------------------------------------------------------

    /// Like [`Self::try_list_coins`], empty on failure
    pub async fn list_coins(
        &self,
        page: u32,
        per_page: u32,
        force_refresh: bool,
    ) -> Vec<CoinSummary> {
        self.try_list_coins(page, per_page, force_refresh)
            .await
            .unwrap_or_else(|e| unavailable("list_coins", &e))
    }

    /// Like [`Self::try_get_coin_by_id`], `None` on failure
    pub async fn get_coin_by_id(&self, id: &str, force_refresh: bool) -> Option<CoinDetail> {
        self.try_get_coin_by_id(id, force_refresh)
            .await
            .map_err(|e| report_failure("get_coin_by_id", &e))
            .ok()
    }

    /// Like [`Self::try_search_coins`], empty on failure
    pub async fn search_coins(&self, query: &str, force_refresh: bool) -> Vec<SearchResult> {
        self.try_search_coins(query, force_refresh)
            .await
            .unwrap_or_else(|e| unavailable("search_coins", &e))
    }

    /// Like [`Self::try_get_global_stats`], `None` on failure
    pub async fn get_global_stats(&self, force_refresh: bool) -> Option<GlobalStats> {
        self.try_get_global_stats(force_refresh)
            .await
            .map_err(|e| report_failure("get_global_stats", &e))
            .ok()
    }

    /// Like [`Self::try_get_trending`], empty on failure
    pub async fn get_trending(&self, force_refresh: bool) -> Vec<CoinSummary> {
        self.try_get_trending(force_refresh)
            .await
            .unwrap_or_else(|e| unavailable("get_trending", &e))
    }

    /// Like [`Self::try_get_top_gainers`], empty on failure
    pub async fn get_top_gainers(&self, force_refresh: bool) -> Vec<CoinSummary> {
        self.try_get_top_gainers(force_refresh)
            .await
            .unwrap_or_else(|e| unavailable("get_top_gainers", &e))
    }

    /// Like [`Self::try_get_top_losers`], empty on failure
    pub async fn get_top_losers(&self, force_refresh: bool) -> Vec<CoinSummary> {
        self.try_get_top_losers(force_refresh)
            .await
            .unwrap_or_else(|e| unavailable("get_top_losers", &e))
    }

    /// Like [`Self::try_get_coin_market_chart`], `None` on failure
    pub async fn get_coin_market_chart(
        &self,
        id: &str,
        vs_currency: &str,
        days: ChartDays,
        force_refresh: bool,
    ) -> Option<ChartSeries> {
        self.try_get_coin_market_chart(id, vs_currency, days, force_refresh)
            .await
            .map_err(|e| report_failure("get_coin_market_chart", &e))
            .ok()
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    async fn movers(
        &self,
        direction: Movers,
        force_refresh: bool,
    ) -> Result<Vec<CoinSummary>, ProviderError> {
        let (operation, key) = match direction {
            Movers::Gainers => ("get_top_gainers", "top_gainers"),
            Movers::Losers => ("get_top_losers", "top_losers"),
        };

        self.cached(operation, key, force_refresh, |_| {
            self.fetch_movers(direction, force_refresh)
        })
        .await
    }

    async fn fetch_movers(
        &self,
        direction: Movers,
        force_refresh: bool,
    ) -> Result<Vec<CoinSummary>, ProviderError> {
        let coins = self
            .try_list_coins(1, MOVERS_SAMPLE_SIZE, force_refresh)
            .await?;
        Ok(rank_by_24h_change(coins, direction, MOVERS_LIMIT))
    }

    async fn fetch_trending(&self, request_id: Uuid) -> Result<Vec<CoinSummary>, ProviderError> {
        let ids = self
            .request(request_id, "get_trending.ids", |_| self.api.trending_ids())
            .await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let coins = self
            .request(request_id, "get_trending.markets", |_| {
                self.api.markets_for_ids(&ids)
            })
            .await?;

        let mut by_id: HashMap<String, CoinSummary> = coins
            .into_iter()
            .map(|coin| (coin.id.clone(), coin))
            .collect();
        let trending: Vec<CoinSummary> = ids.iter().filter_map(|id| by_id.remove(id)).collect();

        if trending.len() < ids.len() {
            tracing::warn!(
                %request_id,
                expected = ids.len(),
                found = trending.len(),
                "Market lookup missed some trending coins"
            );
        }
        Ok(trending)
    }

    /// Serves `key` from cache or runs `fetch` and caches its result
    ///
    /// Concurrent callers for the same key share one fetch: the first runs
    /// it and the rest receive its outcome, success or error. `force_refresh`
    /// skips the cache reads but still joins a fetch already running.
    async fn cached<T, F, Fut>(
        &self,
        operation: &'static str,
        key: &str,
        force_refresh: bool,
        fetch: F,
    ) -> Result<T, ProviderError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(Uuid) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        if !force_refresh {
            if let Some(hit) = self.cache.get::<T>(key).await {
                self.metrics.record_cache_hit().await;
                tracing::debug!(operation, cache_key = key, "Cache hit");
                return Ok(hit);
            }
        }

        let leader = loop {
            match self.cache.join_flight(key) {
                Flight::Leader(leader) => break leader,
                Flight::Follower(rx) => {
                    tracing::debug!(operation, cache_key = key, "Joining in-flight request");
                    if let Some(outcome) = wait_for_flight(rx).await {
                        let value = outcome?;
                        return Ok(serde_json::from_value(value)?);
                    }
                }
            }
        };

        if !force_refresh {
            // A flight that finished since the first read may have filled the entry.
            if let Some(hit) = self.cache.get::<T>(key).await {
                self.metrics.record_cache_hit().await;
                tracing::debug!(operation, cache_key = key, "Cache filled by concurrent request");
                leader.complete(serde_json::to_value(&hit).map_err(ProviderError::from));
                return Ok(hit);
            }
            self.metrics.record_cache_miss().await;
        }

        let request_id = Uuid::new_v4();
        tracing::debug!(
            %request_id,
            operation,
            cache_key = key,
            force_refresh,
            "Fetching from upstream"
        );

        let result = fetch(request_id).await;
        let shared = match &result {
            Ok(value) => serde_json::to_value(value).map_err(ProviderError::from),
            Err(e) => Err(e.clone()),
        };

        match &shared {
            Ok(value) => self.cache.insert_value(key, value.clone()).await,
            Err(e) if result.is_ok() => {
                tracing::warn!(operation, cache_key = key, error = %e, "Failed to cache response");
            }
            Err(_) => {}
        }
        leader.complete(shared);
        result
    }

    /// Runs one logical upstream request under the retry policy
    async fn request<T, F, Fut>(
        &self,
        request_id: Uuid,
        label: &'static str,
        op: F,
    ) -> Result<T, ProviderError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let start = Instant::now();
        let outcome = execute_with_retry(&self.config.retry, request_id, label, op).await;

        self.metrics
            .record_fetch(start.elapsed(), outcome.result.is_ok(), outcome.retries)
            .await;

        if outcome.result.is_ok() {
            tracing::debug!(
                %request_id,
                request = label,
                retries = outcome.retries,
                latency_ms = start.elapsed().as_millis() as u64,
                "Upstream request succeeded"
            );
        }
        outcome.result
    }
}

/// Orders coins by 24h change and keeps the first `limit`
///
/// The sort is stable, so ties keep their listing order.
fn rank_by_24h_change(
    mut coins: Vec<CoinSummary>,
    direction: Movers,
    limit: usize,
) -> Vec<CoinSummary> {
    match direction {
        Movers::Gainers => coins.sort_by(|a, b| {
            b.price_change_percentage_24h
                .total_cmp(&a.price_change_percentage_24h)
        }),
        Movers::Losers => coins.sort_by(|a, b| {
            a.price_change_percentage_24h
                .total_cmp(&b.price_change_percentage_24h)
        }),
    }
    coins.truncate(limit);
    coins
}

/// Logs a failed operation by category
fn report_failure(operation: &str, error: &ProviderError) {
    match (error.kind(), error) {
        (FailureKind::Status, ProviderError::Status { status, body }) => tracing::error!(
            operation,
            status,
            body = %body,
            "Upstream responded with an error status"
        ),
        (FailureKind::NoResponse, _) => tracing::error!(
            operation,
            error = %error,
            "No response received from upstream"
        ),
        (FailureKind::Setup, _) => tracing::error!(
            operation,
            error = %error,
            "Request could not be constructed"
        ),
        _ => tracing::error!(
            operation,
            error = %error,
            "Upstream response could not be used"
        ),
    }
}

fn unavailable<T>(operation: &str, error: &ProviderError) -> Vec<T> {
    report_failure(operation, error);
    Vec::new()
}
