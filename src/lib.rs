//! # Coin Market Client
//!
//! Cached, retrying access to cryptocurrency market data (CoinGecko) and a
//! passthrough relay for crypto news.
//!
//! ## Usage
//!
//! Build one [`MarketDataClient`] at startup and share it by reference. The
//! client owns its cache, so every caller holding the same instance sees the
//! same entries.
//!
//! ```no_run
//! use coin_market_client::{ChartDays, ClientConfig, MarketDataClient};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(MarketDataClient::new(ClientConfig::default())?);
//!
//! // Page 2 of the market listing, 50 coins per page
//! let coins = client.list_coins(2, 50, false).await;
//!
//! // Detail and chart for the same coin are fetched independently
//! if let Some(detail) = client.get_coin_by_id("bitcoin", false).await {
//!     println!("ATH: {:?}", detail.ath("usd"));
//! }
//! let chart = client
//!     .get_coin_market_chart("bitcoin", "usd", ChartDays::Days(7), false)
//!     .await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! MarketDataClient (one per application)
//!     ↓
//! ResponseCache (60s TTL, per-key coalescing)
//!     ↓ miss
//! execute_with_retry (RetryPolicy: 3 retries, backoff + jitter)
//!     ↓
//! CoinGeckoApi (request building, normalization)
//!     ↓
//! Transport (reqwest, 10s timeout)
//! ```
//!
//! ## Error Handling
//!
//! Plain operations never fail: they log the categorized cause and return an
//! empty collection or `None`. The `try_*` variants surface the error.
//!
//! ```no_run
//! use coin_market_client::{FailureKind, MarketDataClient};
//!
//! # async fn example(client: &MarketDataClient) {
//! match client.try_get_trending(false).await {
//!     Ok(coins) => println!("{} trending coins", coins.len()),
//!     Err(e) if e.kind() == FailureKind::Status => eprintln!("Upstream refused: {}", e),
//!     Err(e) => eprintln!("Trending unavailable: {}", e),
//! }
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod metrics;
pub mod news;
pub mod providers;
pub mod retry;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use client::MarketDataClient;
pub use config::{ClientConfig, NewsRelayConfig};
pub use error::{ConfigError, FailureKind, ProviderError, RelayError};
pub use metrics::ClientMetrics;
pub use news::{NewsPage, NewsRelay, RelayResponse};
pub use retry::{RetryDecision, RetryPolicy};
pub use transport::{HttpTransport, Transport, TransportResponse};
pub use types::{ChartDays, ChartSeries, CoinDetail, CoinSummary, GlobalStats, SearchResult};
