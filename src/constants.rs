//! Constants for the market data client
//!
//! Compile-time defaults. Every value here can be overridden at runtime
//! through [`crate::config::ClientConfig`] or [`crate::config::NewsRelayConfig`].

/// CoinGecko API base URL
pub const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";

/// Endpoint for paginated market listings
pub const COINGECKO_MARKETS_ENDPOINT: &str = "/coins/markets";

/// Endpoint prefix for single-coin detail and chart queries
pub const COINGECKO_COINS_ENDPOINT: &str = "/coins";

/// Endpoint for free-text search
pub const COINGECKO_SEARCH_ENDPOINT: &str = "/search";

/// Endpoint for trending coin discovery
pub const COINGECKO_TRENDING_ENDPOINT: &str = "/search/trending";

/// Endpoint for global market aggregates
pub const COINGECKO_GLOBAL_ENDPOINT: &str = "/global";

/// Change windows requested alongside every market listing
pub const PRICE_CHANGE_WINDOWS: &str = "1h,24h,7d,30d,1y";

/// Quote currency used when none is configured
pub const DEFAULT_VS_CURRENCY: &str = "usd";

/// How long a cached response stays valid (in seconds)
pub const CACHE_TTL_SECS: u64 = 60;

/// HTTP request timeout for a single attempt (in seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Maximum number of retries after the original attempt
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Initial backoff delay for retries (in milliseconds)
pub const INITIAL_BACKOFF_MS: u64 = 250;

/// Maximum backoff delay for retries (in milliseconds)
pub const MAX_BACKOFF_MS: u64 = 2000;

/// Size of the listing page used to rank gainers and losers
pub const MOVERS_SAMPLE_SIZE: u32 = 100;

/// Number of coins returned by the gainers/losers queries
pub const MOVERS_LIMIT: usize = 10;

/// News API base URL
pub const NEWS_API_URL: &str = "https://api.thenewsapi.net/crypto";

/// Default news page
pub const NEWS_DEFAULT_PAGE: u32 = 1;

/// Default news page size
pub const NEWS_DEFAULT_SIZE: u32 = 6;

/// User agent for HTTP requests
pub const USER_AGENT: &str = "coin-market-client/0.1.0";
