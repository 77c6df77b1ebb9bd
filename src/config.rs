//! Runtime configuration
//!
//! Defaults come from [`crate::constants`]. `from_env` lets a deployment
//! override them without recompiling:
//!
//! | Variable | Field |
//! |---|---|
//! | `COINGECKO_API_URL` | [`ClientConfig::base_url`] |
//! | `COINGECKO_VS_CURRENCY` | [`ClientConfig::vs_currency`] |
//! | `MARKET_DATA_CACHE_TTL_SECS` | [`ClientConfig::cache_ttl`] |
//! | `MARKET_DATA_MAX_RETRIES` | [`RetryPolicy::max_retries`] |
//! | `NEWS_API_URL` | [`NewsRelayConfig::base_url`] |
//! | `NEWS_API_KEY` | [`NewsRelayConfig::api_key`] |

use crate::{
    constants::{
        CACHE_TTL_SECS, COINGECKO_API_URL, DEFAULT_VS_CURRENCY, NEWS_API_URL,
        NEWS_DEFAULT_PAGE, NEWS_DEFAULT_SIZE,
    },
    error::ConfigError,
    retry::RetryPolicy,
};
use std::str::FromStr;
use std::time::Duration;

/// Configuration for [`crate::client::MarketDataClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Market data API base URL, without trailing slash
    pub base_url: String,
    /// Quote currency for listings
    pub vs_currency: String,
    /// Validity window of cached responses
    pub cache_ttl: Duration,
    /// Retry behavior for failed requests
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: COINGECKO_API_URL.to_string(),
            vs_currency: DEFAULT_VS_CURRENCY.to_string(),
            cache_ttl: Duration::from_secs(CACHE_TTL_SECS),
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Builds a configuration from defaults overridden by environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = lookup("COINGECKO_API_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(currency) = lookup("COINGECKO_VS_CURRENCY") {
            config.vs_currency = currency.to_lowercase();
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "MARKET_DATA_CACHE_TTL_SECS")? {
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(retries) = parse_var::<u32>(&lookup, "MARKET_DATA_MAX_RETRIES")? {
            config.retry.max_retries = retries;
        }

        Ok(config)
    }

    /// Sets the base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the cache TTL
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }
}

/// Configuration for [`crate::news::NewsRelay`]
#[derive(Debug, Clone)]
pub struct NewsRelayConfig {
    /// News API endpoint
    pub base_url: String,
    /// Server-held API key; the relay refuses to forward without one
    pub api_key: Option<String>,
    pub default_page: u32,
    pub default_size: u32,
}

impl Default for NewsRelayConfig {
    fn default() -> Self {
        Self {
            base_url: NEWS_API_URL.to_string(),
            api_key: None,
            default_page: NEWS_DEFAULT_PAGE,
            default_size: NEWS_DEFAULT_SIZE,
        }
    }
}

impl NewsRelayConfig {
    /// Builds a configuration from defaults overridden by environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(url) = lookup("NEWS_API_URL") {
            config.base_url = url;
        }
        config.api_key = lookup("NEWS_API_KEY").filter(|key| !key.trim().is_empty());
        config
    }

    /// Sets the API key
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::invalid_value(var, raw)),
        None => Ok(None),
    }
}
