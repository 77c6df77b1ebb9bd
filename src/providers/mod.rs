//! Upstream API implementations

pub mod coingecko;

pub use coingecko::CoinGeckoApi;
