//! In-memory response cache with per-entry expiry
//!
//! Values are stored as JSON so one cache can hold every payload kind the
//! client produces. Entries are never mutated in place: a write replaces the
//! whole entry, and an entry read after its expiry is removed and reported
//! as absent.

use crate::error::ProviderError;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time::Instant;

/// A cached payload and its validity window
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Value,
    /// Absolute expiry; the entry is valid while `now <= expires_at`
    pub expires_at: Instant,
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

type EntryMap = HashMap<String, CacheEntry>;

/// Result of one upstream fetch, shared with every caller waiting on it
pub(crate) type FlightOutcome = Result<Value, ProviderError>;

type FlightReceiver = watch::Receiver<Option<FlightOutcome>>;

/// Fetches currently running, by cache key
type FlightMap = HashMap<String, FlightReceiver>;

/// A caller's role in the fetch for one key
pub(crate) enum Flight {
    /// No fetch was running; this caller runs it and must publish the result
    Leader(FlightLeader),
    /// Another caller is fetching; wait for its outcome
    Follower(FlightReceiver),
}

/// Ownership of an in-flight fetch
///
/// Dropping the leader unregisters the flight. Followers of a leader dropped
/// without completing see a closed channel and join again.
pub(crate) struct FlightLeader {
    key: String,
    tx: watch::Sender<Option<FlightOutcome>>,
    flights: Arc<Mutex<FlightMap>>,
}

impl FlightLeader {
    /// Publishes `outcome` to every follower
    pub(crate) fn complete(self, outcome: FlightOutcome) {
        self.tx.send_replace(Some(outcome));
    }
}

impl Drop for FlightLeader {
    fn drop(&mut self) {
        let mut flights = self.flights.lock().unwrap_or_else(|e| e.into_inner());
        flights.remove(&self.key);
    }
}

/// Waits for the leader of a flight to publish its outcome
///
/// Returns `None` if the leader went away without publishing.
pub(crate) async fn wait_for_flight(mut rx: FlightReceiver) -> Option<FlightOutcome> {
    let published = rx.wait_for(Option::is_some).await.ok()?;
    (*published).clone()
}

/// Key-value cache with a uniform TTL
pub struct ResponseCache {
    entries: Arc<RwLock<EntryMap>>,
    flights: Arc<Mutex<FlightMap>>,
    ttl: Duration,
}

impl ResponseCache {
    /// Creates an empty cache whose entries live for `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            flights: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the live value for `key`, decoded as `T`
    ///
    /// Expired entries are evicted. An entry that no longer decodes as `T`
    /// is treated as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get_raw(key).await?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                tracing::warn!(cache_key = key, error = %e, "Discarding undecodable cache entry");
                None
            }
        }
    }

    /// Returns the live JSON value for `key`
    pub async fn get_raw(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().await;
        // Another writer may have refreshed the entry in between.
        if let Some(entry) = entries.get(key) {
            if !entry.is_expired(now) {
                return Some(entry.value.clone());
            }
            entries.remove(key);
            tracing::debug!(cache_key = key, "Evicted expired cache entry");
        }
        None
    }

    /// Stores `value` under `key`, replacing any previous entry
    pub async fn insert<T: Serialize>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), serde_json::Error> {
        self.insert_value(key, serde_json::to_value(value)?).await;
        Ok(())
    }

    /// Stores an already serialized `value` under `key`
    pub async fn insert_value(&self, key: &str, value: Value) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + self.ttl,
            stored_at: Utc::now(),
        };
        self.entries.write().await.insert(key.to_string(), entry);
        tracing::debug!(cache_key = key, ttl_secs = self.ttl.as_secs(), "Cached response");
    }

    /// Returns a copy of the entry for `key` regardless of expiry
    pub async fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.entries.read().await.get(key).cloned()
    }

    /// Removes `key`, returning true if it was present
    pub async fn remove(&self, key: &str) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    /// Removes every entry
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Removes every expired entry, returning how many were dropped
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Number of stored entries, including expired ones not yet evicted
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Joins the running fetch for `key`, or registers a new one
    pub(crate) fn join_flight(&self, key: &str) -> Flight {
        let mut flights = self.flights.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(rx) = flights.get(key) {
            return Flight::Follower(rx.clone());
        }

        let (tx, rx) = watch::channel(None);
        flights.insert(key.to_string(), rx);
        Flight::Leader(FlightLeader {
            key: key.to_string(),
            tx,
            flights: Arc::clone(&self.flights),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_hit_within_ttl() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache.insert("coins_1_50", &vec![1, 2, 3]).await.unwrap();

        tokio::time::advance(Duration::from_secs(60)).await;
        let hit: Option<Vec<i32>> = cache.get("coins_1_50").await;
        assert_eq!(hit, Some(vec![1, 2, 3]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_evicted() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache.insert("global_stats", &"stats").await.unwrap();

        tokio::time::advance(Duration::from_millis(60_001)).await;
        assert_eq!(cache.len().await, 1);
        let miss: Option<String> = cache.get("global_stats").await;
        assert!(miss.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_resets_expiry() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache.insert("trending", &1).await.unwrap();
        tokio::time::advance(Duration::from_secs(45)).await;
        cache.insert("trending", &2).await.unwrap();
        tokio::time::advance(Duration::from_secs(45)).await;

        assert_eq!(cache.get::<i32>("trending").await, Some(2));
    }

    #[tokio::test]
    async fn test_type_mismatch_is_a_miss() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache.insert("coin_bitcoin", &"not a number").await.unwrap();
        assert!(cache.get::<u64>("coin_bitcoin").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache.insert("a", &1).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        cache.insert("b", &2).await.unwrap();
        tokio::time::advance(Duration::from_secs(31)).await;

        assert_eq!(cache.purge_expired().await, 1);
        assert!(cache.entry("a").await.is_none());
        assert!(cache.entry("b").await.is_some());
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache.insert("a", &1).await.unwrap();
        cache.insert("b", &2).await.unwrap();

        assert!(cache.remove("a").await);
        assert!(!cache.remove("a").await);
        cache.clear().await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_flight_outcome_reaches_followers() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        let Flight::Leader(leader) = cache.join_flight("coins_1_50") else {
            panic!("first caller should lead");
        };
        let Flight::Follower(rx) = cache.join_flight("coins_1_50") else {
            panic!("second caller should follow");
        };
        assert!(matches!(cache.join_flight("coins_2_50"), Flight::Leader(_)));

        leader.complete(Err(ProviderError::Timeout));
        assert_eq!(wait_for_flight(rx).await, Some(Err(ProviderError::Timeout)));

        // A finished flight is unregistered, so the next caller leads again.
        assert!(matches!(cache.join_flight("coins_1_50"), Flight::Leader(_)));
    }

    #[tokio::test]
    async fn test_abandoned_flight_releases_followers() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        let leader = cache.join_flight("trending");
        let Flight::Follower(rx) = cache.join_flight("trending") else {
            panic!("second caller should follow");
        };

        drop(leader);
        assert_eq!(wait_for_flight(rx).await, None);
        assert!(matches!(cache.join_flight("trending"), Flight::Leader(_)));
    }
}
