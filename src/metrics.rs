//! Client request metrics
//!
//! Tracks latency percentiles and success rates of live fetches, plus cache
//! effectiveness and retry counts.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::RwLock;

/// Maximum number of samples to keep for metrics calculation
const MAX_SAMPLES: usize = 100;

/// Snapshot of client metrics
#[derive(Debug, Clone, PartialEq)]
pub struct ClientMetrics {
    /// 50th percentile latency of successful fetches in milliseconds
    pub latency_p50_ms: f64,
    /// 99th percentile latency of successful fetches in milliseconds
    pub latency_p99_ms: f64,
    /// Success rate of live fetches (0.0 to 1.0)
    pub success_rate: f64,
    /// Live fetches issued (one per logical request, retries excluded)
    pub total_fetches: u64,
    pub failed_fetches: u64,
    /// Retries across all fetches
    pub retries: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl ClientMetrics {
    /// Creates metrics with no data
    pub fn empty() -> Self {
        Self {
            latency_p50_ms: 0.0,
            latency_p99_ms: 0.0,
            success_rate: 1.0,
            total_fetches: 0,
            failed_fetches: 0,
            retries: 0,
            cache_hits: 0,
            cache_misses: 0,
        }
    }

    /// Share of cache lookups that were hits (0.0 when there were none)
    pub fn cache_hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            0.0
        } else {
            self.cache_hits as f64 / lookups as f64
        }
    }
}

/// Internal sample for latency tracking
#[derive(Debug, Clone)]
struct LatencySample {
    duration_ms: f64,
    success: bool,
}

#[derive(Debug, Default)]
struct Counters {
    total_fetches: u64,
    failed_fetches: u64,
    retries: u64,
    cache_hits: u64,
    cache_misses: u64,
}

/// Collects and computes client metrics
pub struct MetricsCollector {
    /// Rolling window of latency samples
    samples: RwLock<VecDeque<LatencySample>>,
    /// Lifetime counters
    counters: RwLock<Counters>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            samples: RwLock::new(VecDeque::with_capacity(MAX_SAMPLES)),
            counters: RwLock::new(Counters::default()),
        }
    }

    /// Records a live fetch with its total duration, outcome and retry count
    pub async fn record_fetch(&self, duration: Duration, success: bool, retries: u32) {
        let duration_ms = duration.as_secs_f64() * 1000.0;

        {
            let mut counters = self.counters.write().await;
            counters.total_fetches += 1;
            counters.retries += u64::from(retries);
            if !success {
                counters.failed_fetches += 1;
            }
        }

        let mut samples = self.samples.write().await;
        if samples.len() >= MAX_SAMPLES {
            samples.pop_front();
        }
        samples.push_back(LatencySample {
            duration_ms,
            success,
        });
    }

    pub async fn record_cache_hit(&self) {
        self.counters.write().await.cache_hits += 1;
    }

    pub async fn record_cache_miss(&self) {
        self.counters.write().await.cache_misses += 1;
    }

    /// Computes current metrics from collected samples
    pub async fn get_metrics(&self) -> ClientMetrics {
        let samples = self.samples.read().await;
        let counters = self.counters.read().await;

        let mut metrics = ClientMetrics {
            total_fetches: counters.total_fetches,
            failed_fetches: counters.failed_fetches,
            retries: counters.retries,
            cache_hits: counters.cache_hits,
            cache_misses: counters.cache_misses,
            ..ClientMetrics::empty()
        };

        if samples.is_empty() {
            return metrics;
        }

        // Extract successful latencies for percentile calculation
        let mut latencies: Vec<f64> = samples
            .iter()
            .filter(|s| s.success)
            .map(|s| s.duration_ms)
            .collect();
        latencies.sort_by(|a, b| a.total_cmp(b));

        metrics.latency_p50_ms = percentile(&latencies, 50.0);
        metrics.latency_p99_ms = percentile(&latencies, 99.0);
        if counters.total_fetches > 0 {
            metrics.success_rate = (counters.total_fetches - counters.failed_fetches) as f64
                / counters.total_fetches as f64;
        }

        metrics
    }
}

/// Calculate percentile from sorted values
fn percentile(sorted_values: &[f64], p: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }

    // Nearest rank: the smallest value with at least p% of samples at or below it
    let rank = (p / 100.0 * sorted_values.len() as f64).ceil() as usize;
    sorted_values[rank.clamp(1, sorted_values.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_collector() {
        let collector = MetricsCollector::new();

        collector.record_fetch(Duration::from_millis(100), true, 0).await;
        collector.record_fetch(Duration::from_millis(200), true, 2).await;
        collector.record_fetch(Duration::from_millis(150), false, 3).await;
        collector.record_cache_hit().await;
        collector.record_cache_miss().await;
        collector.record_cache_miss().await;
        collector.record_cache_miss().await;

        let metrics = collector.get_metrics().await;

        assert_eq!(metrics.total_fetches, 3);
        assert_eq!(metrics.failed_fetches, 1);
        assert_eq!(metrics.retries, 5);
        assert!(metrics.success_rate > 0.6 && metrics.success_rate < 0.7);
        assert_eq!(metrics.cache_hit_rate(), 0.25);
        assert_eq!(metrics.latency_p99_ms, 200.0);
    }

    #[tokio::test]
    async fn test_empty_metrics() {
        let metrics = MetricsCollector::new().get_metrics().await;
        assert_eq!(metrics, ClientMetrics::empty());
        assert_eq!(metrics.cache_hit_rate(), 0.0);
    }

    #[test]
    fn test_percentile() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        assert_eq!(percentile(&values, 50.0), 5.0);
        assert_eq!(percentile(&values, 99.0), 10.0);
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(percentile(&[120.0, 480.0], 50.0), 120.0);
        assert_eq!(percentile(&[42.0], 99.0), 42.0);
    }

    #[tokio::test]
    async fn test_two_sample_median_is_lower_value() {
        let collector = MetricsCollector::new();
        collector.record_fetch(Duration::from_millis(300), true, 0).await;
        collector.record_fetch(Duration::from_millis(100), true, 0).await;

        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.latency_p50_ms, 100.0);
        assert_eq!(metrics.latency_p99_ms, 300.0);
    }
}
