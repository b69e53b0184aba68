use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Default)]
pub struct Metrics {
    // Requests
    total_requests: AtomicUsize,
    successful_requests: AtomicUsize,
    failed_requests: AtomicUsize,

    // Timing (in microseconds)
    total_upload_time_us: AtomicU64,
    total_query_time_us: AtomicU64,
    total_probe_time_us: AtomicU64,

    // Counts
    uploads: AtomicUsize,
    queries: AtomicUsize,
    probes: AtomicUsize,

    // Cache
    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,
    background_refetches: AtomicUsize,
    discarded_responses: AtomicUsize,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_request(&self, success: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_upload(&self, duration: Duration) {
        self.total_upload_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.uploads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_query(&self, duration: Duration) {
        self.total_query_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_probe(&self, duration: Duration) {
        self.total_probe_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.probes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_background_refetch(&self) {
        self.background_refetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discarded_response(&self) {
        self.discarded_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            avg_upload_time_ms: self.avg_time_ms(&self.total_upload_time_us, &self.uploads),
            avg_query_time_ms: self.avg_time_ms(&self.total_query_time_us, &self.queries),
            avg_probe_time_ms: self.avg_time_ms(&self.total_probe_time_us, &self.probes),
            health_probes: self.probes.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            background_refetches: self.background_refetches.load(Ordering::Relaxed),
            discarded_responses: self.discarded_responses.load(Ordering::Relaxed),
        }
    }

    fn avg_time_ms(&self, total_us: &AtomicU64, count: &AtomicUsize) -> f64 {
        let total = total_us.load(Ordering::Relaxed) as f64;
        let cnt = count.load(Ordering::Relaxed) as f64;
        if cnt > 0.0 {
            total / cnt / 1000.0 // Convert to ms
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub avg_upload_time_ms: f64,
    pub avg_query_time_ms: f64,
    pub avg_probe_time_ms: f64,
    pub health_probes: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub background_refetches: usize,
    pub discarded_responses: usize,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_averages() {
        let metrics = Metrics::new();
        metrics.record_request(true);
        metrics.record_request(false);
        metrics.record_query(Duration::from_millis(10));
        metrics.record_query(Duration::from_millis(30));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.failed_requests, 1);
        assert!((snapshot.avg_query_time_ms - 20.0).abs() < f64::EPSILON);
        assert_eq!(snapshot.avg_upload_time_ms, 0.0);
    }
}
