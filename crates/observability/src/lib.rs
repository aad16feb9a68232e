use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

#[derive(Debug, Default)]
pub struct AppMetrics {
    requests_total: AtomicU64,
    classifications_total: AtomicU64,
    no_match_total: AtomicU64,
    backend_failures_total: AtomicU64,
    entities_anonymized_total: AtomicU64,
    generations_total: AtomicU64,
    streams_total: AtomicU64,
    latency_samples: AtomicU64,
    total_latency_millis: AtomicU64,
    first_chunks_total: AtomicU64,
    total_first_chunk_millis: AtomicU64,
    total_stream_millis: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub classifications_total: u64,
    pub no_match_total: u64,
    pub backend_failures_total: u64,
    pub entities_anonymized_total: u64,
    pub generations_total: u64,
    pub streams_total: u64,
    /// Requests whose duration was recorded; the denominator of `avg_latency_millis`.
    pub latency_samples: u64,
    pub avg_latency_millis: f64,
    pub avg_first_chunk_millis: f64,
    pub avg_stream_millis: f64,
}

impl AppMetrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_classification(&self, matched: bool) {
        self.classifications_total.fetch_add(1, Ordering::Relaxed);
        if !matched {
            self.no_match_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn inc_backend_failure(&self) {
        self.backend_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_entities_anonymized(&self, count: usize) {
        self.entities_anonymized_total
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn inc_generation(&self) {
        self.generations_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Duration of one request, successful or not.
    pub fn observe_latency(&self, duration: Duration) {
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
        self.total_latency_millis
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn observe_first_chunk(&self, duration: Duration) {
        self.first_chunks_total.fetch_add(1, Ordering::Relaxed);
        self.total_first_chunk_millis
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Total duration of one fully consumed stream.
    pub fn observe_stream(&self, duration: Duration) {
        self.streams_total.fetch_add(1, Ordering::Relaxed);
        self.total_stream_millis
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let samples = self.latency_samples.load(Ordering::Relaxed);
        let latency = self.total_latency_millis.load(Ordering::Relaxed);
        let first_chunks = self.first_chunks_total.load(Ordering::Relaxed);
        let first_chunk = self.total_first_chunk_millis.load(Ordering::Relaxed);
        let streams = self.streams_total.load(Ordering::Relaxed);
        let stream = self.total_stream_millis.load(Ordering::Relaxed);

        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            classifications_total: self.classifications_total.load(Ordering::Relaxed),
            no_match_total: self.no_match_total.load(Ordering::Relaxed),
            backend_failures_total: self.backend_failures_total.load(Ordering::Relaxed),
            entities_anonymized_total: self.entities_anonymized_total.load(Ordering::Relaxed),
            generations_total: self.generations_total.load(Ordering::Relaxed),
            streams_total: streams,
            latency_samples: samples,
            avg_latency_millis: average(latency, samples),
            avg_first_chunk_millis: average(first_chunk, first_chunks),
            avg_stream_millis: average(stream, streams),
        }
    }
}

fn average(total: u64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        total as f64 / count as f64
    }
}

pub fn init_tracing(service_name: &str) {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}=info,prism_agents=info,prism_anonymizer=info,prism_ml=warn",
                service_name.replace('-', "_")
            ))
        });

        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(std::io::stderr)
            .init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_averages() {
        let metrics = AppMetrics::default();
        metrics.inc_request();
        metrics.inc_request();
        metrics.observe_latency(Duration::from_millis(30));
        metrics.observe_latency(Duration::from_millis(10));
        metrics.inc_classification(true);
        metrics.inc_classification(false);
        metrics.observe_first_chunk(Duration::from_millis(8));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.avg_latency_millis, 20.0);
        assert_eq!(snapshot.classifications_total, 2);
        assert_eq!(snapshot.no_match_total, 1);
        assert_eq!(snapshot.avg_first_chunk_millis, 8.0);
    }

    #[test]
    fn stream_durations_do_not_skew_request_latency() {
        let metrics = AppMetrics::default();
        metrics.inc_request();
        metrics.observe_latency(Duration::from_millis(10));
        metrics.observe_first_chunk(Duration::from_millis(4));
        metrics.observe_stream(Duration::from_millis(100));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.latency_samples, 1);
        assert_eq!(snapshot.avg_latency_millis, 10.0);
        assert_eq!(snapshot.streams_total, 1);
        assert_eq!(snapshot.avg_stream_millis, 100.0);
        assert_eq!(snapshot.avg_first_chunk_millis, 4.0);
    }

    #[test]
    fn empty_snapshot_serializes() {
        let snapshot = AppMetrics::default().snapshot();
        let json = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(json["requests_total"], 0);
        assert_eq!(json["avg_latency_millis"], 0.0);
    }
}
