use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cap on retained latency samples; older samples are dropped first
const MAX_LATENCY_SAMPLES: usize = 10_000;

/// Process-wide request and inference counters.
///
/// Cheap to clone; all clones share one set of counters.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    predictions_success: AtomicUsize,
    predictions_failed: AtomicUsize,
    predictions_rejected: AtomicUsize,
    model_unavailable: AtomicUsize,
    detections_total: AtomicUsize,
    inference_latency_ms: RwLock<VecDeque<u64>>,
    endpoint_counters: DashMap<String, AtomicUsize>,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                predictions_success: AtomicUsize::new(0),
                predictions_failed: AtomicUsize::new(0),
                predictions_rejected: AtomicUsize::new(0),
                model_unavailable: AtomicUsize::new(0),
                detections_total: AtomicUsize::new(0),
                inference_latency_ms: RwLock::new(VecDeque::with_capacity(MAX_LATENCY_SAMPLES)),
                endpoint_counters: DashMap::new(),
                start_time: Instant::now(),
            }),
        }
    }

    pub fn record_endpoint_request(&self, endpoint: &str) {
        self.inner
            .endpoint_counters
            .entry(endpoint.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_prediction(&self, detections: usize, duration: Duration) {
        self.inner.predictions_success.fetch_add(1, Ordering::Relaxed);
        self.inner.detections_total.fetch_add(detections, Ordering::Relaxed);

        let mut samples = self.inner.inference_latency_ms.write();
        if samples.len() == MAX_LATENCY_SAMPLES {
            samples.pop_front();
        }
        samples.push_back(duration.as_millis() as u64);
    }

    pub fn record_failure(&self) {
        self.inner.predictions_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Request without a usable upload
    pub fn record_rejection(&self) {
        self.inner.predictions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_model_unavailable(&self) {
        self.inner.model_unavailable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let latency: Vec<u64> = self.inner.inference_latency_ms.read().iter().copied().collect();
        let inference_latency_avg_ms = avg(&latency);
        let inference_latency_p50_ms = percentile(&latency, 0.5);
        let inference_latency_p95_ms = percentile(&latency, 0.95);

        let requests_by_endpoint = self
            .inner
            .endpoint_counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect();

        MetricsSnapshot {
            predictions_success: self.inner.predictions_success.load(Ordering::Relaxed),
            predictions_failed: self.inner.predictions_failed.load(Ordering::Relaxed),
            predictions_rejected: self.inner.predictions_rejected.load(Ordering::Relaxed),
            model_unavailable: self.inner.model_unavailable.load(Ordering::Relaxed),
            detections_total: self.inner.detections_total.load(Ordering::Relaxed),
            inference_latency_avg_ms,
            inference_latency_p50_ms,
            inference_latency_p95_ms,
            requests_by_endpoint,
            uptime_seconds: self.inner.start_time.elapsed().as_secs(),
        }
    }

    /// Generate Prometheus-format metrics
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();

        let mut endpoints = String::new();
        for (endpoint, count) in &snapshot.requests_by_endpoint {
            endpoints.push_str(&format!(
                "http_requests_total{{endpoint=\"{}\"}} {}\n",
                endpoint, count
            ));
        }

        format!(
            r#"# HELP http_requests_total Requests received per endpoint
# TYPE http_requests_total counter
{}
# HELP predictions_total Prediction requests by outcome
# TYPE predictions_total counter
predictions_total{{outcome="success"}} {}
predictions_total{{outcome="failed"}} {}
predictions_total{{outcome="rejected"}} {}
predictions_total{{outcome="model_unavailable"}} {}

# HELP detections_total Regions returned across all predictions
# TYPE detections_total counter
detections_total {}

# HELP inference_latency_avg_ms Average decode + inference latency in milliseconds
# TYPE inference_latency_avg_ms gauge
inference_latency_avg_ms {}

# HELP uptime_seconds Application uptime in seconds
# TYPE uptime_seconds counter
uptime_seconds {}
"#,
            endpoints,
            snapshot.predictions_success,
            snapshot.predictions_failed,
            snapshot.predictions_rejected,
            snapshot.model_unavailable,
            snapshot.detections_total,
            snapshot.inference_latency_avg_ms,
            snapshot.uptime_seconds,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub predictions_success: usize,
    pub predictions_failed: usize,
    pub predictions_rejected: usize,
    pub model_unavailable: usize,
    pub detections_total: usize,
    pub inference_latency_avg_ms: u64,
    pub inference_latency_p50_ms: u64,
    pub inference_latency_p95_ms: u64,
    pub requests_by_endpoint: BTreeMap<String, usize>,
    pub uptime_seconds: u64,
}

fn percentile(values: &[u64], p: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let idx = ((values.len() as f64 - 1.0) * p) as usize;
    sorted[idx]
}

fn avg(values: &[u64]) -> u64 {
    if values.is_empty() {
        return 0;
    }
    values.iter().sum::<u64>() / values.len() as u64
}
