//! In-process request counters.
//!
//! Counters live for the lifetime of the process and are reported by
//! `GET /metrics` when it is enabled. Response times are kept as running
//! aggregates per route, so memory stays bounded by the number of routes.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use parking_lot::Mutex;
use serde::Serialize;

use ecosort_core::classifier::WasteLabel;
use ecosort_core::envelope::ErrorKind;

use crate::state::AppState;

/// Which endpoint produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ClassificationKind {
    Text,
    Image,
}

impl ClassificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationKind::Text => "text",
            ClassificationKind::Image => "image",
        }
    }
}

impl fmt::Display for ClassificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Running response-time aggregate for one route.
#[derive(Debug, Clone, Copy)]
struct Timing {
    count: u64,
    total: Duration,
    min: Duration,
    max: Duration,
}

impl Timing {
    fn new(elapsed: Duration) -> Self {
        Self {
            count: 1,
            total: elapsed,
            min: elapsed,
            max: elapsed,
        }
    }

    fn record(&mut self, elapsed: Duration) {
        self.count += 1;
        self.total = self.total.saturating_add(elapsed);
        self.min = self.min.min(elapsed);
        self.max = self.max.max(elapsed);
    }

    fn summary(&self) -> ResponseTimeSummary {
        let avg = self.total.as_secs_f64() / self.count as f64;
        ResponseTimeSummary {
            count: self.count,
            avg_ms: round2(avg * 1000.0),
            min_ms: round2(self.min.as_secs_f64() * 1000.0),
            max_ms: round2(self.max.as_secs_f64() * 1000.0),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Default)]
struct Counters {
    requests: BTreeMap<String, u64>,
    errors: BTreeMap<&'static str, u64>,
    classifications: BTreeMap<(ClassificationKind, WasteLabel), u64>,
    timings: BTreeMap<String, Timing>,
}

/// Request, error, classification, and latency counters.
#[derive(Debug)]
pub struct Metrics {
    started: Instant,
    counters: Mutex<Counters>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Counts one request to `endpoint` and folds its latency into the
    /// route's aggregate.
    pub fn record_request(&self, endpoint: &str, elapsed: Duration) {
        let mut counters = self.counters.lock();
        *counters.requests.entry(endpoint.to_string()).or_insert(0) += 1;
        counters
            .timings
            .entry(endpoint.to_string())
            .and_modify(|timing| timing.record(elapsed))
            .or_insert_with(|| Timing::new(elapsed));
    }

    /// Counts one error response.
    pub fn record_error(&self, kind: ErrorKind) {
        *self.counters.lock().errors.entry(kind.code()).or_insert(0) += 1;
    }

    /// Counts one successful classification.
    pub fn record_classification(&self, kind: ClassificationKind, label: WasteLabel) {
        *self
            .counters
            .lock()
            .classifications
            .entry((kind, label))
            .or_insert(0) += 1;
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self, rate_limit_clients: usize) -> MetricsSnapshot {
        let counters = self.counters.lock();

        let requests_total: u64 = counters.requests.values().sum();
        let total_errors: u64 = counters.errors.values().sum();
        let error_rate_percent = if requests_total > 0 {
            round2(total_errors as f64 / requests_total as f64 * 100.0)
        } else {
            0.0
        };

        let mut classification_stats = BTreeMap::new();
        let mut classifications_by_label = BTreeMap::new();
        for ((kind, label), count) in &counters.classifications {
            classification_stats.insert(format!("{}:{}", kind, label.as_str()), *count);
            *classifications_by_label
                .entry(label.as_str().to_string())
                .or_insert(0) += count;
        }

        MetricsSnapshot {
            uptime_seconds: self.started.elapsed().as_secs(),
            requests_total,
            total_errors,
            error_rate_percent,
            requests_by_endpoint: counters.requests.clone(),
            errors_by_code: counters
                .errors
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            classification_stats,
            classifications_by_label,
            response_times: counters
                .timings
                .iter()
                .map(|(endpoint, timing)| (endpoint.clone(), timing.summary()))
                .collect(),
            rate_limit_clients,
        }
    }
}

/// Latency summary for one route, in milliseconds.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseTimeSummary {
    pub count: u64,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

/// Serialized form of [`Metrics`].
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_seconds: u64,
    pub requests_total: u64,
    pub total_errors: u64,
    pub error_rate_percent: f64,
    pub requests_by_endpoint: BTreeMap<String, u64>,
    pub errors_by_code: BTreeMap<String, u64>,
    /// Keyed `<kind>:<label>`, e.g. `text:hazardous`.
    pub classification_stats: BTreeMap<String, u64>,
    pub classifications_by_label: BTreeMap<String, u64>,
    pub response_times: BTreeMap<String, ResponseTimeSummary>,
    pub rate_limit_clients: usize,
}

/// Middleware counting requests and latency per matched route, and errors
/// per code.
pub async fn track_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let start = Instant::now();
    let response = next.run(request).await;

    state.metrics.record_request(&endpoint, start.elapsed());
    if let Some(kind) = response.extensions().get::<ErrorKind>() {
        state.metrics.record_error(*kind);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn counts_accumulate() {
        let metrics = Metrics::new();
        metrics.record_request("/classify-text", ms(10));
        metrics.record_request("/classify-text", ms(30));
        metrics.record_request("/health", ms(1));
        metrics.record_error(ErrorKind::RateLimited);
        metrics.record_classification(ClassificationKind::Text, WasteLabel::Hazardous);

        let snapshot = metrics.snapshot(4);
        assert_eq!(snapshot.requests_total, 3);
        assert_eq!(snapshot.requests_by_endpoint["/classify-text"], 2);
        assert_eq!(snapshot.errors_by_code["rate_limited"], 1);
        assert_eq!(snapshot.classification_stats["text:hazardous"], 1);
        assert_eq!(snapshot.classifications_by_label["hazardous"], 1);
        assert_eq!(snapshot.rate_limit_clients, 4);
    }

    #[test]
    fn response_times_aggregate_per_route() {
        let metrics = Metrics::new();
        metrics.record_request("/classify-text", ms(10));
        metrics.record_request("/classify-text", ms(30));
        metrics.record_request("/classify-text", ms(20));

        let snapshot = metrics.snapshot(0);
        let times = &snapshot.response_times["/classify-text"];
        assert_eq!(times.count, 3);
        assert_eq!(times.avg_ms, 20.0);
        assert_eq!(times.min_ms, 10.0);
        assert_eq!(times.max_ms, 30.0);
        assert!(!snapshot.response_times.contains_key("/health"));
    }

    #[test]
    fn error_rate() {
        let metrics = Metrics::new();
        for _ in 0..3 {
            metrics.record_request("/classify-text", ms(1));
        }
        metrics.record_error(ErrorKind::EmptyInput);

        let snapshot = metrics.snapshot(0);
        assert_eq!(snapshot.total_errors, 1);
        assert_eq!(snapshot.error_rate_percent, 33.33);
    }

    #[test]
    fn classifications_split_by_kind() {
        let metrics = Metrics::new();
        metrics.record_classification(ClassificationKind::Text, WasteLabel::Recyclable);
        metrics.record_classification(ClassificationKind::Image, WasteLabel::Recyclable);
        metrics.record_classification(ClassificationKind::Image, WasteLabel::Recyclable);

        let snapshot = metrics.snapshot(0);
        assert_eq!(snapshot.classification_stats["text:recyclable"], 1);
        assert_eq!(snapshot.classification_stats["image:recyclable"], 2);
        assert_eq!(snapshot.classifications_by_label["recyclable"], 3);
    }

    #[test]
    fn empty_snapshot() {
        let snapshot = Metrics::default().snapshot(0);
        assert_eq!(snapshot.requests_total, 0);
        assert_eq!(snapshot.error_rate_percent, 0.0);
        assert!(snapshot.errors_by_code.is_empty());
        assert!(snapshot.response_times.is_empty());
    }
}
