//! Prometheus metrics for the query endpoints.

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use std::time::Duration;

/// How a query request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Relevant,
    NoRelevantResult,
    BadRequest,
    Unavailable,
    Error,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Relevant => "relevant",
            Self::NoRelevantResult => "no_relevant_result",
            Self::BadRequest => "bad_request",
            Self::Unavailable => "unavailable",
            Self::Error => "error",
        }
    }
}

type Labels = Vec<(String, String)>;

/// Request counters and latency histograms, registered once at startup.
///
/// Metric handles are internally atomic; recording needs only `&self`.
pub struct SearchMetrics {
    registry: Registry,
    requests: Family<Labels, Counter>,
    duration: Family<Labels, Histogram>,
}

impl SearchMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let requests = Family::<Labels, Counter>::default();
        registry.register(
            "tomo_search_requests",
            "Query requests by endpoint and outcome",
            requests.clone(),
        );

        // 1ms .. ~8s, per endpoint so generation time does not hide search time
        let duration = Family::<Labels, Histogram>::new_with_constructor(|| {
            Histogram::new(exponential_buckets(0.001, 2.0, 14))
        });
        registry.register(
            "tomo_search_duration_seconds",
            "Time spent answering query requests by endpoint",
            duration.clone(),
        );

        Self {
            registry,
            requests,
            duration,
        }
    }

    /// Count one request to `endpoint` and record its latency.
    pub fn record(&self, endpoint: &str, outcome: Outcome, elapsed: Duration) {
        let endpoint = ("endpoint".to_string(), endpoint.to_string());
        let labels = vec![
            endpoint.clone(),
            ("outcome".to_string(), outcome.as_str().to_string()),
        ];
        self.requests.get_or_create(&labels).inc();
        self.duration
            .get_or_create(&vec![endpoint])
            .observe(elapsed.as_secs_f64());
    }

    /// Export metrics in Prometheus text format.
    pub fn export(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}

impl Default for SearchMetrics {
    fn default() -> Self {
        Self::new()
    }
}
