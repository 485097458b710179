//! Prometheus metrics collection.
//!
//! Provides application metrics in Prometheus format.

use prometheus_client::encoding::{EncodeLabelSet, text::encode};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;

use crate::authz::Decision;

/// HTTP request labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HttpLabels {
    pub method: String,
    pub path: String,
    pub status: u16,
}

/// Authorization decision labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct GateLabels {
    pub key: String,
    pub decision: String,
}

/// Application metrics.
pub struct Metrics {
    registry: Registry,

    /// HTTP request counter by method/path/status.
    pub http_requests: Family<HttpLabels, Counter>,

    /// HTTP request duration histogram.
    pub http_duration_seconds: Family<HttpLabels, Histogram>,

    /// Gate decision counter by menu key and outcome.
    pub gate_decisions: Family<GateLabels, Counter>,

    /// Successful login counter.
    pub login_successes: Counter,

    /// Failed login counter.
    pub login_failures: Counter,
}

impl Metrics {
    /// Create a new metrics registry.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let http_requests = Family::<HttpLabels, Counter>::default();
        registry.register(
            "http_requests_total",
            "Total HTTP requests",
            http_requests.clone(),
        );

        let http_duration_seconds = Family::<HttpLabels, Histogram>::new_with_constructor(|| {
            Histogram::new(exponential_buckets(0.001, 2.0, 12))
        });
        registry.register(
            "http_request_duration_seconds",
            "HTTP request duration in seconds",
            http_duration_seconds.clone(),
        );

        let gate_decisions = Family::<GateLabels, Counter>::default();
        registry.register(
            "gate_decisions_total",
            "Authorization gate decisions by menu key",
            gate_decisions.clone(),
        );

        let login_successes = Counter::default();
        registry.register(
            "login_successes_total",
            "Successful logins",
            login_successes.clone(),
        );

        let login_failures = Counter::default();
        registry.register(
            "login_failures_total",
            "Failed logins",
            login_failures.clone(),
        );

        Self {
            registry,
            http_requests,
            http_duration_seconds,
            gate_decisions,
            login_successes,
            login_failures,
        }
    }

    /// Record an HTTP request.
    pub fn record_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let labels = HttpLabels {
            method: method.to_string(),
            path: normalize_path(path),
            status,
        };

        self.http_requests.get_or_create(&labels).inc();
        self.http_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    /// Record a gate decision for a menu key.
    pub fn record_decision(&self, key: &str, decision: &Decision) {
        let labels = GateLabels {
            key: key.to_string(),
            decision: decision_label(decision).to_string(),
        };

        self.gate_decisions.get_or_create(&labels).inc();
    }

    /// Record a successful login.
    pub fn record_login_success(&self) {
        self.login_successes.inc();
    }

    /// Record a failed login.
    pub fn record_login_failure(&self) {
        self.login_failures.inc();
    }

    /// Encode metrics in Prometheus text format.
    ///
    /// # Panics
    ///
    /// Panics if Prometheus metric encoding to a `String` buffer fails.
    /// The `fmt::Write` impl for `String` is infallible, and all metric
    /// labels use derived `Display`/`EncodeLabelSet` impls that do not
    /// produce `fmt::Error`.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        // Prometheus encoding to String buffer is infallible
        #[allow(clippy::expect_used)]
        encode(&mut buffer, &self.registry).expect("encoding metrics");
        buffer
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish()
    }
}

fn decision_label(decision: &Decision) -> &'static str {
    match decision {
        Decision::Allow => "allow",
        Decision::PassUnauthenticated => "pass_unauthenticated",
        Decision::DenyRedirect { .. } => "deny_redirect",
        Decision::DenyForbidden { .. } => "deny_forbidden",
    }
}

/// Normalize a path for metrics labels.
///
/// Replaces dynamic segments (UUIDs, IDs) with placeholders to limit cardinality.
fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').collect();
    let normalized: Vec<String> = segments
        .into_iter()
        .map(|s| {
            // Replace UUIDs and numeric IDs with a placeholder to limit cardinality
            if uuid::Uuid::parse_str(s).is_ok()
                || (!s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
            {
                "{id}".to_string()
            } else {
                s.to_string()
            }
        })
        .collect();
    normalized.join("/")
}

#[cfg(test)]
// Tests are allowed to use unwrap/expect freely.
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/products/123"), "/products/{id}");
        assert_eq!(
            normalize_path("/admin/people/550e8400-e29b-41d4-a716-446655440000/edit"),
            "/admin/people/{id}/edit"
        );
        assert_eq!(normalize_path("/admin/settings"), "/admin/settings");
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        let output = metrics.encode();
        assert!(output.contains("http_requests_total"));
        assert!(output.contains("gate_decisions_total"));
    }

    #[test]
    fn test_record_decision() {
        let metrics = Metrics::new();
        metrics.record_decision("pos", &Decision::Allow);
        metrics.record_decision(
            "reports",
            &Decision::DenyForbidden {
                message: "denied".to_string(),
            },
        );

        let output = metrics.encode();
        assert!(output.contains("gate_decisions_total"));
        assert!(output.contains("deny_forbidden"));
    }
}
