//! Metrics collector using prometheus-client.
//!
//! Provides metrics for client connections, forwarding outcomes, per-backend
//! traffic, health checks and pool scaling.

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

/// Labels for client-facing listener metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ListenerLabels {
    pub listener: String,
}

/// Labels for per-backend metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct BackendLabels {
    pub backend: String,
}

/// Labels for bytes transferred metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct BytesLabels {
    pub backend: String,
    pub direction: Direction,
}

/// Direction of bytes transfer.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum Direction {
    /// Client to backend.
    Inbound,
    /// Backend to client.
    Outbound,
}

/// Labels for forwarding outcome metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OutcomeLabels {
    pub outcome: ForwardOutcome,
}

/// How a client connection ended.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum ForwardOutcome {
    Completed,
    NoBackend,
    Exhausted,
    Failed,
}

/// Labels for health check metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HealthCheckLabels {
    pub backend: String,
    pub result: CheckResult,
}

/// Labels for scale event metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ScaleLabels {
    pub result: CheckResult,
}

/// Result of a health check or scale-up attempt.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum CheckResult {
    Success,
    Failure,
}

impl From<bool> for CheckResult {
    fn from(success: bool) -> Self {
        if success {
            CheckResult::Success
        } else {
            CheckResult::Failure
        }
    }
}

/// Collects and stores all metrics.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<MetricsCollectorInner>,
}

struct MetricsCollectorInner {
    /// Accepted client connections per listener.
    connections_total: Family<ListenerLabels, Counter>,
    /// Client connections by how they ended.
    forwards_total: Family<OutcomeLabels, Counter>,
    /// Successful backend connects.
    backend_requests_total: Family<BackendLabels, Counter>,
    /// Failed backend connect attempts.
    connect_failures_total: Family<BackendLabels, Counter>,
    /// In-flight forwarded connections.
    active_requests: Family<BackendLabels, Gauge>,
    /// Forwarded session duration (in seconds).
    session_duration_seconds: Family<BackendLabels, Histogram>,
    /// Bytes relayed.
    bytes_total: Family<BytesLabels, Counter>,
    /// Backend health gauge (1 = healthy, 0 = unhealthy).
    backend_health: Family<BackendLabels, Gauge>,
    /// Health check results.
    health_checks_total: Family<HealthCheckLabels, Counter>,
    /// Requests per second over the last check interval.
    backend_rps: Family<BackendLabels, Gauge<f64, AtomicU64>>,
    /// Average RPS across healthy backends.
    average_rps: Gauge<f64, AtomicU64>,
    /// Scale-up attempts.
    scale_events_total: Family<ScaleLabels, Counter>,
    /// Registered backends.
    registry_size: Gauge,
    /// The prometheus registry.
    registry: Registry,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let connections_total = Family::<ListenerLabels, Counter>::default();
        let forwards_total = Family::<OutcomeLabels, Counter>::default();
        let backend_requests_total = Family::<BackendLabels, Counter>::default();
        let connect_failures_total = Family::<BackendLabels, Counter>::default();
        let active_requests = Family::<BackendLabels, Gauge>::default();
        let session_duration_seconds =
            Family::<BackendLabels, Histogram>::new_with_constructor(|| {
                // 1ms up to roughly 4 minutes; sessions are long-lived streams
                Histogram::new(exponential_buckets(0.001, 4.0, 10))
            });
        let bytes_total = Family::<BytesLabels, Counter>::default();
        let backend_health = Family::<BackendLabels, Gauge>::default();
        let health_checks_total = Family::<HealthCheckLabels, Counter>::default();
        let backend_rps = Family::<BackendLabels, Gauge<f64, AtomicU64>>::default();
        let average_rps = Gauge::<f64, AtomicU64>::default();
        let scale_events_total = Family::<ScaleLabels, Counter>::default();
        let registry_size = Gauge::default();

        registry.register(
            "tcplb_connections",
            "Total client connections accepted",
            connections_total.clone(),
        );
        registry.register(
            "tcplb_forwards",
            "Client connections by forwarding outcome",
            forwards_total.clone(),
        );
        registry.register(
            "tcplb_backend_requests",
            "Connections successfully forwarded to a backend",
            backend_requests_total.clone(),
        );
        registry.register(
            "tcplb_backend_connect_failures",
            "Failed backend connect attempts",
            connect_failures_total.clone(),
        );
        registry.register(
            "tcplb_active_requests",
            "Forwarded connections currently in flight",
            active_requests.clone(),
        );
        registry.register(
            "tcplb_session_duration_seconds",
            "Forwarded session duration in seconds, measured from backend connect",
            session_duration_seconds.clone(),
        );
        registry.register("tcplb_bytes", "Total bytes relayed", bytes_total.clone());
        registry.register(
            "tcplb_backend_health",
            "Backend health status (1=healthy, 0=unhealthy)",
            backend_health.clone(),
        );
        registry.register(
            "tcplb_health_checks",
            "Total number of health probes performed",
            health_checks_total.clone(),
        );
        registry.register(
            "tcplb_backend_rps",
            "Requests per second during the last check interval",
            backend_rps.clone(),
        );
        registry.register(
            "tcplb_average_rps",
            "Average requests per second across healthy backends",
            average_rps.clone(),
        );
        registry.register(
            "tcplb_scale_events",
            "Backend scale-up attempts",
            scale_events_total.clone(),
        );
        registry.register(
            "tcplb_registered_backends",
            "Number of backends in the registry",
            registry_size.clone(),
        );

        Self {
            inner: Arc::new(MetricsCollectorInner {
                connections_total,
                forwards_total,
                backend_requests_total,
                connect_failures_total,
                active_requests,
                session_duration_seconds,
                bytes_total,
                backend_health,
                health_checks_total,
                backend_rps,
                average_rps,
                scale_events_total,
                registry_size,
                registry,
            }),
        }
    }

    /// Get the prometheus registry for encoding.
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    fn backend_labels(backend: &str) -> BackendLabels {
        BackendLabels {
            backend: backend.to_string(),
        }
    }

    /// Record an accepted client connection.
    pub fn connection_accepted(&self, listener: &str) {
        let labels = ListenerLabels {
            listener: listener.to_string(),
        };
        self.inner.connections_total.get_or_create(&labels).inc();
    }

    /// Record how a client connection ended.
    pub fn record_outcome(&self, outcome: ForwardOutcome) {
        self.inner
            .forwards_total
            .get_or_create(&OutcomeLabels { outcome })
            .inc();
    }

    /// Record a successful backend connect.
    pub fn backend_request(&self, backend: &str) {
        self.inner
            .backend_requests_total
            .get_or_create(&Self::backend_labels(backend))
            .inc();
    }

    /// Record a failed backend connect attempt.
    pub fn connect_failure(&self, backend: &str) {
        self.inner
            .connect_failures_total
            .get_or_create(&Self::backend_labels(backend))
            .inc();
    }

    /// Mirror a backend's in-flight count.
    pub fn set_active_requests(&self, backend: &str, active: usize) {
        self.inner
            .active_requests
            .get_or_create(&Self::backend_labels(backend))
            .set(i64::try_from(active).unwrap_or(i64::MAX));
    }

    /// Record a finished forwarding session.
    pub fn record_session(
        &self,
        backend: &str,
        bytes_to_backend: u64,
        bytes_to_client: u64,
        duration: Duration,
    ) {
        self.inner
            .session_duration_seconds
            .get_or_create(&Self::backend_labels(backend))
            .observe(duration.as_secs_f64());

        let inbound_labels = BytesLabels {
            backend: backend.to_string(),
            direction: Direction::Inbound,
        };
        self.inner
            .bytes_total
            .get_or_create(&inbound_labels)
            .inc_by(bytes_to_backend);

        let outbound_labels = BytesLabels {
            backend: backend.to_string(),
            direction: Direction::Outbound,
        };
        self.inner
            .bytes_total
            .get_or_create(&outbound_labels)
            .inc_by(bytes_to_client);
    }

    /// Update backend health status.
    pub fn set_backend_health(&self, backend: &str, healthy: bool) {
        self.inner
            .backend_health
            .get_or_create(&Self::backend_labels(backend))
            .set(if healthy { 1 } else { 0 });
    }

    /// Record a health probe result.
    pub fn record_health_check(&self, backend: &str, success: bool) {
        let labels = HealthCheckLabels {
            backend: backend.to_string(),
            result: success.into(),
        };
        self.inner.health_checks_total.get_or_create(&labels).inc();
    }

    /// Update a backend's interval RPS.
    pub fn set_backend_rps(&self, backend: &str, rps: f64) {
        self.inner
            .backend_rps
            .get_or_create(&Self::backend_labels(backend))
            .set(rps);
    }

    /// Update the pool-wide average RPS.
    pub fn set_average_rps(&self, rps: f64) {
        self.inner.average_rps.set(rps);
    }

    /// Record a scale-up attempt.
    pub fn record_scale_event(&self, success: bool) {
        let labels = ScaleLabels {
            result: success.into(),
        };
        self.inner.scale_events_total.get_or_create(&labels).inc();
    }

    /// Update the registered backend count.
    pub fn set_registry_size(&self, size: usize) {
        self.inner
            .registry_size
            .set(i64::try_from(size).unwrap_or(i64::MAX));
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
