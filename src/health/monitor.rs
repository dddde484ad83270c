//! Periodic health monitor.
//!
//! Each cycle probes every registered backend in order, refreshes its check
//! stats and interval RPS, then hands the pool-wide average RPS to the
//! auto-scaler. Cycles run back to back with a fixed delay between them, so
//! two cycles never overlap.

use crate::backend::{Backend, BackendRegistry};
use crate::config::HealthCheckConfig;
use crate::health::autoscale::{AutoScaler, ScaleDecision};
use crate::health::checker::tcp_health_check;
use crate::metrics::MetricsCollector;
use crate::util::unix_millis;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Outcome of one monitor cycle.
#[derive(Debug)]
pub struct CycleReport {
    /// Backends probed this cycle.
    pub probed: usize,
    /// Backends healthy at the end of the cycle.
    pub healthy: usize,
    /// Mean interval RPS over healthy backends, 0 when none are healthy.
    pub average_rps: f64,
    /// Scaling outcome, or None when auto-scaling is off.
    pub scale: Option<ScaleDecision>,
}

/// Background task that keeps backend health and traffic stats current.
pub struct HealthMonitor {
    registry: Arc<BackendRegistry>,
    interval: Duration,
    probe_timeout: Duration,
    scaler: Option<AutoScaler>,
    metrics: MetricsCollector,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<BackendRegistry>,
        config: &HealthCheckConfig,
        scaler: Option<AutoScaler>,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            registry,
            interval: config.interval,
            probe_timeout: config.timeout,
            scaler,
            metrics,
        }
    }

    /// Run cycles until shutdown. The first cycle starts immediately.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            autoscale = self.scaler.is_some(),
            "health monitor starting"
        );

        loop {
            tokio::select! {
                _ = self.run_cycle() => {}
                _ = shutdown.recv() => {
                    info!("health monitor shutting down");
                    return;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.recv() => {
                    info!("health monitor shutting down");
                    return;
                }
            }
        }
    }

    /// Probe every backend once, update aggregates and maybe scale.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let servers = self.registry.snapshot();
        let mut rps_sum = 0.0;
        let mut healthy = 0usize;

        for backend in servers.iter() {
            self.check_backend(backend).await;

            let rps = backend.record_interval(self.interval, unix_millis());
            self.metrics.set_backend_rps(&backend.address(), rps);

            if backend.is_healthy() {
                rps_sum += rps;
                healthy += 1;
            }
        }

        let average_rps = if healthy == 0 {
            0.0
        } else {
            rps_sum / healthy as f64
        };
        self.metrics.set_average_rps(average_rps);

        log_aggregates(&servers, healthy, average_rps);

        let scale = self
            .scaler
            .as_mut()
            .map(|scaler| scaler.evaluate(average_rps, &self.registry, Instant::now()));

        match &scale {
            Some(ScaleDecision::Scaled(backend)) => {
                info!(backend = %backend.address(), "registered auto-scaled backend");
                self.metrics.record_scale_event(true);
            }
            Some(ScaleDecision::Failed) => self.metrics.record_scale_event(false),
            Some(ScaleDecision::CoolingDown { remaining }) => {
                debug!(
                    remaining_ms = remaining.as_millis() as u64,
                    "scale-up deferred by cooldown"
                );
            }
            Some(ScaleDecision::BelowThreshold) | None => {}
        }
        self.metrics.set_registry_size(self.registry.len());

        CycleReport {
            probed: servers.len(),
            healthy,
            average_rps,
            scale,
        }
    }

    /// Probe one backend and fold the result into its record.
    async fn check_backend(&self, backend: &Arc<Backend>) {
        let address = backend.address();
        let result = tcp_health_check(backend.host(), backend.port(), self.probe_timeout).await;
        let now = unix_millis();
        let up = result.is_ok();

        match result {
            Ok(()) => backend.record_check_success(now),
            Err(e) => {
                debug!(backend = %address, error = %e, "health probe failed");
                backend.record_check_failure(now);
            }
        }
        self.metrics.record_health_check(&address, up);

        let was_up = backend.set_healthy(up);
        if was_up != up {
            if up {
                info!(backend = %address, from = "DOWN", to = "UP", "backend health changed");
            } else {
                warn!(backend = %address, from = "UP", to = "DOWN", "backend health changed");
            }
        }
        self.metrics.set_backend_health(&address, up);
    }
}

fn log_aggregates(servers: &[Arc<Backend>], healthy: usize, average_rps: f64) {
    let busiest = servers.iter().max_by_key(|b| b.total_requests());
    let quietest = servers.iter().min_by_key(|b| b.total_requests());

    if let (Some(busiest), Some(quietest)) = (busiest, quietest) {
        info!(
            max_requests_backend = %busiest.address(),
            max_requests = busiest.total_requests(),
            min_requests_backend = %quietest.address(),
            min_requests = quietest.total_requests(),
            average_rps = format!("{:.2}", average_rps),
            healthy,
            total = servers.len(),
            "health cycle complete"
        );
    } else {
        info!("health cycle complete, no backends registered");
    }

    for backend in servers {
        info!(summary = %backend, "backend status");
    }
}
