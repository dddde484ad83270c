//! Shared application state.

use crate::backend::{BackendRegistry, BackendRouter};
use crate::config::Config;
use crate::health::{AutoScaler, CommandProvisioner, HealthMonitor, Provisioner};
use crate::metrics::MetricsCollector;
use crate::proxy::{ForwardSettings, Forwarder};
use crate::util::ShutdownSignal;
use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared state accessible from all tasks.
#[derive(Clone)]
pub struct AppState {
    /// Current configuration (swapped atomically on reload).
    config: Arc<ArcSwap<Config>>,

    /// Live set of backends.
    registry: Arc<BackendRegistry>,

    /// Strategy over the registry, fixed at startup.
    router: Arc<BackendRouter>,

    /// Metrics collector.
    metrics: MetricsCollector,

    /// Shutdown signal.
    shutdown: ShutdownSignal,
}

impl AppState {
    /// Create application state, registering the configured backends.
    pub fn new(config: Config) -> Self {
        let registry = Arc::new(BackendRegistry::with_backends(
            config.backends.iter().map(|b| (b.host.clone(), b.port)),
        ));
        let router = Arc::new(BackendRouter::new(
            Arc::clone(&registry),
            &config.frontend.strategy,
        ));
        let metrics = MetricsCollector::new();
        metrics.set_registry_size(registry.len());

        Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            registry,
            router,
            metrics,
            shutdown: ShutdownSignal::new(),
        }
    }

    /// Get the current configuration.
    pub fn config(&self) -> arc_swap::Guard<Arc<Config>> {
        self.config.load()
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &Arc<BackendRouter> {
        &self.router
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Get the shutdown signal.
    pub fn shutdown(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Trigger shutdown.
    pub fn trigger_shutdown(&self) {
        self.shutdown.shutdown();
    }

    /// A forwarder using the current frontend settings.
    pub fn forwarder(&self) -> Forwarder {
        Forwarder::new(
            Arc::clone(&self.router),
            ForwardSettings::from(&self.config().frontend),
            self.metrics.clone(),
        )
    }

    /// A health monitor using the configured launch command for scale-ups.
    pub fn health_monitor(&self) -> HealthMonitor {
        let config = self.config();
        let provisioner = Arc::new(CommandProvisioner::new(config.autoscale.command.clone()));
        self.health_monitor_with(provisioner)
    }

    /// A health monitor using an explicit provisioner.
    pub fn health_monitor_with(&self, provisioner: Arc<dyn Provisioner>) -> HealthMonitor {
        let config = self.config();
        let scaler = config
            .autoscale
            .enabled
            .then(|| AutoScaler::new(&config.autoscale, provisioner));

        HealthMonitor::new(
            Arc::clone(&self.registry),
            &config.health_check,
            scaler,
            self.metrics.clone(),
        )
    }

    /// Apply a reloaded configuration.
    ///
    /// Backends not yet registered are appended; the registry never shrinks.
    /// Every other section keeps its startup value. Returns how many backends
    /// were added.
    pub fn apply_reload(&self, new_config: Config) -> usize {
        let current = self.config.load_full();
        if current.frontend.listen != new_config.frontend.listen
            || current.frontend.strategy != new_config.frontend.strategy
            || current.control.listen != new_config.control.listen
        {
            warn!("listener and strategy changes require a restart; ignoring them");
        }

        let added = new_config
            .backends
            .iter()
            .filter_map(|b| self.registry.add_if_absent(&b.host, b.port))
            .count();

        if added > 0 {
            info!(added, total = self.registry.len(), "backends added from reloaded config");
            self.metrics.set_registry_size(self.registry.len());
        }

        let mut merged = Config::clone(&current);
        merged.backends = new_config.backends;
        self.config.store(Arc::new(merged));
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendAddress;

    fn config(ports: &[u16]) -> Config {
        Config {
            backends: ports
                .iter()
                .map(|&p| BackendAddress::new("localhost", p))
                .collect(),
            ..Config::default()
        }
    }

    #[test]
    fn test_new_registers_backends() {
        let state = AppState::new(config(&[9081, 9082, 9083]));
        assert_eq!(state.registry().len(), 3);
        assert_eq!(state.router().strategy_name(), "adaptive");
    }

    #[test]
    fn test_apply_reload_only_grows() {
        let state = AppState::new(config(&[9081, 9082]));

        // 9082 kept, 9081 dropped from file, 9090 new
        let added = state.apply_reload(config(&[9082, 9090]));
        assert_eq!(added, 1);
        assert_eq!(state.registry().len(), 3);
        assert!(state.registry().contains("localhost", 9081));
        assert!(state.registry().contains("localhost", 9090));

        // Same file again adds nothing
        assert_eq!(state.apply_reload(config(&[9082, 9090])), 0);
    }

    #[test]
    fn test_shutdown_flag() {
        let state = AppState::new(config(&[9081]));
        assert!(!state.shutdown().is_triggered());
        state.trigger_shutdown();
        assert!(state.shutdown().is_triggered());
    }
}
