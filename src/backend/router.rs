//! Backend router for selecting upstream servers.

use crate::backend::algorithms::{self, LoadBalancer};
use crate::backend::{Backend, BackendRegistry};
use crate::config::Strategy;
use std::sync::Arc;
use tracing::{debug, warn};

/// Routes connections to backend servers using the configured strategy.
pub struct BackendRouter {
    /// Live set of backends.
    registry: Arc<BackendRegistry>,
    /// The selection strategy.
    algorithm: Arc<dyn LoadBalancer>,
}

impl BackendRouter {
    /// Create a router for the strategy chosen in configuration.
    pub fn new(registry: Arc<BackendRegistry>, strategy: &Strategy) -> Self {
        Self::with_algorithm(registry, algorithms::build(strategy))
    }

    /// Create a router with an explicit strategy implementation.
    pub fn with_algorithm(registry: Arc<BackendRegistry>, algorithm: Arc<dyn LoadBalancer>) -> Self {
        Self {
            registry,
            algorithm,
        }
    }

    /// Select a backend server over the current registry contents.
    ///
    /// # Arguments
    ///
    /// * `client_id` - Client identifier (used by consistent hashing)
    ///
    /// # Returns
    ///
    /// The selected backend, or None if no eligible backend exists.
    pub fn select(&self, client_id: Option<&str>) -> Option<Arc<Backend>> {
        let servers = self.registry.snapshot();

        if servers.is_empty() {
            warn!("no backend servers registered");
            return None;
        }

        let selected = self.algorithm.select(&servers, client_id);

        match &selected {
            Some(backend) => {
                debug!(strategy = self.algorithm.name(), server = %backend.address(), "selected backend server");
            }
            None => {
                warn!(
                    strategy = self.algorithm.name(),
                    servers = servers.len(),
                    "no healthy backend servers available"
                );
            }
        }

        selected
    }

    /// The registry this router selects from.
    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    /// Name of the active strategy.
    pub fn strategy_name(&self) -> &'static str {
        self.algorithm.name()
    }
}
