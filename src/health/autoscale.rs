//! Pool growth under sustained load.

use crate::backend::{Backend, BackendRegistry};
use crate::config::AutoscaleConfig;
use crate::health::provision::Provisioner;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// What the scaler did with one cycle's average RPS.
#[derive(Debug, Clone)]
pub enum ScaleDecision {
    /// Load at or under the threshold.
    BelowThreshold,
    /// Over the threshold but the last scale-up is too recent.
    CoolingDown { remaining: Duration },
    /// A backend was launched and registered.
    Scaled(Arc<Backend>),
    /// The launch failed; nothing was registered.
    Failed,
}

/// Adds a backend when the average RPS stays over a threshold.
///
/// Ports count up from the configured start; a port is only consumed by a
/// successful launch.
pub struct AutoScaler {
    threshold: f64,
    cooldown: Duration,
    host: String,
    next_port: u16,
    last_scale: Option<Instant>,
    provisioner: Arc<dyn Provisioner>,
}

impl AutoScaler {
    pub fn new(config: &AutoscaleConfig, provisioner: Arc<dyn Provisioner>) -> Self {
        Self {
            threshold: config.rps_threshold,
            cooldown: config.cooldown,
            host: config.host.clone(),
            next_port: config.start_port,
            last_scale: None,
            provisioner,
        }
    }

    pub fn next_port(&self) -> u16 {
        self.next_port
    }

    pub fn last_scale(&self) -> Option<Instant> {
        self.last_scale
    }

    /// Scale up if `average_rps` warrants it and the cooldown has elapsed.
    pub fn evaluate(
        &mut self,
        average_rps: f64,
        registry: &BackendRegistry,
        now: Instant,
    ) -> ScaleDecision {
        if average_rps <= self.threshold {
            return ScaleDecision::BelowThreshold;
        }

        if let Some(last) = self.last_scale {
            let elapsed = now.saturating_duration_since(last);
            if elapsed <= self.cooldown {
                return ScaleDecision::CoolingDown {
                    remaining: self.cooldown - elapsed,
                };
            }
        }

        let port = self.next_port;
        info!(
            average_rps,
            threshold = self.threshold,
            host = %self.host,
            port,
            "average RPS over threshold, scaling up"
        );

        match self.provisioner.provision(port) {
            Ok(()) => {
                let backend = registry.add(self.host.clone(), port);
                self.next_port = port.wrapping_add(1).max(1);
                self.last_scale = Some(now);
                ScaleDecision::Scaled(backend)
            }
            Err(e) => {
                error!(port, error = %e, "scale-up failed");
                ScaleDecision::Failed
            }
        }
    }
}

impl fmt::Debug for AutoScaler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoScaler")
            .field("threshold", &self.threshold)
            .field("cooldown", &self.cooldown)
            .field("host", &self.host)
            .field("next_port", &self.next_port)
            .field("last_scale", &self.last_scale)
            .finish_non_exhaustive()
    }
}
