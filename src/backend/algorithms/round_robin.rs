//! Round-robin load balancing algorithm.

use super::LoadBalancer;
use crate::backend::Backend;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Round-robin load balancer.
///
/// Walks the server list with a shared counter, skipping unhealthy servers.
/// A single call inspects at most one full lap, so an all-unhealthy list
/// returns `None` instead of spinning.
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    /// Create a new round-robin load balancer.
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }
}

impl Default for RoundRobin {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadBalancer for RoundRobin {
    fn select(&self, servers: &[Arc<Backend>], _client_id: Option<&str>) -> Option<Arc<Backend>> {
        if servers.is_empty() {
            return None;
        }

        for _ in 0..servers.len() {
            let idx = self.counter.fetch_add(1, Ordering::Relaxed) % servers.len();
            let server = &servers[idx];
            if server.is_healthy() {
                return Some(Arc::clone(server));
            }
        }

        None
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}
