//! Uniform random load balancing algorithm.

use super::LoadBalancer;
use crate::backend::Backend;
use rand::Rng;
use std::sync::Arc;

/// Picks a uniformly random server from the full list.
///
/// Unlike the other strategies this does not skip unhealthy servers; a
/// connect failure on a dead pick is left to the forwarder's retry.
pub struct UniformRandom;

impl UniformRandom {
    /// Create a new random load balancer.
    pub fn new() -> Self {
        Self
    }
}

impl Default for UniformRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadBalancer for UniformRandom {
    fn select(&self, servers: &[Arc<Backend>], _client_id: Option<&str>) -> Option<Arc<Backend>> {
        if servers.is_empty() {
            return None;
        }

        let idx = rand::thread_rng().gen_range(0..servers.len());
        Some(Arc::clone(&servers[idx]))
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::algorithms::test_support::backends;
    use std::collections::HashMap;

    #[test]
    fn test_random_distribution() {
        let random = UniformRandom::new();
        let servers = backends(4);
        let draws = 40_000;

        let mut counts: HashMap<u16, usize> = HashMap::new();
        for _ in 0..draws {
            let selected = random.select(&servers, None).unwrap();
            *counts.entry(selected.port()).or_default() += 1;
        }

        assert_eq!(counts.len(), 4);
        let expected = draws / 4;
        for (&port, &count) in &counts {
            // ~10 sigma away from the expected 10_000
            assert!(
                count.abs_diff(expected) < 900,
                "backend {} selected {} times, expected about {}",
                port,
                count,
                expected
            );
        }
    }

    #[test]
    fn test_random_selects_unhealthy() {
        let random = UniformRandom::new();
        let servers = backends(1);
        servers[0].set_healthy(false);

        let selected = random.select(&servers, None).unwrap();
        assert!(!selected.is_healthy());
    }

    #[test]
    fn test_random_empty() {
        let random = UniformRandom::new();
        assert!(random.select(&[], None).is_none());
    }
}
