//! Adaptive (least active connections) load balancing algorithm.

use super::{LoadBalancer, RoundRobin};
use crate::backend::Backend;
use std::sync::Arc;

/// Scores within this distance of the minimum count as a tie.
const SCORE_EPSILON: f64 = 1e-3;

/// Adaptive load balancer.
///
/// Sends requests to the healthy server with the fewest active requests.
/// Ties are broken with an internal round-robin over the tied servers, so
/// repeated ties rotate instead of always landing on the first one.
///
/// The score is the active request count alone. Latency is recorded on each
/// backend but is not weighed in here.
pub struct Adaptive {
    tie_breaker: RoundRobin,
}

impl Adaptive {
    /// Create a new adaptive load balancer.
    pub fn new() -> Self {
        Self {
            tie_breaker: RoundRobin::new(),
        }
    }

    fn score(server: &Backend) -> f64 {
        server.active_requests() as f64
    }
}

impl Default for Adaptive {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadBalancer for Adaptive {
    fn select(&self, servers: &[Arc<Backend>], _client_id: Option<&str>) -> Option<Arc<Backend>> {
        let mut candidates: Vec<Arc<Backend>> = Vec::new();
        let mut min_score = f64::MAX;

        for server in servers.iter().filter(|s| s.is_healthy()) {
            let score = Self::score(server);
            if score < min_score - SCORE_EPSILON {
                min_score = score;
                candidates.clear();
                candidates.push(Arc::clone(server));
            } else if (score - min_score).abs() < SCORE_EPSILON {
                candidates.push(Arc::clone(server));
            }
        }

        match candidates.len() {
            0 => None,
            1 => candidates.pop(),
            _ => self.tie_breaker.select(&candidates, None),
        }
    }

    fn name(&self) -> &'static str {
        "adaptive"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::algorithms::test_support::backends;

    fn with_active(counts: &[usize]) -> Vec<Arc<Backend>> {
        let servers = backends(counts.len() as u16);
        for (server, &count) in servers.iter().zip(counts) {
            for _ in 0..count {
                server.begin_request();
            }
        }
        servers
    }

    #[test]
    fn test_adaptive_selects_lowest() {
        let lc = Adaptive::new();
        let servers = with_active(&[2, 1, 0]);

        let selected = lc.select(&servers, None).unwrap();
        assert_eq!(selected.port(), 9003);
    }

    #[test]
    fn test_adaptive_ties_alternate() {
        let lc = Adaptive::new();
        let servers = with_active(&[0, 0, 3, 5]);

        let picks: Vec<u16> = (0..20)
            .map(|_| lc.select(&servers, None).unwrap().port())
            .collect();

        assert!(picks.iter().all(|&p| p == 9001 || p == 9002));
        for pair in picks.windows(2) {
            assert_ne!(pair[0], pair[1], "tie-break did not rotate");
        }
    }

    #[test]
    fn test_adaptive_ignores_unhealthy() {
        let lc = Adaptive::new();
        let servers = with_active(&[0, 4, 7]);
        servers[0].set_healthy(false);

        let selected = lc.select(&servers, None).unwrap();
        assert_eq!(selected.port(), 9002);
    }

    #[test]
    fn test_adaptive_all_unhealthy() {
        let lc = Adaptive::new();
        let servers = with_active(&[0, 0]);
        for server in &servers {
            server.set_healthy(false);
        }
        assert!(lc.select(&servers, None).is_none());
    }

    #[test]
    fn test_adaptive_empty() {
        let lc = Adaptive::new();
        assert!(lc.select(&[], None).is_none());
    }

    #[test]
    fn test_adaptive_follows_load_changes() {
        let lc = Adaptive::new();
        let servers = with_active(&[1, 0]);
        assert_eq!(lc.select(&servers, None).unwrap().port(), 9002);

        servers[1].begin_request();
        servers[1].begin_request();
        assert_eq!(lc.select(&servers, None).unwrap().port(), 9001);
    }
}
