//! Backend selection strategies.

mod consistent_hash;
mod least_conn;
mod random;
mod round_robin;

pub use consistent_hash::ConsistentHash;
pub use least_conn::Adaptive;
pub use random::UniformRandom;
pub use round_robin::RoundRobin;

use crate::backend::Backend;
use crate::config::Strategy;
use std::sync::Arc;

/// Trait for backend selection strategies.
///
/// Implementations only read backend state; they never mutate records and
/// never block.
pub trait LoadBalancer: Send + Sync {
    /// Select a backend server.
    ///
    /// # Arguments
    ///
    /// * `servers` - Current registry snapshot, in registration order
    /// * `client_id` - Client identifier (used by consistent hashing)
    ///
    /// # Returns
    ///
    /// The selected backend, or None if no eligible backend exists.
    fn select(&self, servers: &[Arc<Backend>], client_id: Option<&str>) -> Option<Arc<Backend>>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Build the strategy configured at startup.
pub fn build(strategy: &Strategy) -> Arc<dyn LoadBalancer> {
    match strategy {
        Strategy::RoundRobin => Arc::new(RoundRobin::new()),
        Strategy::Adaptive => Arc::new(Adaptive::new()),
        Strategy::ConsistentHash => Arc::new(ConsistentHash::new()),
        Strategy::Random => Arc::new(UniformRandom::new()),
    }
}
