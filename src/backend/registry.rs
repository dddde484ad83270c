//! Backend registry.
//!
//! Ordered, append-only collection of backend records. Readers take a
//! snapshot of the current list; appends publish a new list atomically so a
//! reader sees either the old or the new state, never a partial one.

use crate::backend::Backend;
use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::info;

/// Shared list of every known backend.
#[derive(Debug)]
pub struct BackendRegistry {
    backends: ArcSwap<Vec<Arc<Backend>>>,
}

impl BackendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            backends: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Create a registry from an initial list of `(host, port)` pairs.
    pub fn with_backends<I, S>(backends: I) -> Self
    where
        I: IntoIterator<Item = (S, u16)>,
        S: Into<String>,
    {
        let list = backends
            .into_iter()
            .map(|(host, port)| Arc::new(Backend::new(host, port)))
            .collect();
        Self {
            backends: ArcSwap::from_pointee(list),
        }
    }

    /// Current list of backends, in registration order.
    pub fn snapshot(&self) -> Arc<Vec<Arc<Backend>>> {
        self.backends.load_full()
    }

    /// Append a new backend record and return it.
    pub fn add(&self, host: impl Into<String>, port: u16) -> Arc<Backend> {
        let backend = Arc::new(Backend::new(host, port));
        self.backends.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(Arc::clone(&backend));
            next
        });
        info!(backend = %backend.address(), total = self.len(), "backend registered");
        backend
    }

    /// Append a backend unless one with the same endpoint is already registered.
    ///
    /// Returns the new record, or `None` if it was already present.
    pub fn add_if_absent(&self, host: &str, port: u16) -> Option<Arc<Backend>> {
        if self.contains(host, port) {
            return None;
        }
        Some(self.add(host, port))
    }

    /// Whether a backend with this endpoint is registered.
    pub fn contains(&self, host: &str, port: u16) -> bool {
        self.backends.load().iter().any(|b| b.matches(host, port))
    }

    pub fn len(&self) -> usize {
        self.backends.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_preserves_order() {
        let registry = BackendRegistry::with_backends([("localhost", 9081), ("localhost", 9082)]);
        registry.add("10.0.0.5", 9100);

        let ports: Vec<u16> = registry.snapshot().iter().map(|b| b.port()).collect();
        assert_eq!(ports, vec![9081, 9082, 9100]);
    }

    #[test]
    fn test_snapshot_unaffected_by_append() {
        let registry = BackendRegistry::with_backends([("localhost", 9081)]);
        let before = registry.snapshot();

        registry.add("localhost", 9082);

        assert_eq!(before.len(), 1);
        assert_eq!(registry.snapshot().len(), 2);
    }

    #[test]
    fn test_records_shared_across_snapshots() {
        let registry = BackendRegistry::with_backends([("localhost", 9081)]);
        let first = registry.snapshot();
        registry.add("localhost", 9082);
        let second = registry.snapshot();

        first[0].record_request();
        assert_eq!(second[0].total_requests(), 1);
    }

    #[test]
    fn test_add_if_absent() {
        let registry = BackendRegistry::new();
        assert!(registry.is_empty());

        assert!(registry.add_if_absent("localhost", 9081).is_some());
        assert!(registry.add_if_absent("LOCALHOST", 9081).is_none());
        assert!(registry.add_if_absent("localhost", 9082).is_some());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_concurrent_appends_not_lost() {
        let registry = Arc::new(BackendRegistry::new());
        let handles: Vec<_> = (0..8u16)
            .map(|t| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for i in 0..25u16 {
                        registry.add("localhost", 10_000 + t * 100 + i);
                        // Readers never see a torn list
                        assert!(registry.snapshot().iter().all(|b| b.port() >= 10_000));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 200);
    }
}
