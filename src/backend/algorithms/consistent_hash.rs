//! Client-affinity hashing algorithm.

use super::LoadBalancer;
use crate::backend::Backend;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Hash-mod-N client affinity.
///
/// Hashes the client identifier with SHA-256, reads the first four bytes as a
/// big-endian `u32` and takes it modulo the number of servers. The same client
/// maps to the same server as long as the list is unchanged. This is not a
/// hash ring: growing the list remaps most clients. Health is not consulted.
pub struct ConsistentHash;

impl ConsistentHash {
    /// Create a new hashing load balancer.
    pub fn new() -> Self {
        Self
    }

    /// Index a client identifier maps to in a list of `len` servers.
    pub fn index_for(client_id: &str, len: usize) -> usize {
        let digest = Sha256::digest(client_id.as_bytes());
        let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        prefix as usize % len
    }
}

impl Default for ConsistentHash {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadBalancer for ConsistentHash {
    fn select(&self, servers: &[Arc<Backend>], client_id: Option<&str>) -> Option<Arc<Backend>> {
        if servers.is_empty() {
            return None;
        }

        let idx = Self::index_for(client_id.unwrap_or_default(), servers.len());
        Some(Arc::clone(&servers[idx]))
    }

    fn name(&self) -> &'static str {
        "consistent_hash"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::algorithms::test_support::backends;

    #[test]
    fn test_hash_is_deterministic() {
        let hash = ConsistentHash::new();
        let servers = backends(4);

        let first = hash.select(&servers, Some("192.168.1.100")).unwrap();
        for _ in 0..10 {
            let again = hash.select(&servers, Some("192.168.1.100")).unwrap();
            assert!(Arc::ptr_eq(&first, &again));
        }
    }

    #[test]
    fn test_hash_stateless_across_instances() {
        let servers = backends(5);
        let a = ConsistentHash::new().select(&servers, Some("10.1.2.3")).unwrap();
        let b = ConsistentHash::new().select(&servers, Some("10.1.2.3")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_hash_index_from_digest_prefix() {
        // sha256("") = e3b0c442...
        let prefix = 0xe3b0_c442u32 as usize;
        assert_eq!(ConsistentHash::index_for("", 7), prefix % 7);
        // sha256("abc") = ba7816bf...
        let prefix = 0xba78_16bfu32 as usize;
        assert_eq!(ConsistentHash::index_for("abc", 3), prefix % 3);
    }

    #[test]
    fn test_hash_does_not_filter_unhealthy() {
        let hash = ConsistentHash::new();
        let servers = backends(3);
        for server in &servers {
            server.set_healthy(false);
        }
        assert!(hash.select(&servers, Some("10.0.0.1")).is_some());
    }

    #[test]
    fn test_hash_empty() {
        let hash = ConsistentHash::new();
        assert!(hash.select(&[], Some("10.0.0.1")).is_none());
    }

    #[test]
    fn test_missing_client_id_hashes_as_empty() {
        let hash = ConsistentHash::new();
        let servers = backends(4);
        let none = hash.select(&servers, None).unwrap();
        let empty = hash.select(&servers, Some("")).unwrap();
        assert!(Arc::ptr_eq(&none, &empty));
    }
}
