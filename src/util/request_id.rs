//! Connection ID generation for log correlation.
//!
//! Every accepted client connection gets a short, process-unique identifier
//! that is attached to the tracing span covering its whole lifetime.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for connection IDs.
static CONNECTION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a connection ID based on a counter.
///
/// Only unique within a single process.
/// Format: `conn-{counter}` where counter is zero-padded to 12 hex digits.
pub fn generate_connection_id() -> String {
    let count = CONNECTION_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("conn-{:012x}", count)
}

/// Connection ID wrapper that can be included in tracing spans.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Allocate the next connection ID.
    pub fn next() -> Self {
        Self(generate_connection_id())
    }

    /// Get the connection ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ConnectionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
