//! TCP forwarding between clients and backends.

mod forwarder;
mod tcp_proxy;

pub use forwarder::{ForwardSettings, ForwardSummary, Forwarder};
pub use tcp_proxy::{ForwardError, ProxyResult, connect_to_backend, proxy_bidirectional};
