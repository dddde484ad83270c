//! Metrics collection and exposition.

mod collector;
mod server;

pub use collector::{ForwardOutcome, MetricsCollector};
pub use server::MetricsServer;
