//! Backend records, the shared registry and selection strategies.

pub mod algorithms;
mod registry;
mod router;
mod server;

pub use registry::BackendRegistry;
pub use router::BackendRouter;
pub use server::{
    ActiveRequest, Backend, BackendSnapshot, FAILURE_HISTORY_CAPACITY, LatencyRange, RpsSample,
    TrafficStats, interval_rps,
};
