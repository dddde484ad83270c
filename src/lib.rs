//! tcplb - a TCP (Layer 4) load balancer
//!
//! This crate provides:
//! - Raw byte forwarding with bounded connect retry
//! - Pluggable backend selection (round robin, adaptive least-active,
//!   consistent hashing, uniform random)
//! - Periodic health probing with RPS tracking and auto-scaling
//! - A line-based control port for registering backends at runtime
//! - Hot configuration reload and Prometheus metrics

pub mod backend;
pub mod config;
pub mod frontend;
pub mod health;
pub mod metrics;
pub mod proxy;
pub mod state;
pub mod util;

pub use config::Config;
pub use state::AppState;
