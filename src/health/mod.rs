//! Backend health monitoring and pool scaling.

mod autoscale;
mod checker;
mod monitor;
mod provision;

pub use autoscale::{AutoScaler, ScaleDecision};
pub use checker::{ProbeError, tcp_health_check};
pub use monitor::{CycleReport, HealthMonitor};
pub use provision::{CommandProvisioner, ProvisionError, Provisioner};
