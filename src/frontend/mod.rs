//! Network entry points.
//!
//! Client listeners hand each connection to the forwarder; the control
//! listener accepts backend registrations at runtime.

mod control;
mod listener;

pub use control::{ControlCommand, ControlError, ControlListener, USAGE_REPLY, parse_command};
pub use listener::FrontendListener;
