//! Utility functions and helpers.

mod clock;
mod logging;
mod request_id;
mod shutdown;

pub use clock::{format_clock, unix_millis};
pub use logging::init_logging;
pub use request_id::{ConnectionId, generate_connection_id};
pub use shutdown::ShutdownSignal;
