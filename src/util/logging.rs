//! Logging setup.

use crate::config::LogFormat;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `level` when set. hyper's connection chatter from the
/// metrics endpoint is capped at `warn` either way.
pub fn init_logging(level: &str, format: &LogFormat) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},hyper=warn,hyper_util=warn")));

    let subscriber = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => subscriber
            .with(fmt::layer().json().with_current_span(true).with_span_list(false))
            .try_init(),
        LogFormat::Pretty => subscriber.with(fmt::layer().with_target(false)).try_init(),
    }
}
