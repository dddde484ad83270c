//! tcplb - a self-scaling TCP load balancer
//!
//! Usage:
//!     tcplb [--config <path>] [BACKEND...]
//!
//! See --help for more options.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use tcplb::AppState;
use tcplb::config::{BackendAddress, Config, ConfigWatcher, Strategy, read_config, validate_config};
use tcplb::frontend::{ControlListener, FrontendListener};
use tcplb::metrics::MetricsServer;
use tcplb::util::init_logging;

/// A self-scaling TCP load balancer.
#[derive(Parser, Debug)]
#[command(name = "tcplb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Override the backend selection strategy
    #[arg(short, long, value_enum)]
    strategy: Option<Strategy>,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,

    /// Backends as PORT (on localhost) or HOST:PORT; replaces the file's list
    #[arg(value_name = "BACKEND")]
    backends: Vec<BackendAddress>,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    let config = build_config(&cli)?;

    init_logging(&config.global.log_level, &config.global.log_format)
        .context("failed to initialize logging")?;

    // If --validate flag, just validate and exit
    if cli.validate {
        info!("Configuration is valid");
        println!("Configuration is valid.");
        println!("  Listeners: {}", config.frontend.listen.len());
        println!("  Strategy: {:?}", config.frontend.strategy);
        println!("  Backends: {}", config.backends.len());
        for backend in &config.backends {
            println!("    - {}", backend);
        }
        return Ok(());
    }

    info!(
        config_path = ?cli.config,
        listeners = config.frontend.listen.len(),
        backends = config.backends.len(),
        strategy = ?config.frontend.strategy,
        "tcplb starting"
    );

    for backend in &config.backends {
        info!(backend = %backend, "configured backend");
    }

    // Run the load balancer
    run(config, cli.config)
}

/// Merge the config file (if any) with command line overrides and validate.
fn build_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => read_config(path).with_context(|| {
            format!("failed to load configuration from '{}'", path.display())
        })?,
        None => Config::default(),
    };

    if !cli.backends.is_empty() {
        config.backends = cli.backends.clone();
    }
    if let Some(strategy) = &cli.strategy {
        config.frontend.strategy = strategy.clone();
    }
    if let Some(level) = &cli.log_level {
        config.global.log_level = level.clone();
    }

    validate_config(&config)
        .map_err(anyhow::Error::msg)
        .context("configuration validation failed")?;

    Ok(config)
}

/// Run the load balancer with the given configuration.
fn run(config: Config, config_path: Option<PathBuf>) -> Result<()> {
    // Create tokio runtime
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(async { run_async(config, config_path).await })
}

/// Async entry point for the load balancer.
async fn run_async(config: Config, config_path: Option<PathBuf>) -> Result<()> {
    let state = AppState::new(config.clone());
    let shutdown = state.shutdown().clone();
    let mut handles = Vec::new();

    // Start frontend listeners
    for addr in &config.frontend.listen {
        let listener = FrontendListener::bind(*addr, state.forwarder(), state.metrics().clone())
            .await
            .with_context(|| format!("failed to bind frontend listener on {}", addr))?;

        handles.push(tokio::spawn(listener.run(shutdown.subscribe())));
    }

    // Start control listener
    if config.control.enabled {
        let control = ControlListener::bind(
            config.control.listen,
            Arc::clone(state.registry()),
            state.metrics().clone(),
        )
        .await
        .with_context(|| format!("failed to bind control listener on {}", config.control.listen))?;

        handles.push(tokio::spawn(control.run(shutdown.subscribe())));
    }

    // Start health monitor
    handles.push(tokio::spawn(state.health_monitor().run(shutdown.subscribe())));

    // Start metrics server
    if config.global.metrics.enabled {
        let server = MetricsServer::new(
            config.global.metrics.address,
            config.global.metrics.path.clone(),
            state.metrics().clone(),
            Arc::clone(state.router()),
        );
        handles.push(tokio::spawn(server.run(shutdown.subscribe())));
    }

    // Start config watcher
    if let Some(path) = config_path {
        let reload_state = state.clone();
        let watcher = ConfigWatcher::new(
            path,
            Box::new(move |new_config| {
                reload_state.apply_reload(new_config);
            }),
        );
        handles.push(tokio::spawn(watcher.run(shutdown.subscribe())));
    }

    info!("tcplb is running");
    info!("press Ctrl+C to stop");

    // Wait for shutdown signal
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("received shutdown signal");
        }
        Err(e) => {
            error!(error = %e, "failed to listen for shutdown signal");
        }
    }

    // Signal all tasks to shut down
    state.trigger_shutdown();

    // Wait for all tasks to finish
    for handle in handles {
        let _ = handle.await;
    }

    info!("tcplb shut down complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_backends_refuses_to_start() {
        let cli = Cli::parse_from(["tcplb"]);
        assert!(build_config(&cli).is_err());
    }

    #[test]
    fn test_cli_backends_without_config() {
        let cli = Cli::parse_from(["tcplb", "9081", "9082"]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.backends[0], BackendAddress::new("localhost", 9081));
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from(["tcplb", "-s", "random", "-l", "debug", "9100", "10.0.0.5:9200"]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.frontend.strategy, Strategy::Random);
        assert_eq!(config.global.log_level, "debug");
        assert_eq!(
            config.backends,
            vec![
                BackendAddress::new("localhost", 9100),
                BackendAddress::new("10.0.0.5", 9200)
            ]
        );
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let cli = Cli::parse_from(["tcplb", "-l", "loud"]);
        assert!(build_config(&cli).is_err());
    }

    #[test]
    fn test_bad_backend_argument() {
        assert!(Cli::try_parse_from(["tcplb", "notaport"]).is_err());
    }
}
