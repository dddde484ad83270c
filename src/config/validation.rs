//! Configuration validation.

use crate::config::Config;
use std::collections::HashSet;

/// Validate the configuration.
///
/// Checks for:
/// - At least one listen address, none duplicated
/// - A control address that does not collide with a listener
/// - At least one backend, each with a host and a non-zero port
/// - Sane forwarding, health check and autoscale parameters
///
/// # Returns
///
/// `Ok(())` if valid, or an error message describing the problem.
pub fn validate_config(config: &Config) -> Result<(), String> {
    let mut errors = Vec::new();

    // Check for at least one listener
    if config.frontend.listen.is_empty() {
        errors.push("at least one listen address must be defined".to_string());
    }

    // Check for duplicate listen addresses
    let mut listen_addresses = HashSet::new();
    for addr in &config.frontend.listen {
        if !listen_addresses.insert(*addr) {
            errors.push(format!("duplicate listen address: {}", addr));
        }
    }

    if config.control.enabled && listen_addresses.contains(&config.control.listen) {
        errors.push(format!(
            "control address {} is also a frontend listen address",
            config.control.listen
        ));
    }

    if config.frontend.max_attempts == 0 {
        errors.push("frontend max_attempts must be >= 1".to_string());
    }

    // Check for at least one backend
    if config.backends.is_empty() {
        errors.push("at least one backend must be defined".to_string());
    }

    for backend in &config.backends {
        if backend.host.is_empty() {
            errors.push(format!("backend on port {} has an empty host", backend.port));
        }
        if backend.port == 0 {
            errors.push(format!("backend '{}' has port 0", backend.host));
        }
    }

    if config.health_check.interval.is_zero() {
        errors.push("health check interval must be greater than zero".to_string());
    }

    if config.autoscale.enabled {
        let threshold = config.autoscale.rps_threshold;
        if !threshold.is_finite() || threshold <= 0.0 {
            errors.push(format!(
                "autoscale rps_threshold must be a positive number, got {}",
                threshold
            ));
        }
        if config.autoscale.command.is_empty() {
            errors.push("autoscale command cannot be empty when autoscale is enabled".to_string());
        }
        if config.autoscale.start_port == 0 {
            errors.push("autoscale start_port must be non-zero".to_string());
        }
    }

    // Validate log level
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.global.log_level.to_lowercase().as_str()) {
        errors.push(format!(
            "invalid log level '{}', must be one of: {}",
            config.global.log_level,
            valid_levels.join(", ")
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}
