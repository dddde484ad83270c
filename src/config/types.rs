//! Configuration data types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Global settings
    #[serde(default)]
    pub global: GlobalConfig,

    /// Client-facing listeners and forwarding behavior
    #[serde(default)]
    pub frontend: FrontendConfig,

    /// Runtime registration port
    #[serde(default)]
    pub control: ControlConfig,

    /// Health monitor settings
    #[serde(default)]
    pub health_check: HealthCheckConfig,

    /// Pool growth under sustained load
    #[serde(default)]
    pub autoscale: AutoscaleConfig,

    /// Initial backend servers
    #[serde(default)]
    pub backends: Vec<BackendAddress>,
}

/// Global configuration settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: json or pretty
    #[serde(default)]
    pub log_format: LogFormat,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

/// Metrics endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Whether metrics endpoint is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Address to bind metrics server
    #[serde(default = "default_metrics_address")]
    pub address: SocketAddr,

    /// Path for metrics endpoint
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: default_metrics_address(),
            path: default_metrics_path(),
        }
    }
}

/// Client-facing listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FrontendConfig {
    /// Addresses to accept client connections on, one listener each
    #[serde(default = "default_listen")]
    pub listen: Vec<SocketAddr>,

    /// Backend selection strategy
    #[serde(default)]
    pub strategy: Strategy,

    /// Timeout for each backend connect attempt
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Total connect attempts per client connection
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            strategy: Strategy::default(),
            connect_timeout: default_connect_timeout(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Backend selection strategy.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    RoundRobin,
    /// Least active requests, round-robin among ties
    #[default]
    #[serde(alias = "least_connections")]
    Adaptive,
    /// SHA-256 of the client address modulo the pool size
    ConsistentHash,
    Random,
}

/// Control port configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControlConfig {
    /// Whether the control listener runs
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Address to bind the control listener
    #[serde(default = "default_control_listen")]
    pub listen: SocketAddr,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: default_control_listen(),
        }
    }
}

/// Health monitor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthCheckConfig {
    /// Delay between the end of one check cycle and the start of the next
    #[serde(default = "default_health_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Connect timeout for each probe
    #[serde(default = "default_health_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: default_health_interval(),
            timeout: default_health_timeout(),
        }
    }
}

/// Auto-scale configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AutoscaleConfig {
    /// Whether the monitor may spawn new backends
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Average RPS across healthy backends that triggers a scale-up
    #[serde(default = "default_rps_threshold")]
    pub rps_threshold: f64,

    /// Minimum time between scale-ups
    #[serde(default = "default_scale_cooldown", with = "humantime_serde")]
    pub cooldown: Duration,

    /// Host new backends are registered under
    #[serde(default = "default_scale_host")]
    pub host: String,

    /// Port of the first spawned backend; later ones count up from here
    #[serde(default = "default_start_port")]
    pub start_port: u16,

    /// Program and arguments to launch; the port is appended
    #[serde(default = "default_scale_command")]
    pub command: Vec<String>,
}

impl Default for AutoscaleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rps_threshold: default_rps_threshold(),
            cooldown: default_scale_cooldown(),
            host: default_scale_host(),
            start_port: default_start_port(),
            command: default_scale_command(),
        }
    }
}

/// A backend endpoint.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct BackendAddress {
    /// Hostname or IP address
    #[serde(default = "default_backend_host")]
    pub host: String,

    /// TCP port
    pub port: u16,
}

impl BackendAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl FromStr for BackendAddress {
    type Err = String;

    /// Parse `PORT` (on localhost) or `HOST:PORT`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = match s.rsplit_once(':') {
            Some((host, port)) => (host.trim_start_matches('[').trim_end_matches(']'), port),
            None => (default_backend_host_str(), s),
        };

        if host.is_empty() {
            return Err(format!("missing host in backend '{}'", s));
        }

        let port: u16 = port
            .parse()
            .map_err(|_| format!("invalid port in backend '{}'", s))?;

        Ok(Self::new(host, port))
    }
}

impl fmt::Display for BackendAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_metrics_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9090))
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_listen() -> Vec<SocketAddr> {
    (8080..=8083)
        .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
        .collect()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_control_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8888))
}

fn default_health_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_health_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_rps_threshold() -> f64 {
    10.0
}

fn default_scale_cooldown() -> Duration {
    Duration::from_secs(20)
}

fn default_scale_host() -> String {
    default_backend_host()
}

fn default_start_port() -> u16 {
    9084
}

fn default_scale_command() -> Vec<String> {
    vec!["python3".to_string(), "mock_server.py".to_string()]
}

fn default_backend_host() -> String {
    default_backend_host_str().to_string()
}

fn default_backend_host_str() -> &'static str {
    "localhost"
}

/// Custom serde module for humantime durations.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.global.log_level, "info");
        assert_eq!(config.frontend.listen.len(), 4);
        assert_eq!(config.frontend.max_attempts, 3);
        assert_eq!(config.health_check.interval, Duration::from_secs(5));
        assert_eq!(config.autoscale.rps_threshold, 10.0);
        assert_eq!(config.autoscale.cooldown, Duration::from_secs(20));
        assert_eq!(config.autoscale.start_port, 9084);
        assert_eq!(config.control.listen.port(), 8888);
        assert!(config.backends.is_empty());
    }

    #[test]
    fn test_strategy_serde() {
        let strategy: Strategy = serde_yaml::from_str("round_robin").unwrap();
        assert_eq!(strategy, Strategy::RoundRobin);

        let strategy: Strategy = serde_yaml::from_str("consistent_hash").unwrap();
        assert_eq!(strategy, Strategy::ConsistentHash);

        let strategy: Strategy = serde_yaml::from_str("least_connections").unwrap();
        assert_eq!(strategy, Strategy::Adaptive);
    }

    #[test]
    fn test_duration_fields() {
        let yaml = r#"
interval: 250ms
timeout: 2s
"#;
        let hc: HealthCheckConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(hc.interval, Duration::from_millis(250));
        assert_eq!(hc.timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_backend_address_parse() {
        assert_eq!(
            "9081".parse::<BackendAddress>().unwrap(),
            BackendAddress::new("localhost", 9081)
        );
        assert_eq!(
            "10.0.0.5:9100".parse::<BackendAddress>().unwrap(),
            BackendAddress::new("10.0.0.5", 9100)
        );
        assert_eq!(
            "[::1]:9100".parse::<BackendAddress>().unwrap(),
            BackendAddress::new("::1", 9100)
        );
        assert!("host:notaport".parse::<BackendAddress>().is_err());
        assert!(":9100".parse::<BackendAddress>().is_err());
        assert!("70000".parse::<BackendAddress>().is_err());
    }

    #[test]
    fn test_backend_host_defaults() {
        let backend: BackendAddress = serde_yaml::from_str("port: 9081").unwrap();
        assert_eq!(backend.host, "localhost");
        assert_eq!(backend.to_string(), "localhost:9081");
    }
}
