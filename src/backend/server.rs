//! Backend server record.
//!
//! One [`Backend`] exists per upstream endpoint and is shared between the
//! forwarders, the selection strategies and the health monitor. Single-field
//! counters are atomics. Fields that change together (the latency range, and
//! the RPS range with its request snapshot) are guarded by a per-record mutex
//! that is never held across an `.await`.

use crate::util::{format_clock, unix_millis};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Maximum number of failure timestamps retained per backend.
pub const FAILURE_HISTORY_CAPACITY: usize = 50;

/// Runtime state for a single upstream server.
#[derive(Debug)]
pub struct Backend {
    host: String,
    port: u16,
    /// Current health flag, true until a probe or connect attempt says otherwise.
    healthy: AtomicBool,
    /// Successfully established backend connections.
    total_requests: AtomicU64,
    /// Forwards currently in progress.
    active_requests: AtomicUsize,
    successful_checks: AtomicU64,
    failed_checks: AtomicU64,
    consecutive_failures: AtomicU32,
    /// Unix millis of the last health probe.
    last_check: AtomicU64,
    failure_history: Mutex<VecDeque<u64>>,
    latency: Mutex<LatencyRange>,
    traffic: Mutex<TrafficStats>,
}

/// Observed min/max latency of forwarded sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencyRange {
    pub min: Option<Duration>,
    pub max: Option<Duration>,
}

impl LatencyRange {
    fn observe(&mut self, latency: Duration) {
        if self.min.is_none_or(|min| latency < min) {
            self.min = Some(latency);
        }
        if self.max.is_none_or(|max| latency > max) {
            self.max = Some(latency);
        }
    }
}

/// A requests-per-second value and the time it was observed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RpsSample {
    pub rps: f64,
    /// Unix millis.
    pub at: u64,
}

/// Per-interval traffic bookkeeping owned by the health monitor.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrafficStats {
    /// Total requests seen at the previous health tick.
    pub previous_total: u64,
    pub min: Option<RpsSample>,
    pub max: Option<RpsSample>,
}

impl TrafficStats {
    fn widen(&mut self, sample: RpsSample) {
        if self.min.is_none_or(|min| sample.rps < min.rps) {
            self.min = Some(sample);
        }
        if self.max.is_none_or(|max| sample.rps > max.rps) {
            self.max = Some(sample);
        }
    }
}

/// Compute requests per second between two total-request readings.
///
/// A counter that went backwards yields 0.
pub fn interval_rps(previous_total: u64, current_total: u64, interval: Duration) -> f64 {
    let secs = interval.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    current_total.saturating_sub(previous_total) as f64 / secs
}

impl Backend {
    /// Create a new backend record. Backends start out healthy.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            healthy: AtomicBool::new(true),
            total_requests: AtomicU64::new(0),
            active_requests: AtomicUsize::new(0),
            successful_checks: AtomicU64::new(0),
            failed_checks: AtomicU64::new(0),
            consecutive_failures: AtomicU32::new(0),
            last_check: AtomicU64::new(unix_millis()),
            failure_history: Mutex::new(VecDeque::with_capacity(FAILURE_HISTORY_CAPACITY)),
            latency: Mutex::new(LatencyRange::default()),
            traffic: Mutex::new(TrafficStats::default()),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` form of the address.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether this record points at the given endpoint.
    pub fn matches(&self, host: &str, port: u16) -> bool {
        self.port == port && self.host.eq_ignore_ascii_case(host)
    }

    #[inline]
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// Set the health flag, returning the previous value.
    #[inline]
    pub fn set_healthy(&self, healthy: bool) -> bool {
        self.healthy.swap(healthy, Ordering::AcqRel)
    }

    /// Mark unhealthy after a failed connect. Returns true if this flipped the flag.
    pub fn mark_unhealthy(&self) -> bool {
        let was_healthy = self.set_healthy(false);
        if was_healthy {
            tracing::warn!(backend = %self.address(), "backend marked unhealthy after connect failure");
        }
        was_healthy
    }

    #[inline]
    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// Count a successfully established backend connection.
    #[inline]
    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn active_requests(&self) -> usize {
        self.active_requests.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn begin_request(&self) {
        self.active_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement active requests, saturating at zero.
    #[inline]
    pub fn end_request(&self) {
        let _ = self
            .active_requests
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Start tracking an active forward; the count drops when the guard does.
    pub fn track_active(self: &Arc<Self>) -> ActiveRequest {
        self.begin_request();
        ActiveRequest {
            backend: Arc::clone(self),
        }
    }

    /// Record a successful health probe.
    pub fn record_check_success(&self, now: u64) {
        self.last_check.store(now, Ordering::Relaxed);
        self.successful_checks.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    /// Record a failed health probe.
    pub fn record_check_failure(&self, now: u64) {
        self.last_check.store(now, Ordering::Relaxed);
        self.failed_checks.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);

        let mut history = self.failure_history.lock();
        history.push_back(now);
        while history.len() > FAILURE_HISTORY_CAPACITY {
            history.pop_front();
        }
    }

    pub fn successful_checks(&self) -> u64 {
        self.successful_checks.load(Ordering::Relaxed)
    }

    pub fn failed_checks(&self) -> u64 {
        self.failed_checks.load(Ordering::Relaxed)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    pub fn last_check(&self) -> u64 {
        self.last_check.load(Ordering::Relaxed)
    }

    /// Failure timestamps, oldest first.
    pub fn failure_history(&self) -> Vec<u64> {
        self.failure_history.lock().iter().copied().collect()
    }

    pub fn last_failure(&self) -> Option<u64> {
        self.failure_history.lock().back().copied()
    }

    /// Widen the latency range with a completed session's duration.
    pub fn record_latency(&self, latency: Duration) {
        self.latency.lock().observe(latency);
    }

    pub fn latency(&self) -> LatencyRange {
        *self.latency.lock()
    }

    /// Close out one health-check interval.
    ///
    /// Computes this interval's RPS from the request delta, stores the new
    /// snapshot and widens the RPS range, all under one lock.
    pub fn record_interval(&self, interval: Duration, now: u64) -> f64 {
        let total = self.total_requests();
        let mut traffic = self.traffic.lock();
        let rps = interval_rps(traffic.previous_total, total, interval);
        traffic.previous_total = total;
        traffic.widen(RpsSample { rps, at: now });
        rps
    }

    pub fn traffic(&self) -> TrafficStats {
        *self.traffic.lock()
    }

    /// Point-in-time copy of every field, for reporting.
    pub fn snapshot(&self) -> BackendSnapshot {
        let latency = self.latency();
        let traffic = self.traffic();
        let history = self.failure_history.lock();
        BackendSnapshot {
            address: self.address(),
            healthy: self.is_healthy(),
            active_requests: self.active_requests(),
            total_requests: self.total_requests(),
            successful_checks: self.successful_checks(),
            failed_checks: self.failed_checks(),
            consecutive_failures: self.consecutive_failures(),
            last_check: self.last_check(),
            last_failure: history.back().copied(),
            failures_recorded: history.len(),
            latency_min_ms: latency.min.map(|d| d.as_secs_f64() * 1000.0),
            latency_max_ms: latency.max.map(|d| d.as_secs_f64() * 1000.0),
            rps_min: traffic.min,
            rps_max: traffic.max,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let latency = self.latency();
        let traffic = self.traffic();

        let latency_range = match (latency.min, latency.max) {
            (Some(min), Some(max)) => format!("{}-{}ms", min.as_millis(), max.as_millis()),
            _ => "N/A".to_string(),
        };
        let rps_range = match (traffic.min, traffic.max) {
            (Some(min), Some(max)) => format!(
                "{:.2} (at {}) - {:.2} (at {})",
                min.rps,
                format_clock(min.at),
                max.rps,
                format_clock(max.at)
            ),
            _ => "N/A".to_string(),
        };
        let last_fail = self
            .last_failure()
            .map(format_clock)
            .unwrap_or_else(|| "None".to_string());

        write!(
            f,
            "{}:{} [Health: {}, Active: {}, Req: {}, RPS Range: {}, Latency Range: {}, Fails: {}, LastFail: {}]",
            self.host,
            self.port,
            if self.is_healthy() { "UP" } else { "DOWN" },
            self.active_requests(),
            self.total_requests(),
            rps_range,
            latency_range,
            self.consecutive_failures(),
            last_fail
        )
    }
}

/// Serializable view of a backend record.
#[derive(Debug, Clone, Serialize)]
pub struct BackendSnapshot {
    pub address: String,
    pub healthy: bool,
    pub active_requests: usize,
    pub total_requests: u64,
    pub successful_checks: u64,
    pub failed_checks: u64,
    pub consecutive_failures: u32,
    pub last_check: u64,
    pub last_failure: Option<u64>,
    pub failures_recorded: usize,
    pub latency_min_ms: Option<f64>,
    pub latency_max_ms: Option<f64>,
    pub rps_min: Option<RpsSample>,
    pub rps_max: Option<RpsSample>,
}

/// Active request RAII guard.
///
/// Decrements the backend's active request count on drop, so every exit
/// path out of a forward releases its slot.
#[derive(Debug)]
pub struct ActiveRequest {
    backend: Arc<Backend>,
}

impl ActiveRequest {
    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }
}

impl Drop for ActiveRequest {
    fn drop(&mut self) {
        self.backend.end_request();
    }
}
