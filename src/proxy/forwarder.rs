//! Per-connection forwarding.
//!
//! Picks a backend, connects with bounded retry, then relays bytes until
//! both sides are done. A backend whose connect fails is taken out of
//! rotation immediately; the health monitor brings it back.

use crate::backend::{Backend, BackendRouter};
use crate::config::FrontendConfig;
use crate::metrics::{ForwardOutcome, MetricsCollector};
use crate::proxy::tcp_proxy::{ForwardError, ProxyResult, connect_to_backend, proxy_bidirectional};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, info, instrument, warn};

/// Connect behavior for forwarded connections.
#[derive(Debug, Clone, Copy)]
pub struct ForwardSettings {
    /// Timeout for each connect attempt.
    pub connect_timeout: Duration,
    /// Total connect attempts per client connection.
    pub max_attempts: u32,
}

impl Default for ForwardSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            max_attempts: 3,
        }
    }
}

impl From<&FrontendConfig> for ForwardSettings {
    fn from(config: &FrontendConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            max_attempts: config.max_attempts.max(1),
        }
    }
}

/// Summary of a completed forward.
#[derive(Debug)]
pub struct ForwardSummary {
    /// Backend that served the connection.
    pub backend: Arc<Backend>,
    /// Connect attempts made, including the successful one.
    pub attempts: u32,
    /// Bytes relayed in each direction.
    pub bytes: ProxyResult,
    /// Time from backend connect to session end.
    pub latency: Duration,
}

/// Forwards client connections to backends chosen by the router.
#[derive(Clone)]
pub struct Forwarder {
    router: Arc<BackendRouter>,
    settings: ForwardSettings,
    metrics: MetricsCollector,
}

impl Forwarder {
    pub fn new(
        router: Arc<BackendRouter>,
        settings: ForwardSettings,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            router,
            settings,
            metrics,
        }
    }

    pub fn router(&self) -> &Arc<BackendRouter> {
        &self.router
    }

    pub fn settings(&self) -> ForwardSettings {
        self.settings
    }

    /// Forward one client connection to completion.
    ///
    /// The client stream is owned here, so it is closed on every exit path.
    /// `client_id` feeds strategies that pin clients to backends.
    #[instrument(skip_all, fields(client = %client_id))]
    pub async fn forward<C>(&self, client: C, client_id: &str) -> Result<ForwardSummary, ForwardError>
    where
        C: AsyncRead + AsyncWrite + Unpin,
    {
        let result = self.forward_inner(client, client_id).await;
        let outcome = match &result {
            Ok(_) => ForwardOutcome::Completed,
            Err(ForwardError::NoEligibleBackend) => ForwardOutcome::NoBackend,
            Err(ForwardError::RequestExhausted { .. }) => ForwardOutcome::Exhausted,
            Err(_) => ForwardOutcome::Failed,
        };
        self.metrics.record_outcome(outcome);
        result
    }

    async fn forward_inner<C>(&self, client: C, client_id: &str) -> Result<ForwardSummary, ForwardError>
    where
        C: AsyncRead + AsyncWrite + Unpin,
    {
        let (backend, backend_stream, attempts) = self.connect(client_id).await?;
        let address = backend.address();

        let connected_at = Instant::now();
        let active = backend.track_active();
        self.metrics
            .set_active_requests(&address, backend.active_requests());

        let relayed = proxy_bidirectional(client, backend_stream).await;

        let latency = connected_at.elapsed();
        drop(active);
        self.metrics
            .set_active_requests(&address, backend.active_requests());
        backend.record_latency(latency);

        let bytes = relayed?;
        self.metrics.record_session(
            &address,
            bytes.bytes_to_backend,
            bytes.bytes_to_client,
            latency,
        );

        debug!(
            backend = %address,
            bytes_to_backend = bytes.bytes_to_backend,
            bytes_to_client = bytes.bytes_to_client,
            latency_ms = latency.as_millis() as u64,
            "forward completed"
        );

        Ok(ForwardSummary {
            backend,
            attempts,
            bytes,
            latency,
        })
    }

    /// Select and connect, retrying on a freshly selected backend after each
    /// failure.
    ///
    /// Only a successful connect counts as a request against the backend.
    async fn connect(
        &self,
        client_id: &str,
    ) -> Result<(Arc<Backend>, TcpStream, u32), ForwardError> {
        let max_attempts = self.settings.max_attempts;
        let mut attempts = 0;

        while attempts < max_attempts {
            let Some(backend) = self.router.select(Some(client_id)) else {
                return Err(if attempts == 0 {
                    ForwardError::NoEligibleBackend
                } else {
                    ForwardError::RequestExhausted { attempts }
                });
            };

            let started = Instant::now();
            match connect_to_backend(&backend, self.settings.connect_timeout).await {
                Ok(stream) => {
                    attempts += 1;
                    backend.record_request();
                    self.metrics.backend_request(&backend.address());
                    debug!(
                        backend = %backend.address(),
                        attempt = attempts,
                        connect_ms = started.elapsed().as_millis() as u64,
                        "connected to backend"
                    );
                    return Ok((backend, stream, attempts));
                }
                Err(e) => {
                    attempts += 1;
                    self.metrics.connect_failure(&backend.address());
                    if backend.mark_unhealthy() {
                        self.metrics.set_backend_health(&backend.address(), false);
                    }
                    warn!(
                        backend = %backend.address(),
                        attempt = attempts,
                        max_attempts,
                        error = %e,
                        "backend connect failed"
                    );
                }
            }
        }

        info!(attempts, "giving up on client connection");
        Err(ForwardError::RequestExhausted { attempts })
    }
}
