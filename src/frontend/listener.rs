//! Client-facing listener.
//!
//! Accepts client connections and spawns one forwarding task per connection.

use crate::metrics::MetricsCollector;
use crate::proxy::Forwarder;
use crate::util::ConnectionId;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};

/// Frontend listener that accepts and forwards connections.
pub struct FrontendListener {
    /// TCP listener.
    listener: TcpListener,
    /// Bound address, reported in logs and metrics.
    local_addr: SocketAddr,
    /// Shared forwarding logic.
    forwarder: Forwarder,
    /// Metrics collector.
    metrics: MetricsCollector,
}

impl FrontendListener {
    /// Bind a new frontend listener.
    pub async fn bind(
        addr: SocketAddr,
        forwarder: Forwarder,
        metrics: MetricsCollector,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        info!(
            listen = %local_addr,
            strategy = forwarder.router().strategy_name(),
            "frontend listener bound"
        );

        Ok(Self {
            listener,
            local_addr,
            forwarder,
            metrics,
        })
    }

    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Run the listener, accepting connections until shutdown.
    #[instrument(skip_all, fields(listen = %self.local_addr))]
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!("frontend listener starting");

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }

                _ = shutdown.recv() => {
                    info!("frontend listener shutting down");
                    break;
                }
            }
        }
    }

    /// Hand an accepted connection to its own task.
    fn handle_connection(&self, stream: TcpStream, client_addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "failed to set TCP_NODELAY on client connection");
        }

        self.metrics.connection_accepted(&self.local_addr.to_string());

        let forwarder = self.forwarder.clone();
        let connection_id = ConnectionId::next();
        let span = info_span!("conn", id = %connection_id, client = %client_addr);

        tokio::spawn(
            async move {
                let start_time = Instant::now();
                // Clients are identified by IP so reconnects from new ports stick
                let client_id = client_addr.ip().to_string();

                match forwarder.forward(stream, &client_id).await {
                    Ok(summary) => {
                        debug!(
                            backend = %summary.backend.address(),
                            attempts = summary.attempts,
                            bytes_to_backend = summary.bytes.bytes_to_backend,
                            bytes_to_client = summary.bytes.bytes_to_client,
                            duration_ms = start_time.elapsed().as_millis() as u64,
                            "connection completed"
                        );
                    }
                    Err(e) => {
                        warn!(
                            duration_ms = start_time.elapsed().as_millis() as u64,
                            error = %e,
                            "connection handling failed"
                        );
                    }
                }
            }
            .instrument(span),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendRegistry, BackendRouter};
    use crate::config::Strategy;
    use crate::proxy::ForwardSettings;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn forwarder(registry: Arc<BackendRegistry>) -> Forwarder {
        let router = Arc::new(BackendRouter::new(registry, &Strategy::RoundRobin));
        Forwarder::new(router, ForwardSettings::default(), MetricsCollector::new())
    }

    #[tokio::test]
    async fn test_frontend_listener_bind() {
        let registry = Arc::new(BackendRegistry::with_backends([("127.0.0.1", 9000)]));
        let listener = FrontendListener::bind(
            "127.0.0.1:0".parse().unwrap(),
            forwarder(registry),
            MetricsCollector::new(),
        )
        .await
        .unwrap();
        assert_ne!(listener.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_listener_forwards_to_backend() {
        let backend = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let backend_port = backend.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = backend.accept().await.unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).await.unwrap();
            stream.write_all(b"pong").await.unwrap();
        });

        let registry = Arc::new(BackendRegistry::with_backends([("127.0.0.1", backend_port)]));
        let listener = FrontendListener::bind(
            "127.0.0.1:0".parse().unwrap(),
            forwarder(Arc::clone(&registry)),
            MetricsCollector::new(),
        )
        .await
        .unwrap();
        let addr = listener.local_addr();

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(listener.run(rx));

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"ping").await.unwrap();
        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, b"pong");
        assert_eq!(registry.snapshot()[0].total_requests(), 1);

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
