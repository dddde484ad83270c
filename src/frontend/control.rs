//! Control port for runtime backend registration.
//!
//! Line protocol, one command per connection:
//!
//! ```text
//! ADD <host> <port>   ->  OK
//! anything else       ->  ERROR: Usage ADD <host> <port>
//! ```
//!
//! Connections are served one at a time and closed after the reply.

use crate::backend::BackendRegistry;
use crate::metrics::MetricsCollector;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

/// Reply sent for any request that is not a well-formed `ADD`.
pub const USAGE_REPLY: &str = "ERROR: Usage ADD <host> <port>";

/// Longest command line accepted, in bytes.
const MAX_LINE: u64 = 1024;

/// How long a control client may take to send its line.
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// A parsed control command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Add { host: String, port: u16 },
}

/// Control protocol error.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("malformed command: {0:?}")]
    Usage(String),

    #[error("control connection error: {0}")]
    Io(#[from] io::Error),
}

/// Parse one request line.
///
/// Exactly three space-separated tokens: `ADD`, a host and a non-zero port.
pub fn parse_command(line: &str) -> Result<ControlCommand, ControlError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let usage = || ControlError::Usage(line.to_string());

    let mut parts = line.split(' ');
    let (Some("ADD"), Some(host), Some(port), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(usage());
    };

    if host.is_empty() {
        return Err(usage());
    }
    let port: u16 = port.parse().map_err(|_| usage())?;
    if port == 0 {
        return Err(usage());
    }

    Ok(ControlCommand::Add {
        host: host.to_string(),
        port,
    })
}

/// Listener for control commands.
pub struct ControlListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    registry: Arc<BackendRegistry>,
    metrics: MetricsCollector,
}

impl ControlListener {
    pub async fn bind(
        addr: SocketAddr,
        registry: Arc<BackendRegistry>,
        metrics: MetricsCollector,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!(listen = %local_addr, "control listener bound");

        Ok(Self {
            listener,
            local_addr,
            registry,
            metrics,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve control connections sequentially until shutdown.
    #[instrument(skip_all, fields(control = %self.local_addr))]
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!("control listener starting");

        loop {
            let stream = tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            debug!(client = %addr, "control connection accepted");
                            stream
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept control connection");
                            continue;
                        }
                    }
                }

                _ = shutdown.recv() => {
                    info!("control listener shutting down");
                    break;
                }
            };

            tokio::select! {
                result = self.handle(stream) => {
                    if let Err(e) = result {
                        warn!(error = %e, "control request rejected");
                    }
                }

                _ = shutdown.recv() => {
                    info!("control listener shutting down");
                    break;
                }
            }
        }
    }

    /// Read one command, apply it and reply.
    async fn handle(&self, mut stream: TcpStream) -> Result<(), ControlError> {
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader.take(MAX_LINE));
        let mut line = String::new();

        let read = match timeout(READ_TIMEOUT, reader.read_line(&mut line)).await {
            Ok(read) => read,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "no command received")),
        };

        let result = read.map_err(ControlError::from).and_then(|_| parse_command(&line));
        let reply = match &result {
            Ok(ControlCommand::Add { host, port }) => {
                let backend = self.registry.add(host.clone(), *port);
                self.metrics.set_registry_size(self.registry.len());
                info!(backend = %backend.address(), "backend added via control port");
                "OK"
            }
            Err(_) => USAGE_REPLY,
        };

        writer.write_all(reply.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.shutdown().await?;

        result.map(|_| ())
    }
}
