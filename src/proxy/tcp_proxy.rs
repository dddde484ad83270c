//! TCP proxy primitives.
//!
//! Backend connect with timeout and the two byte pumps that relay data
//! between client and backend.

use crate::backend::Backend;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

/// Result of a proxy operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProxyResult {
    /// Bytes sent from client to backend.
    pub bytes_to_backend: u64,
    /// Bytes sent from backend to client.
    pub bytes_to_client: u64,
}

/// Forwarding error.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("no eligible backend available")]
    NoEligibleBackend,

    #[error("failed to connect to backend {0}: {1}")]
    BackendConnect(String, io::Error),

    #[error("connection timeout to backend {0}")]
    BackendTimeout(String),

    #[error("all backend connect attempts failed ({attempts} attempted)")]
    RequestExhausted { attempts: u32 },

    #[error("proxy error: {0}")]
    Io(#[from] io::Error),
}

/// Connect to a backend server with timeout.
#[instrument(skip_all, fields(backend = %backend.address()))]
pub async fn connect_to_backend(
    backend: &Backend,
    connect_timeout: Duration,
) -> Result<TcpStream, ForwardError> {
    debug!("connecting to backend");

    match timeout(
        connect_timeout,
        TcpStream::connect((backend.host(), backend.port())),
    )
    .await
    {
        Ok(Ok(stream)) => {
            // Set TCP_NODELAY for lower latency
            if let Err(e) = stream.set_nodelay(true) {
                warn!(error = %e, "failed to set TCP_NODELAY on backend connection");
            }
            Ok(stream)
        }
        Ok(Err(e)) => Err(ForwardError::BackendConnect(backend.address(), e)),
        Err(_) => Err(ForwardError::BackendTimeout(backend.address())),
    }
}

/// Copy one direction until EOF, then half-close the destination.
async fn pump<R, W>(mut reader: R, mut writer: W) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let bytes = tokio::io::copy(&mut reader, &mut writer).await?;
    // The peer may already be gone; that is not a relay failure.
    let _ = writer.shutdown().await;
    Ok(bytes)
}

/// Proxy data bidirectionally between two streams.
///
/// Runs both directions concurrently. A direction that reaches EOF
/// half-closes its destination and finishes on its own while the other keeps
/// flowing. The first I/O error aborts both. There is no idle timeout: an
/// open but silent peer keeps the session alive.
#[instrument(skip_all)]
pub async fn proxy_bidirectional<C, B>(client: C, backend: B) -> Result<ProxyResult, ForwardError>
where
    C: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (client_read, client_write) = tokio::io::split(client);
    let (backend_read, backend_write) = tokio::io::split(backend);

    let client_to_backend = pump(client_read, backend_write);
    let backend_to_client = pump(backend_read, client_write);

    let (bytes_to_backend, bytes_to_client) =
        tokio::try_join!(client_to_backend, backend_to_client)?;

    debug!(bytes_to_backend, bytes_to_client, "proxy completed");

    Ok(ProxyResult {
        bytes_to_backend,
        bytes_to_client,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_to_backend_success() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let backend = Backend::new("127.0.0.1", addr.port());
        let result = connect_to_backend(&backend, Duration::from_secs(5)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_connect_to_backend_by_hostname() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let backend = Backend::new("localhost", addr.port());
        // localhost may resolve to ::1 first; tokio tries each address in turn
        let result = connect_to_backend(&backend, Duration::from_secs(5)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_connect_to_backend_timeout() {
        // Non-routable address
        let backend = Backend::new("10.255.255.1", 12345);

        let result = connect_to_backend(&backend, Duration::from_millis(100)).await;
        // Some sandboxes reject instead of dropping; either way it must fail
        assert!(matches!(
            result,
            Err(ForwardError::BackendTimeout(_)) | Err(ForwardError::BackendConnect(_, _))
        ));
    }

    #[tokio::test]
    async fn test_connect_to_backend_refused() {
        // Bind then drop to get a port with nothing listening
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let backend = Backend::new("127.0.0.1", port);
        let result = connect_to_backend(&backend, Duration::from_secs(5)).await;

        match result {
            Err(ForwardError::BackendConnect(addr, _)) => {
                assert_eq!(addr, format!("127.0.0.1:{}", port))
            }
            other => panic!("expected connect error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_proxy_bidirectional_half_close() {
        let (client, mut client_peer) = tokio::io::duplex(64);
        let (backend, mut backend_peer) = tokio::io::duplex(64);

        let relay = tokio::spawn(proxy_bidirectional(client, backend));

        // Client sends a request and half-closes
        client_peer.write_all(b"ping").await.unwrap();
        client_peer.shutdown().await.unwrap();

        // Backend sees the request followed by EOF, then answers
        let mut request = Vec::new();
        backend_peer.read_to_end(&mut request).await.unwrap();
        assert_eq!(request, b"ping");
        backend_peer.write_all(b"pong!").await.unwrap();
        backend_peer.shutdown().await.unwrap();

        let mut response = Vec::new();
        client_peer.read_to_end(&mut response).await.unwrap();
        assert_eq!(response, b"pong!");

        let result = relay.await.unwrap().unwrap();
        assert_eq!(
            result,
            ProxyResult {
                bytes_to_backend: 4,
                bytes_to_client: 5,
            }
        );
    }
}
