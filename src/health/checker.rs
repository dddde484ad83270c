//! Active TCP probe.
//!
//! A probe is a bare connect: no payload, closed as soon as it succeeds.

use std::io;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Why a probe failed.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("connection failed: {0}")]
    Connect(#[from] io::Error),

    #[error("connection timeout after {0:?}")]
    Timeout(Duration),
}

/// Perform a TCP health check against `host:port`.
pub async fn tcp_health_check(
    host: &str,
    port: u16,
    check_timeout: Duration,
) -> Result<(), ProbeError> {
    match timeout(check_timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(ProbeError::Connect(e)),
        Err(_) => Err(ProbeError::Timeout(check_timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_health_check_success() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let result = tcp_health_check("127.0.0.1", port, Duration::from_secs(1)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_tcp_health_check_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = tcp_health_check("127.0.0.1", port, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ProbeError::Connect(_))));
    }

    #[tokio::test]
    async fn test_tcp_health_check_timeout() {
        // Non-routable address
        let result = tcp_health_check("10.255.255.1", 12345, Duration::from_millis(100)).await;
        assert!(result.is_err());
    }
}
