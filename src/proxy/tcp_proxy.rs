//! Backend dialing and bidirectional byte copying.

use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Byte counts for one completed proxy session.
#[derive(Debug)]
pub struct SessionStats {
    /// Bytes copied from client to backend.
    pub bytes_to_backend: u64,
    /// Bytes copied from backend to client.
    pub bytes_to_client: u64,
}

/// TCP forwarding error.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("failed to connect to backend {0}: {1}")]
    Connect(String, io::Error),

    #[error("connection timeout to backend {0}")]
    ConnectTimeout(String),

    #[error("forwarding failed: {0}")]
    Io(#[from] io::Error),
}

/// Dial a backend with a timeout.
///
/// `addr` is "host:port"; hostnames resolve through the system resolver.
pub async fn connect_to_backend(addr: &str, connect_timeout: Duration) -> Result<TcpStream, ProxyError> {
    debug!(backend = %addr, "connecting to backend");

    let stream = match timeout(connect_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return Err(ProxyError::Connect(addr.to_string(), e)),
        Err(_) => return Err(ProxyError::ConnectTimeout(addr.to_string())),
    };

    if let Err(e) = stream.set_nodelay(true) {
        warn!(backend = %addr, error = %e, "failed to set TCP_NODELAY");
    }

    Ok(stream)
}

/// Copy bytes in both directions until both sides finish.
///
/// An error on either direction fails the session; callers must not
/// record a response-time sample in that case.
pub async fn proxy_bidirectional<C, B>(client: C, backend: B) -> Result<SessionStats, ProxyError>
where
    C: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut backend_read, mut backend_write) = tokio::io::split(backend);

    let client_to_backend = tokio::io::copy(&mut client_read, &mut backend_write);
    let backend_to_client = tokio::io::copy(&mut backend_read, &mut client_write);

    let (to_backend, to_client) = tokio::join!(client_to_backend, backend_to_client);

    let stats = SessionStats {
        bytes_to_backend: to_backend?,
        bytes_to_client: to_client?,
    };

    debug!(
        bytes_to_backend = stats.bytes_to_backend,
        bytes_to_client = stats.bytes_to_client,
        "proxy session finished"
    );

    Ok(stats)
}
