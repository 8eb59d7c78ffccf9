//! Accept loop and per-connection session handling.
//!
//! For every accepted client this module computes the source key, asks
//! the balancer for a target node, dials the backend, records the
//! connection against the node's statistics, and forwards bytes until
//! either side finishes.

use crate::balance::{source_key, Balancer, Node};
use crate::metrics::MetricsCollector;
use crate::proxy::{connect_to_backend, proxy_bidirectional};
use crate::util::SessionId;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Frontend listener that accepts and forwards client connections.
pub struct Listener {
    listener: TcpListener,
    balancer: Arc<Balancer>,
    metrics: MetricsCollector,
    connect_timeout: Duration,
}

impl Listener {
    /// Bind the loopback listening socket.
    pub async fn bind(
        port: u16,
        balancer: Arc<Balancer>,
        metrics: MetricsCollector,
        connect_timeout: Duration,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await?;

        info!(
            listen = %listener.local_addr()?,
            nodes = balancer.nodes().len(),
            sticky = balancer.sticky_enabled(),
            "listener bound"
        );

        Ok(Self {
            listener,
            balancer,
            metrics,
            connect_timeout,
        })
    }

    /// Actual bound address, useful when binding port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until shutdown. Accept failures are logged and
    /// the loop keeps serving.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!("listener accepting connections");

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => self.handle_connection(stream, addr),
                        Err(e) => error!(error = %e, "failed to accept connection"),
                    }
                }

                _ = shutdown.recv() => {
                    info!("listener shutting down");
                    break;
                }
            }
        }
    }

    fn handle_connection(&self, stream: TcpStream, client_addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "failed to set TCP_NODELAY on client connection");
        }

        let balancer = Arc::clone(&self.balancer);
        let metrics = self.metrics.clone();
        let connect_timeout = self.connect_timeout;
        let session = SessionId::next();

        tokio::spawn(async move {
            handle_session(stream, client_addr, balancer, metrics, connect_timeout, session).await;
        });
    }
}

/// Drive one forwarded connection from pick to close.
async fn handle_session(
    client_stream: TcpStream,
    client_addr: SocketAddr,
    balancer: Arc<Balancer>,
    metrics: MetricsCollector,
    connect_timeout: Duration,
    session: SessionId,
) {
    let key = source_key(&client_addr.ip());

    let node: Node = balancer.pick(&key).clone();
    metrics.record_pick(&node);

    debug!(
        session = %session,
        client = %client_addr,
        node = %node.backend_addr(),
        "forwarding connection"
    );

    let backend_stream = match connect_to_backend(&node.backend_addr(), connect_timeout).await {
        Ok(stream) => stream,
        Err(e) => {
            // The client sees a close; no retry against another node.
            warn!(
                session = %session,
                node = %node.backend_addr(),
                error = %e,
                "backend dial failed"
            );
            return;
        }
    };

    balancer.on_connection_open(node.id);
    metrics.connection_opened(&node);
    balancer.bind_sticky(&key, node.id);

    let started = Instant::now();
    let result = proxy_bidirectional(client_stream, backend_stream).await;
    let elapsed = started.elapsed();

    match result {
        Ok(stats) => {
            balancer.on_response_sample(node.id, elapsed);
            metrics.record_session(&node, stats.bytes_to_backend, stats.bytes_to_client, elapsed);
            debug!(
                session = %session,
                node = %node.backend_addr(),
                bytes_to_backend = stats.bytes_to_backend,
                bytes_to_client = stats.bytes_to_client,
                duration_ms = elapsed.as_millis(),
                "session completed"
            );
        }
        Err(e) => {
            // Failed sessions contribute no response-time sample.
            warn!(
                session = %session,
                node = %node.backend_addr(),
                error = %e,
                "session failed"
            );
        }
    }

    balancer.on_connection_close(node.id);
    metrics.connection_closed(&node);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, GlobalConfig, NodeConfig};

    fn test_config() -> Config {
        Config {
            service_name: "test".to_string(),
            sticky_connections: false,
            rma_query_interval: Duration::from_secs(5),
            nodes: vec![NodeConfig {
                address: "127.0.0.1:9000".to_string(),
                resource_monitor_agent_port: 9500,
                max_connections: 100,
            }],
            global: GlobalConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_listener_bind() {
        let balancer = Arc::new(Balancer::new(&test_config()).unwrap());
        let listener = Listener::bind(0, balancer, MetricsCollector::new(), Duration::from_secs(1)).await;
        assert!(listener.is_ok());
        assert_ne!(listener.unwrap().local_addr().unwrap().port(), 0);
    }
}
