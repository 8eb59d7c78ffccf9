//! Per-node UDP pollers for the resource monitoring agents.
//!
//! Each backend node runs a sidecar agent that answers a `connect`
//! datagram with a JSON resource summary. One poller task per node
//! refreshes the node's sample in the statistics store for the lifetime
//! of the process; a failed poll writes the zero sentinel so stale data
//! never outlives an outage.

use crate::balance::{Balancer, Node, ResourceSample};
use crate::metrics::MetricsCollector;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{lookup_host, UdpSocket};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Request payload of the agent protocol: exactly these 7 ASCII bytes.
const AGENT_REQUEST: &[u8] = b"connect";

/// Largest datagram an agent may answer with.
const AGENT_REPLY_LIMIT: usize = 1024;

/// Errors from a single poll exchange.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("agent address '{0}' did not resolve")]
    Unresolvable(String),

    #[error("agent I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("no reply within {0:?}")]
    Timeout(Duration),

    #[error("malformed agent reply: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Spawns and owns one polling task per configured node.
pub struct ResourceMonitor {
    balancer: Arc<Balancer>,
    interval: Duration,
    metrics: MetricsCollector,
}

impl ResourceMonitor {
    pub fn new(balancer: Arc<Balancer>, interval: Duration, metrics: MetricsCollector) -> Self {
        Self {
            balancer,
            interval,
            metrics,
        }
    }

    /// Spawn the polling tasks. They run until shutdown is broadcast.
    pub fn spawn(self, shutdown: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        info!(
            nodes = self.balancer.nodes().len(),
            interval = ?self.interval,
            "starting resource monitoring agent pollers"
        );

        self.balancer
            .nodes()
            .iter()
            .cloned()
            .map(|node| {
                let balancer = Arc::clone(&self.balancer);
                let metrics = self.metrics.clone();
                let interval = self.interval;
                let shutdown = shutdown.subscribe();
                tokio::spawn(poll_loop(node, balancer, interval, metrics, shutdown))
            })
            .collect()
    }
}

/// Poll one node's agent forever.
///
/// Failure is never fatal here: every outcome, good or bad, becomes a
/// stored sample, and the loop sleeps and goes again.
async fn poll_loop(
    node: Node,
    balancer: Arc<Balancer>,
    interval: Duration,
    metrics: MetricsCollector,
    mut shutdown: broadcast::Receiver<()>,
) {
    let agent_addr = node.monitor_addr();

    loop {
        debug!(agent = %agent_addr, "querying resource monitoring agent");

        let sample = match query_agent(&agent_addr, interval).await {
            Ok(sample) => {
                debug!(
                    agent = %agent_addr,
                    cpu = sample.cpu,
                    memory = sample.memory,
                    "agent reported resources"
                );
                metrics.record_agent_poll(&node, true);
                sample
            }
            Err(e) => {
                warn!(agent = %agent_addr, error = %e, "agent poll failed");
                metrics.record_agent_poll(&node, false);
                ResourceSample::default()
            }
        };

        balancer.store().set_resources(node.id, sample);

        tokio::select! {
            _ = sleep(interval) => {}
            _ = shutdown.recv() => {
                debug!(agent = %agent_addr, "agent poller shutting down");
                break;
            }
        }
    }
}

/// One request/response exchange with an agent.
///
/// Sends `connect`, reads a single datagram of at most 1024 bytes under
/// `deadline`, and parses it as a JSON resource summary. Unknown JSON
/// fields are ignored; missing ones default to zero.
pub async fn query_agent(addr: &str, deadline: Duration) -> Result<ResourceSample, MonitorError> {
    let target: SocketAddr = lookup_host(addr)
        .await?
        .next()
        .ok_or_else(|| MonitorError::Unresolvable(addr.to_string()))?;

    // Ephemeral socket of the matching address family.
    let bind_addr: SocketAddr = if target.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };

    let socket = UdpSocket::bind(bind_addr).await?;
    socket.connect(target).await?;
    socket.send(AGENT_REQUEST).await?;

    let mut reply = [0u8; AGENT_REPLY_LIMIT];
    let len = match timeout(deadline, socket.recv(&mut reply)).await {
        Ok(result) => result?,
        Err(_) => return Err(MonitorError::Timeout(deadline)),
    };

    let sample = serde_json::from_slice(&reply[..len])?;
    Ok(sample)
}
