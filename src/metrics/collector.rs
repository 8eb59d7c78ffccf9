//! Metrics collector using prometheus-client.
//!
//! Everything is labeled by backend node address; agent polls carry an
//! additional success/failure label.

use crate::balance::Node;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use std::time::Duration;

/// Labels for per-node metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct NodeLabels {
    pub node: String,
}

/// Labels for bytes transferred.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct BytesLabels {
    pub node: String,
    pub direction: Direction,
}

/// Direction of a byte flow, relative to the backend.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum Direction {
    ToBackend,
    ToClient,
}

/// Labels for agent poll results.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PollLabels {
    pub node: String,
    pub result: PollResult,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum PollResult {
    Success,
    Failure,
}

/// Collects and stores all metrics.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<MetricsCollectorInner>,
}

struct MetricsCollectorInner {
    /// Picks per node.
    picks_total: Family<NodeLabels, Counter>,
    /// Active connections per node.
    active_connections: Family<NodeLabels, Gauge>,
    /// Total connections per node.
    connections_total: Family<NodeLabels, Counter>,
    /// Session duration histogram (seconds).
    session_duration_seconds: Family<NodeLabels, Histogram>,
    /// Bytes transferred per node and direction.
    bytes_total: Family<BytesLabels, Counter>,
    /// Agent poll outcomes per node.
    agent_polls_total: Family<PollLabels, Counter>,
    registry: Registry,
}

impl MetricsCollector {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let picks_total = Family::<NodeLabels, Counter>::default();
        let active_connections = Family::<NodeLabels, Gauge>::default();
        let connections_total = Family::<NodeLabels, Counter>::default();
        let session_duration_seconds = Family::<NodeLabels, Histogram>::new_with_constructor(|| {
            // 1ms up through ~60s (0.001 * 2.5^12).
            Histogram::new(exponential_buckets(0.001, 2.5, 13))
        });
        let bytes_total = Family::<BytesLabels, Counter>::default();
        let agent_polls_total = Family::<PollLabels, Counter>::default();

        registry.register(
            "adaptlb_picks",
            "Times each node was selected by the picker",
            picks_total.clone(),
        );
        registry.register(
            "adaptlb_active_connections",
            "Connections currently forwarded per node",
            active_connections.clone(),
        );
        registry.register(
            "adaptlb_connections",
            "Total connections forwarded per node",
            connections_total.clone(),
        );
        registry.register(
            "adaptlb_session_duration_seconds",
            "Forwarded session duration in seconds",
            session_duration_seconds.clone(),
        );
        registry.register(
            "adaptlb_bytes",
            "Total bytes proxied per node and direction",
            bytes_total.clone(),
        );
        registry.register(
            "adaptlb_agent_polls",
            "Resource monitoring agent polls per node and result",
            agent_polls_total.clone(),
        );

        Self {
            inner: Arc::new(MetricsCollectorInner {
                picks_total,
                active_connections,
                connections_total,
                session_duration_seconds,
                bytes_total,
                agent_polls_total,
                registry,
            }),
        }
    }

    /// Get the prometheus registry for encoding.
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    fn node_labels(node: &Node) -> NodeLabels {
        NodeLabels {
            node: node.backend_addr(),
        }
    }

    /// Record the picker's choice.
    pub fn record_pick(&self, node: &Node) {
        self.inner
            .picks_total
            .get_or_create(&Self::node_labels(node))
            .inc();
    }

    /// Increment active connections for a node.
    pub fn connection_opened(&self, node: &Node) {
        let labels = Self::node_labels(node);
        self.inner.active_connections.get_or_create(&labels).inc();
        self.inner.connections_total.get_or_create(&labels).inc();
    }

    /// Decrement active connections for a node.
    pub fn connection_closed(&self, node: &Node) {
        self.inner
            .active_connections
            .get_or_create(&Self::node_labels(node))
            .dec();
    }

    /// Record a completed session: duration and byte counts.
    pub fn record_session(
        &self,
        node: &Node,
        bytes_to_backend: u64,
        bytes_to_client: u64,
        duration: Duration,
    ) {
        let address = node.backend_addr();

        self.inner
            .session_duration_seconds
            .get_or_create(&NodeLabels {
                node: address.clone(),
            })
            .observe(duration.as_secs_f64());

        self.inner
            .bytes_total
            .get_or_create(&BytesLabels {
                node: address.clone(),
                direction: Direction::ToBackend,
            })
            .inc_by(bytes_to_backend);
        self.inner
            .bytes_total
            .get_or_create(&BytesLabels {
                node: address,
                direction: Direction::ToClient,
            })
            .inc_by(bytes_to_client);
    }

    /// Record an agent poll outcome.
    pub fn record_agent_poll(&self, node: &Node, success: bool) {
        self.inner
            .agent_polls_total
            .get_or_create(&PollLabels {
                node: node.backend_addr(),
                result: if success {
                    PollResult::Success
                } else {
                    PollResult::Failure
                },
            })
            .inc();
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_node() -> Node {
        Node {
            id: 0,
            host: "127.0.0.1".to_string(),
            port: 9000,
            monitor_port: 9500,
            max_connections: 100,
        }
    }

    #[test]
    fn test_collector_encodes() {
        let collector = MetricsCollector::new();
        let node = test_node();

        collector.record_pick(&node);
        collector.connection_opened(&node);
        collector.record_session(&node, 128, 4096, Duration::from_millis(25));
        collector.record_agent_poll(&node, true);
        collector.record_agent_poll(&node, false);
        collector.connection_closed(&node);

        let mut buffer = String::new();
        prometheus_client::encoding::text::encode(&mut buffer, collector.registry()).unwrap();

        assert!(buffer.contains("adaptlb_picks"));
        assert!(buffer.contains("adaptlb_active_connections"));
        assert!(buffer.contains("adaptlb_agent_polls"));
        assert!(buffer.contains("127.0.0.1:9000"));
    }
}
