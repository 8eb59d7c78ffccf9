//! The balancer facade: node pool + statistics store + picker.
//!
//! This is the narrow surface the accept loop and the forwarders drive.
//! Callers pair `on_connection_open` with `on_connection_close` exactly
//! once per forwarded connection.

use crate::balance::{build_nodes, picker, Node, NodeError, NodeId, StatsStore};
use crate::config::Config;

/// Routes connections across the configured node pool.
pub struct Balancer {
    nodes: Vec<Node>,
    max_connections: Vec<i32>,
    store: StatsStore,
    sticky_enabled: bool,
}

impl Balancer {
    /// Build a balancer from validated configuration.
    pub fn new(config: &Config) -> Result<Self, NodeError> {
        let nodes = build_nodes(&config.nodes)?;
        let max_connections = nodes.iter().map(|n| n.max_connections).collect();
        let store = StatsStore::new(nodes.len());
        Ok(Self {
            nodes,
            max_connections,
            store,
            sticky_enabled: config.sticky_connections,
        })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn sticky_enabled(&self) -> bool {
        self.sticky_enabled
    }

    /// Statistics store, for the agent poller and for tests.
    pub fn store(&self) -> &StatsStore {
        &self.store
    }

    /// Pick a target node for a client identified by `source_key`.
    ///
    /// Builds a snapshot of the whole pool and runs the scoring engine.
    /// Never fails: an empty pool is rejected at construction.
    pub fn pick(&self, source_key: &str) -> &Node {
        let snapshots = self.store.snapshot(&self.max_connections, source_key);
        let winner = picker::pick(&snapshots, self.sticky_enabled);
        &self.nodes[winner]
    }

    /// Record that a connection was opened against a node.
    pub fn on_connection_open(&self, node_id: NodeId) {
        self.store.inc_connections(node_id);
    }

    /// Record that a connection closed. Saturates at zero.
    pub fn on_connection_close(&self, node_id: NodeId) {
        self.store.dec_connections(node_id);
    }

    /// Record one response-time sample for a node.
    pub fn on_response_sample(&self, node_id: NodeId, duration: std::time::Duration) {
        self.store.record_response_time(node_id, duration);
    }

    /// Bind a source key to a node. No-op when stickiness is disabled.
    pub fn bind_sticky(&self, source_key: &str, node_id: NodeId) {
        if self.sticky_enabled {
            self.store.bind_sticky(source_key, node_id);
        }
    }
}
