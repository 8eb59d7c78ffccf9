//! Static backend node descriptors.

use crate::config::{split_host_port, NodeConfig};
use thiserror::Error;

/// Dense, zero-based node identifier. Doubles as the index into every
/// per-node table in the statistics store.
pub type NodeId = usize;

/// Errors building the node pool from configuration.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("no nodes configured")]
    EmptyPool,

    #[error("invalid node address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },
}

/// One backend server the balancer may forward to.
///
/// Nodes are created once at startup and immutable thereafter.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub host: String,
    pub port: u16,
    /// UDP port of the resource monitoring agent, on the same host.
    pub monitor_port: u16,
    /// Capacity for the percent-usage scoring term. Zero means unlimited.
    pub max_connections: i32,
}

impl Node {
    /// "host:port" of the backend service.
    pub fn backend_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// "host:port" of the resource monitoring agent.
    pub fn monitor_addr(&self) -> String {
        format!("{}:{}", self.host, self.monitor_port)
    }
}

/// Build the node pool, assigning ids in configuration order.
pub fn build_nodes(configs: &[NodeConfig]) -> Result<Vec<Node>, NodeError> {
    if configs.is_empty() {
        return Err(NodeError::EmptyPool);
    }

    configs
        .iter()
        .enumerate()
        .map(|(id, cfg)| {
            let (host, port) =
                split_host_port(&cfg.address).map_err(|reason| NodeError::InvalidAddress {
                    address: cfg.address.clone(),
                    reason,
                })?;
            Ok(Node {
                id,
                host: host.to_string(),
                port,
                monitor_port: cfg.resource_monitor_agent_port,
                max_connections: cfg.max_connections,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_config(address: &str) -> NodeConfig {
        NodeConfig {
            address: address.to_string(),
            resource_monitor_agent_port: 9500,
            max_connections: 100,
        }
    }

    #[test]
    fn test_build_nodes_assigns_dense_ids() {
        let nodes = build_nodes(&[
            node_config("10.0.0.1:9000"),
            node_config("10.0.0.2:9001"),
            node_config("10.0.0.3:9002"),
        ])
        .unwrap();

        assert_eq!(nodes.len(), 3);
        for (i, node) in nodes.iter().enumerate() {
            assert_eq!(node.id, i);
        }
        assert_eq!(nodes[1].backend_addr(), "10.0.0.2:9001");
        assert_eq!(nodes[1].monitor_addr(), "10.0.0.2:9500");
    }

    #[test]
    fn test_build_nodes_empty() {
        assert!(matches!(build_nodes(&[]), Err(NodeError::EmptyPool)));
    }

    #[test]
    fn test_build_nodes_bad_address() {
        let result = build_nodes(&[node_config("bare-host")]);
        assert!(matches!(result, Err(NodeError::InvalidAddress { .. })));
    }
}
