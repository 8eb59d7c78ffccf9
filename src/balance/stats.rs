//! Process-wide connection statistics, keyed by node id.
//!
//! Three producers feed this store concurrently: the accept path
//! (connection counts, sticky bindings), the forwarders (response times),
//! and the agent pollers (resource samples). The picker reads everything
//! through [`StatsStore::snapshot`]. Every individual operation is
//! linearizable; a snapshot is consistent per node but may interleave
//! updates across nodes.

use crate::balance::NodeId;
use dashmap::DashMap;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

/// Upper bound on retained response-time samples per node.
pub const RESPONSE_HISTORY_LIMIT: usize = 20;

/// Default cap on the sticky-binding table.
const STICKY_CAPACITY: usize = 65_536;

/// CPU and free-memory numbers reported by a resource monitoring agent.
///
/// The all-zero value is the sentinel for "no valid data": it is stored
/// when a node has never been polled or when its last poll failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ResourceSample {
    /// CPU utilization percentage, 0-100.
    #[serde(default)]
    pub cpu: u8,

    /// Free memory in bytes.
    #[serde(default)]
    pub memory: u64,
}

impl ResourceSample {
    /// Whether this is the "no data" sentinel.
    pub fn is_sentinel(&self) -> bool {
        self.cpu == 0 && self.memory == 0
    }
}

/// Point-in-time view of one node's statistics, input to the picker.
#[derive(Debug, Clone)]
pub struct NodeSnapshot {
    pub node_id: NodeId,
    pub connections: u32,
    pub max_connections: i32,
    /// Whether the sticky table currently binds the requesting client's
    /// source key to this node.
    pub matches_source: bool,
    pub response_times: Vec<Duration>,
    pub resources: ResourceSample,
}

/// Per-node mutable state.
#[derive(Debug, Default)]
struct NodeStats {
    connections: AtomicU32,
    response_times: RwLock<VecDeque<Duration>>,
    resources: RwLock<ResourceSample>,
}

/// Concurrent statistics store for the whole node pool.
///
/// Node state lives in a dense `Vec` indexed by [`NodeId`]; callers must
/// only pass ids of configured nodes.
pub struct StatsStore {
    nodes: Vec<NodeStats>,
    sticky: DashMap<String, NodeId>,
    /// Insertion order of sticky keys, for capacity eviction.
    sticky_order: Mutex<VecDeque<String>>,
    sticky_capacity: usize,
}

impl StatsStore {
    /// Create a store for `node_count` nodes, all counters at zero and all
    /// resource samples at the sentinel.
    pub fn new(node_count: usize) -> Self {
        Self::with_sticky_capacity(node_count, STICKY_CAPACITY)
    }

    pub fn with_sticky_capacity(node_count: usize, sticky_capacity: usize) -> Self {
        Self {
            nodes: (0..node_count).map(|_| NodeStats::default()).collect(),
            sticky: DashMap::new(),
            sticky_order: Mutex::new(VecDeque::new()),
            sticky_capacity,
        }
    }

    /// Record a connection opened against a node.
    pub fn inc_connections(&self, node_id: NodeId) {
        self.nodes[node_id]
            .connections
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection closed against a node. Saturates at zero.
    pub fn dec_connections(&self, node_id: NodeId) {
        let _ = self.nodes[node_id]
            .connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |count| {
                count.checked_sub(1)
            });
    }

    pub fn connections(&self, node_id: NodeId) -> u32 {
        self.nodes[node_id].connections.load(Ordering::Relaxed)
    }

    /// Append a response-time sample, dropping the oldest entries so the
    /// history holds at most [`RESPONSE_HISTORY_LIMIT`] samples afterwards.
    pub fn record_response_time(&self, node_id: NodeId, duration: Duration) {
        let mut times = self.nodes[node_id]
            .response_times
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        while times.len() >= RESPONSE_HISTORY_LIMIT {
            times.pop_front();
        }
        times.push_back(duration);
    }

    /// Copy of a node's response-time history, oldest first.
    pub fn response_times(&self, node_id: NodeId) -> Vec<Duration> {
        self.nodes[node_id]
            .response_times
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .copied()
            .collect()
    }

    /// Replace a node's resource sample as a whole.
    pub fn set_resources(&self, node_id: NodeId, sample: ResourceSample) {
        *self.nodes[node_id]
            .resources
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = sample;
    }

    pub fn resources(&self, node_id: NodeId) -> ResourceSample {
        *self.nodes[node_id]
            .resources
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Bind a source key to a node. Last writer wins. When the table is
    /// full, the oldest binding is evicted.
    pub fn bind_sticky(&self, source_key: &str, node_id: NodeId) {
        if self.sticky.insert(source_key.to_string(), node_id).is_none() {
            let mut order = self
                .sticky_order
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            order.push_back(source_key.to_string());
            while order.len() > self.sticky_capacity {
                if let Some(evicted) = order.pop_front() {
                    self.sticky.remove(&evicted);
                }
            }
        }
    }

    /// Node currently bound to a source key, if any.
    pub fn sticky_binding(&self, source_key: &str) -> Option<NodeId> {
        self.sticky.get(source_key).map(|entry| *entry.value())
    }

    /// Build per-node snapshots for a pick against `source_key`.
    ///
    /// `max_connections` is the per-node capacity list in node-id order,
    /// supplied by the caller because the store holds no static node data.
    pub fn snapshot(&self, max_connections: &[i32], source_key: &str) -> Vec<NodeSnapshot> {
        debug_assert_eq!(max_connections.len(), self.nodes.len());

        let bound = self.sticky_binding(source_key);

        self.nodes
            .iter()
            .enumerate()
            .map(|(node_id, _)| NodeSnapshot {
                node_id,
                connections: self.connections(node_id),
                max_connections: max_connections[node_id],
                matches_source: bound == Some(node_id),
                response_times: self.response_times(node_id),
                resources: self.resources(node_id),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_count_round_trip() {
        let store = StatsStore::new(2);
        assert_eq!(store.connections(0), 0);

        store.inc_connections(0);
        store.inc_connections(0);
        assert_eq!(store.connections(0), 2);
        assert_eq!(store.connections(1), 0);

        store.dec_connections(0);
        store.dec_connections(0);
        assert_eq!(store.connections(0), 0);
    }

    #[test]
    fn test_dec_saturates_at_zero() {
        let store = StatsStore::new(1);
        store.dec_connections(0);
        store.dec_connections(0);
        assert_eq!(store.connections(0), 0);
    }

    #[test]
    fn test_response_history_fifo_bound() {
        let store = StatsStore::new(1);
        for i in 1..=25u64 {
            store.record_response_time(0, Duration::from_millis(i));
        }

        let times = store.response_times(0);
        assert_eq!(times.len(), RESPONSE_HISTORY_LIMIT);
        // Samples 1..=5 were dropped; 6..=25 remain in FIFO order.
        let expected: Vec<Duration> = (6..=25u64).map(Duration::from_millis).collect();
        assert_eq!(times, expected);
    }

    #[test]
    fn test_response_history_exact_at_limit() {
        let store = StatsStore::new(1);
        for i in 0..RESPONSE_HISTORY_LIMIT as u64 {
            store.record_response_time(0, Duration::from_millis(i));
        }
        assert_eq!(store.response_times(0).len(), RESPONSE_HISTORY_LIMIT);

        store.record_response_time(0, Duration::from_secs(1));
        let times = store.response_times(0);
        assert_eq!(times.len(), RESPONSE_HISTORY_LIMIT);
        assert_eq!(*times.last().unwrap(), Duration::from_secs(1));
        assert_eq!(times[0], Duration::from_millis(1));
    }

    #[test]
    fn test_resources_replaced_whole() {
        let store = StatsStore::new(1);
        assert!(store.resources(0).is_sentinel());

        let sample = ResourceSample { cpu: 40, memory: 1 << 30 };
        store.set_resources(0, sample);
        assert_eq!(store.resources(0), sample);

        store.set_resources(0, ResourceSample::default());
        assert!(store.resources(0).is_sentinel());
    }

    #[test]
    fn test_sticky_last_writer_wins() {
        let store = StatsStore::new(3);
        assert_eq!(store.sticky_binding("k"), None);

        store.bind_sticky("k", 1);
        assert_eq!(store.sticky_binding("k"), Some(1));

        store.bind_sticky("k", 2);
        assert_eq!(store.sticky_binding("k"), Some(2));
    }

    #[test]
    fn test_sticky_capacity_evicts_oldest() {
        let store = StatsStore::with_sticky_capacity(1, 2);
        store.bind_sticky("a", 0);
        store.bind_sticky("b", 0);
        store.bind_sticky("c", 0);

        assert_eq!(store.sticky_binding("a"), None);
        assert_eq!(store.sticky_binding("b"), Some(0));
        assert_eq!(store.sticky_binding("c"), Some(0));
    }

    #[test]
    fn test_snapshot_reports_sticky_match() {
        let store = StatsStore::new(3);
        store.bind_sticky("key", 1);
        store.inc_connections(2);

        let snaps = store.snapshot(&[100, 100, 100], "key");
        assert_eq!(snaps.len(), 3);
        assert!(!snaps[0].matches_source);
        assert!(snaps[1].matches_source);
        assert!(!snaps[2].matches_source);
        assert_eq!(snaps[2].connections, 1);
        assert_eq!(snaps[0].max_connections, 100);
    }

    #[test]
    fn test_resource_sample_json() {
        let sample: ResourceSample = serde_json::from_str(r#"{"cpu": 42, "memory": 1073741824}"#).unwrap();
        assert_eq!(sample.cpu, 42);
        assert_eq!(sample.memory, 1 << 30);

        // Missing fields default to zero.
        let sample: ResourceSample = serde_json::from_str(r#"{"cpu": 7}"#).unwrap();
        assert_eq!(sample.cpu, 7);
        assert_eq!(sample.memory, 0);

        // Unknown fields are ignored.
        let sample: ResourceSample =
            serde_json::from_str(r#"{"cpu": 1, "memory": 2, "disk": 3}"#).unwrap();
        assert_eq!(sample.cpu, 1);

        // Malformed payloads are an error, not a partial sample.
        assert!(serde_json::from_str::<ResourceSample>("not json").is_err());
        assert!(serde_json::from_str::<ResourceSample>(r#"{"cpu": 900}"#).is_err());
    }
}
