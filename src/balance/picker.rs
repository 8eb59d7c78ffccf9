//! Multi-criteria node selection.
//!
//! The picker is a pure function over a statistics snapshot: no state, no
//! I/O, no failure path. Each scoring term ranks the pool and awards
//! `rank x coefficient`; the node with the largest total wins.

use crate::balance::{NodeId, NodeSnapshot};
use std::time::Duration;

const LEAST_CONNECTIONS_WEIGHT: f64 = 0.15;
const CONNECTION_USAGE_WEIGHT: f64 = 0.15;
const SOURCE_AFFINITY_WEIGHT: f64 = 0.15;
const PEAK_LATENCY_WEIGHT: f64 = 0.08;
const MEAN_LATENCY_WEIGHT: f64 = 0.13;
const LATENCY_JITTER_WEIGHT: f64 = 0.04;
const CPU_WEIGHT: f64 = 0.15;
const FREE_MEMORY_WEIGHT: f64 = 0.15;

/// Which end of a term's value range is the WORST placement.
enum Worst {
    /// Large values rank first (connections, latency, CPU).
    Highest,
    /// Small values rank first (free memory).
    Lowest,
}

/// Pick the target node for one connection.
///
/// Ranking runs "worst-first": for every term the pool is sorted so the
/// least attractive node sits at rank 1 and the most attractive at rank n,
/// and each node's score grows by `rank x coefficient`. The counter-
/// intuitive consequence is that the BEST node per criterion collects the
/// LARGEST contribution, and the overall winner is the maximum total.
/// Nodes with equal term values share a rank, so an all-tied pool resolves
/// purely by the final lowest-id preference.
///
/// Must be called with a non-empty snapshot; configuration validation
/// rejects empty pools before any traffic is accepted.
pub fn pick(snapshots: &[NodeSnapshot], sticky_enabled: bool) -> NodeId {
    debug_assert!(!snapshots.is_empty(), "picker requires a non-empty pool");

    let mut scores = vec![0.0f64; snapshots.len()];

    let connections: Vec<f64> = snapshots
        .iter()
        .map(|s| f64::from(s.connections))
        .collect();
    apply_ranked(&mut scores, &connections, LEAST_CONNECTIONS_WEIGHT, Worst::Highest);

    let usage: Vec<f64> = snapshots.iter().map(connection_usage_percent).collect();
    apply_ranked(&mut scores, &usage, CONNECTION_USAGE_WEIGHT, Worst::Highest);

    let peak: Vec<f64> = snapshots
        .iter()
        .map(|s| peak_latency_secs(&s.response_times))
        .collect();
    apply_ranked(&mut scores, &peak, PEAK_LATENCY_WEIGHT, Worst::Highest);

    let mean: Vec<f64> = snapshots
        .iter()
        .map(|s| mean_latency_secs(&s.response_times))
        .collect();
    apply_ranked(&mut scores, &mean, MEAN_LATENCY_WEIGHT, Worst::Highest);

    let jitter: Vec<f64> = snapshots
        .iter()
        .map(|s| latency_jitter_secs(&s.response_times))
        .collect();
    apply_ranked(&mut scores, &jitter, LATENCY_JITTER_WEIGHT, Worst::Highest);

    if sticky_enabled {
        // Flat bonus, not rank-based: stickiness nudges, it does not trump.
        for (i, snapshot) in snapshots.iter().enumerate() {
            if snapshot.matches_source {
                scores[i] += SOURCE_AFFINITY_WEIGHT;
            }
        }
    }

    // A single sentinel sample disables resource scoring for the whole
    // pool: all-zero means "no data", and ranking nodes with data against
    // nodes without would skew toward whichever end the sentinel lands on.
    if snapshots.iter().all(|s| !s.resources.is_sentinel()) {
        let cpu: Vec<f64> = snapshots
            .iter()
            .map(|s| f64::from(s.resources.cpu))
            .collect();
        apply_ranked(&mut scores, &cpu, CPU_WEIGHT, Worst::Highest);

        let memory: Vec<f64> = snapshots
            .iter()
            .map(|s| s.resources.memory as f64)
            .collect();
        apply_ranked(&mut scores, &memory, FREE_MEMORY_WEIGHT, Worst::Lowest);
    }

    // Highest score wins; the stable sort keeps id order among equals, so
    // ties resolve to the lowest node id.
    let mut by_score: Vec<usize> = (0..snapshots.len()).collect();
    by_score.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    snapshots[by_score[0]].node_id
}

/// Award `rank x weight` per node for one term.
///
/// `keys` is in node order. The sort is stable, so among distinct values
/// the id-ascending input order is what ties the traversal down; nodes
/// with EQUAL values share the rank of the first of them, which keeps
/// identically-loaded nodes at identical scores.
fn apply_ranked(scores: &mut [f64], keys: &[f64], weight: f64, worst: Worst) {
    let mut order: Vec<usize> = (0..keys.len()).collect();
    match worst {
        Worst::Highest => order.sort_by(|&a, &b| keys[b].total_cmp(&keys[a])),
        Worst::Lowest => order.sort_by(|&a, &b| keys[a].total_cmp(&keys[b])),
    }

    let mut rank = 0usize;
    let mut previous: Option<f64> = None;
    for (position, &node) in order.iter().enumerate() {
        if previous != Some(keys[node]) {
            rank = position + 1;
            previous = Some(keys[node]);
        }
        scores[node] += rank as f64 * weight;
    }
}

/// Active connections as a floating-point percentage of capacity.
///
/// A capacity of zero is treated as unlimited (0%), not a division crash.
fn connection_usage_percent(snapshot: &NodeSnapshot) -> f64 {
    if snapshot.max_connections == 0 {
        return 0.0;
    }
    f64::from(snapshot.connections) / f64::from(snapshot.max_connections) * 100.0
}

/// Largest sample, or 0 for an empty history.
///
/// Empty histories deliberately report 0 for every latency statistic: a
/// node nobody has talked to yet lands at the low-latency end of the
/// ranking and is optimistically preferred.
fn peak_latency_secs(times: &[Duration]) -> f64 {
    times.iter().max().map_or(0.0, Duration::as_secs_f64)
}

/// Arithmetic mean, or 0 for an empty history.
fn mean_latency_secs(times: &[Duration]) -> f64 {
    if times.is_empty() {
        return 0.0;
    }
    times.iter().map(Duration::as_secs_f64).sum::<f64>() / times.len() as f64
}

/// Sample standard deviation (n - 1 denominator), 0 for fewer than two
/// samples.
fn latency_jitter_secs(times: &[Duration]) -> f64 {
    if times.len() < 2 {
        return 0.0;
    }
    let mean = mean_latency_secs(times);
    let variance = times
        .iter()
        .map(|d| {
            let delta = d.as_secs_f64() - mean;
            delta * delta
        })
        .sum::<f64>()
        / (times.len() - 1) as f64;
    variance.sqrt()
}
