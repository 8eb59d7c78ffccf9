//! adaptlb - a resource-adaptive Layer 4 TCP load balancer
//!
//! This crate provides a TCP reverse proxy that spreads client connections
//! across a fixed pool of backend nodes. Each accepted connection is routed
//! by a multi-criteria scoring engine that combines:
//! - live connection counts,
//! - response-time history (peak, mean, jitter),
//! - CPU and free-memory samples polled from a per-node resource
//!   monitoring agent over UDP,
//! - optional source-IP stickiness.

pub mod balance;
pub mod config;
pub mod frontend;
pub mod metrics;
pub mod monitor;
pub mod proxy;
pub mod util;

pub use balance::Balancer;
pub use config::Config;
