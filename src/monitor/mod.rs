//! Resource monitoring agent (RMA) polling.

mod poller;

pub use poller::{query_agent, MonitorError, ResourceMonitor};
