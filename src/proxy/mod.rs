//! TCP forwarding between clients and backend nodes.

mod tcp_proxy;

pub use tcp_proxy::{connect_to_backend, proxy_bidirectional, ProxyError, SessionStats};
