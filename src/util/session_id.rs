//! Per-connection session identifiers for log correlation.

use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Identifier attached to every forwarded connection's log lines.
#[derive(Clone, Debug)]
pub struct SessionId(String);

impl SessionId {
    /// Counter-based id, unique within this process. Format:
    /// `sess-{counter}` zero-padded to 12 hex digits.
    pub fn next() -> Self {
        let count = SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("sess-{:012x}", count))
    }

    /// Globally unique id for cross-process correlation.
    pub fn unique() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_next_is_unique() {
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(SessionId::next().as_str().to_string()));
        }
    }

    #[test]
    fn test_format() {
        assert!(SessionId::next().as_str().starts_with("sess-"));
        assert_eq!(SessionId::unique().as_str().len(), 36);
    }
}
