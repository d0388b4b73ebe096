//! Handle identity and open-handle accounting.
//!
//! # Responsibilities
//! - Generate unique handle IDs for tracing (`sock-N`)
//! - Count live socket handles per engine
//! - Keep the `etls_open_sockets` gauge in step with that count

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::observability::metrics;

/// Global atomic counter for handle IDs.
/// Relaxed ordering is enough, IDs only need to be unique.
static HANDLE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a socket or acceptor handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(u64);

impl HandleId {
    pub fn new() -> Self {
        Self(HANDLE_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for HandleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sock-{}", self.0)
    }
}

/// Counts live socket handles.
#[derive(Debug, Clone, Default)]
pub struct HandleTracker {
    open: Arc<AtomicU64>,
}

impl HandleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new handle. The returned guard releases it on drop.
    pub fn track(&self) -> HandleGuard {
        self.open.fetch_add(1, Ordering::SeqCst);
        metrics::socket_opened();
        HandleGuard {
            open: Arc::clone(&self.open),
            id: HandleId::new(),
        }
    }

    pub fn open_count(&self) -> u64 {
        self.open.load(Ordering::SeqCst)
    }
}

/// Lives as long as a handle's state; dropping it marks the handle released.
#[derive(Debug)]
pub struct HandleGuard {
    open: Arc<AtomicU64>,
    id: HandleId,
}

impl HandleGuard {
    pub fn id(&self) -> HandleId {
        self.id
    }
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
        metrics::socket_closed();
        tracing::trace!(socket_id = %self.id, "Handle released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_ids_are_unique() {
        let first = HandleId::new();
        let second = HandleId::new();
        assert_ne!(first, second);
        assert!(first.to_string().starts_with("sock-"));
    }

    #[test]
    fn tracker_counts_live_guards() {
        let tracker = HandleTracker::new();
        assert_eq!(tracker.open_count(), 0);

        let first = tracker.track();
        let second = tracker.track();
        assert_eq!(tracker.open_count(), 2);
        assert_ne!(first.id(), second.id());

        drop(first);
        assert_eq!(tracker.open_count(), 1);
        drop(second);
        assert_eq!(tracker.open_count(), 0);
    }
}
