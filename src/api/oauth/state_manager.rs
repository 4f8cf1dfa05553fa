//! Single-use CSRF states for the OAuth connect flow.
//!
//! A state binds the callback to the owner who started the flow; the callback
//! trusts the owner recorded here rather than anything in its own request.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

struct PendingGrant {
    owner: String,
    issued: Instant,
}

/// Outstanding OAuth states, shared between handlers and the cleanup task.
#[derive(Clone)]
pub struct StateManager {
    pending: Arc<DashMap<String, PendingGrant>>,
    ttl: Duration,
}

impl StateManager {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            ttl: Duration::from_secs(ttl_seconds),
        }
    }

    /// Issues a fresh state for `owner`.
    pub fn issue(&self, owner: &str) -> String {
        let state = Uuid::new_v4().to_string();
        self.pending.insert(
            state.clone(),
            PendingGrant {
                owner: owner.to_string(),
                issued: Instant::now(),
            },
        );
        state
    }

    /// Consumes `state` and returns the owner it was issued to.
    ///
    /// Unknown, already-used and expired states all yield `None`.
    pub fn redeem(&self, state: &str) -> Option<String> {
        let (_, grant) = self.pending.remove(state)?;
        (grant.issued.elapsed() <= self.ttl).then_some(grant.owner)
    }

    /// Drops expired states. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, grant| grant.issued.elapsed() <= self.ttl);
        before.saturating_sub(self.pending.len())
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Periodically purges expired states. Runs until the task is dropped.
pub async fn run_state_cleanup(manager: StateManager, interval_seconds: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds));

    loop {
        interval.tick().await;
        let purged = manager.purge_expired();
        if purged > 0 {
            tracing::debug!(purged, remaining = manager.pending(), "Expired OAuth states purged");
        }
    }
}
