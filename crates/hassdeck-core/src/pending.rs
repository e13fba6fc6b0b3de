// ── In-flight request table ──
//
// Maps request ids on the current socket to the caller waiting for the
// answer. Every entry ends exactly one way: resolved by a matching response,
// expired at its deadline, or rejected when the socket goes away.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::CoreError;

pub type Outcome = Result<Value, CoreError>;

struct Pending {
    reply: oneshot::Sender<Outcome>,
    deadline: Instant,
    timeout: Duration,
}

#[derive(Default)]
pub struct PendingRequests {
    entries: HashMap<u64, Pending>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track request `id`, expiring `timeout` from now.
    pub fn insert(&mut self, id: u64, timeout: Duration, reply: oneshot::Sender<Outcome>) {
        let pending = Pending {
            reply,
            deadline: Instant::now() + timeout,
            timeout,
        };
        if self.entries.insert(id, pending).is_some() {
            tracing::warn!(id, "request id reused while still pending");
        }
    }

    /// Complete request `id`. Returns `false` when it was not pending
    /// (already answered, expired, or never issued).
    pub fn resolve(&mut self, id: u64, outcome: Outcome) -> bool {
        let Some(pending) = self.entries.remove(&id) else {
            tracing::debug!(id, "response for unknown request id dropped");
            return false;
        };
        // The caller may have stopped waiting; that's fine.
        let _ = pending.reply.send(outcome);
        true
    }

    /// Reject every entry whose deadline is at or before `now`.
    pub fn expire(&mut self, now: Instant) -> usize {
        let expired: Vec<u64> = self
            .entries
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            if let Some(pending) = self.entries.remove(id) {
                tracing::debug!(id, "request timed out");
                let _ = pending.reply.send(Err(CoreError::RequestTimeout {
                    id: *id,
                    timeout_secs: pending.timeout.as_secs(),
                }));
            }
        }
        expired.len()
    }

    /// Earliest deadline among pending entries.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.values().map(|p| p.deadline).min()
    }

    /// Reject everything with `ConnectionLost`.
    pub fn reject_all(&mut self) -> usize {
        let count = self.entries.len();
        for (_, pending) in self.entries.drain() {
            let _ = pending.reply.send(Err(CoreError::ConnectionLost));
        }
        if count > 0 {
            tracing::debug!(count, "rejected in-flight requests");
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
