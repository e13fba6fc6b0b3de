// ── Process-wide registry of live connections ──
//
// Every `HubConnection` registers here on construction and deregisters when
// its driver task exits. The registry only holds weak references; it never
// keeps a connection alive. `disconnect_all` is what a profile switch calls
// so no socket from the old credentials survives.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError, Weak};

use crate::connection::{ConnectionInner, HubConnection};

static GLOBAL: LazyLock<Arc<ConnectionRegistry>> = LazyLock::new(ConnectionRegistry::new);

#[derive(Default)]
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    live: Mutex<HashMap<u64, Weak<ConnectionInner>>>,
}

impl ConnectionRegistry {
    /// A private registry. Tests and embedders that need isolation use this
    /// with `HubConnection::with_registry`.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The registry shared by the whole process.
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL)
    }

    pub(crate) fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn register(&self, id: u64, connection: Weak<ConnectionInner>) {
        self.lock().insert(id, connection);
        tracing::debug!(connection = id, "connection registered");
    }

    pub(crate) fn deregister(&self, id: u64) {
        if self.lock().remove(&id).is_some() {
            tracing::debug!(connection = id, "connection deregistered");
        }
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Disconnect every live connection and wait for each to finish.
    ///
    /// Returns how many were disconnected. The registry is empty afterwards.
    pub async fn disconnect_all(&self) -> usize {
        let live: Vec<HubConnection> = {
            let mut entries = self.lock();
            let live = entries
                .values()
                .filter_map(Weak::upgrade)
                .map(HubConnection::from_inner)
                .collect();
            entries.clear();
            live
        };
        tracing::info!(count = live.len(), "disconnecting all hub connections");
        for connection in &live {
            connection.disconnect().await;
        }
        live.len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Weak<ConnectionInner>>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("live", &self.len())
            .finish()
    }
}
