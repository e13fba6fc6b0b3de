// ── Host application lifecycle ──
//
// Connections only open sockets while the host is in the foreground. The
// host owns one `LifecycleWatcher` and flips it; every connection created
// from it follows along.

use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::sync::watch;

/// Whether the host application is visible to the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AppLifecycle {
    #[default]
    Foreground,
    Background,
}

impl AppLifecycle {
    pub fn is_foreground(self) -> bool {
        matches!(self, Self::Foreground)
    }
}

/// Broadcasts foreground/background transitions to connections.
///
/// Cheap to clone; all clones share the same signal.
#[derive(Debug, Clone)]
pub struct LifecycleWatcher {
    tx: watch::Sender<AppLifecycle>,
}

impl Default for LifecycleWatcher {
    fn default() -> Self {
        Self::new(AppLifecycle::Foreground)
    }
}

impl LifecycleWatcher {
    pub fn new(initial: AppLifecycle) -> Self {
        Self {
            tx: watch::Sender::new(initial),
        }
    }

    /// Record a transition. Repeating the current value is a no-op for
    /// subscribers.
    pub fn set(&self, lifecycle: AppLifecycle) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == lifecycle {
                false
            } else {
                *current = lifecycle;
                true
            }
        });
        if changed {
            tracing::debug!(%lifecycle, "host lifecycle changed");
        }
    }

    pub fn current(&self) -> AppLifecycle {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<AppLifecycle> {
        self.tx.subscribe()
    }
}
