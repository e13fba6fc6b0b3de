//! Store bridge: keeps an [`EntityStore`] in sync with a [`HubConnection`].
//!
//! Runs as a background task. On every `Connected` it pulls a full
//! `get_states` snapshot, then applies each `state_changed` event in
//! delivery order. Shuts down on cancellation.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::connection::HubConnection;
use crate::model::HubEvent;

use super::EntityStore;

/// Spawn the bridge task feeding `store` from `connection`.
pub fn spawn_store_bridge(
    connection: &HubConnection,
    store: Arc<EntityStore>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let subscription = connection.subscribe(move |event| {
        let _ = event_tx.send(event.clone());
    });
    let connection = connection.clone();

    tokio::spawn(async move {
        let _subscription = subscription;

        // Already authenticated before the bridge started.
        if connection.state().is_connected() {
            refresh(&connection, &store).await;
        }

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => break,

                event = event_rx.recv() => match event {
                    Some(HubEvent::Connected) => refresh(&connection, &store).await,
                    Some(HubEvent::StateChanged(change)) => store.apply_state_changed(&change),
                    Some(HubEvent::AuthInvalid { .. } | HubEvent::Disconnected) => {
                        debug!("store bridge: hub unavailable, keeping last known states");
                    }
                    None => break,
                },
            }
        }
        debug!("store bridge stopped");
    })
}

async fn refresh(connection: &HubConnection, store: &EntityStore) {
    match connection.get_states().await {
        Ok(states) => store.apply_snapshot(states),
        Err(e) => warn!(error = %e, "failed to load entity states"),
    }
}
