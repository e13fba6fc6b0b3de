// ── Entity state store ──
//
// Concurrent map of entity id → state, with a sorted snapshot rebuilt on
// every mutation and pushed through a `watch` channel.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::watch;

use crate::command::ServiceCall;
use crate::connection::HubConnection;
use crate::error::CoreError;
use crate::model::{EntityId, EntityState, StateChangedEvent};
use crate::stream::{EntityStream, Snapshot};

/// Current state of every entity the hub reported.
///
/// Written by full `get_states` snapshots, by `state_changed` events, and by
/// optimistic local updates. Any authoritative write replaces an optimistic
/// one.
pub struct EntityStore {
    entities: DashMap<EntityId, Arc<EntityState>>,
    snapshot: watch::Sender<Snapshot>,
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            entities: DashMap::new(),
            snapshot,
        }
    }

    /// Replace everything with `states`.
    pub fn apply_snapshot(&self, states: Vec<EntityState>) {
        self.entities.clear();
        for state in states {
            self.entities.insert(state.entity_id.clone(), Arc::new(state));
        }
        tracing::debug!(entities = self.entities.len(), "entity snapshot applied");
        self.rebuild_snapshot();
    }

    /// Apply one change event: upsert the new state, or remove the entity
    /// when the event carries no new state.
    pub fn apply_state_changed(&self, event: &StateChangedEvent) {
        match &event.new_state {
            Some(state) => {
                let mut state = state.clone();
                state.optimistic = false;
                self.entities.insert(event.entity_id.clone(), Arc::new(state));
            }
            None => {
                self.entities.remove(&event.entity_id);
            }
        }
        self.rebuild_snapshot();
    }

    /// Write `state` ahead of the hub's confirmation. Marked optimistic until
    /// the next authoritative update.
    pub fn optimistic_update(&self, mut state: EntityState) -> Arc<EntityState> {
        state.optimistic = true;
        tracing::trace!(entity_id = %state.entity_id, state = %state.state, "optimistic update");
        let state = Arc::new(state);
        self.entities
            .insert(state.entity_id.clone(), Arc::clone(&state));
        self.rebuild_snapshot();
        state
    }

    /// Send `call`, showing its predicted outcome in the store right away.
    ///
    /// The prediction stands until the hub reports the entity again. If the
    /// hub rejects the call, the previous state is put back unless something
    /// authoritative replaced the prediction in the meantime.
    pub async fn execute_optimistic(
        &self,
        connection: &HubConnection,
        call: ServiceCall,
    ) -> Result<Value, CoreError> {
        let previous = match call.target.entity_id.as_slice() {
            [entity_id] => self.get(&EntityId::from(entity_id.as_str())),
            _ => None,
        };
        let predicted = previous
            .as_deref()
            .and_then(|current| call.optimistic_state(current))
            .map(|state| self.optimistic_update(state));

        let result = connection.execute(call).await;
        if let (Err(e), Some(previous), Some(predicted)) = (&result, previous, predicted) {
            tracing::debug!(entity_id = %previous.entity_id, error = %e, "call failed, reverting optimistic state");
            self.revert(previous, &predicted);
        }
        result
    }

    pub fn get(&self, entity_id: &EntityId) -> Option<Arc<EntityState>> {
        self.entities.get(entity_id).map(|r| Arc::clone(r.value()))
    }

    /// Current snapshot, sorted by entity id (cheap `Arc` clone).
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> EntityStream {
        EntityStream::new(self.snapshot.subscribe())
    }

    /// Entities of one domain, sorted by entity id.
    pub fn by_domain(&self, domain: &str) -> Vec<Arc<EntityState>> {
        self.snapshot()
            .iter()
            .filter(|s| s.domain() == domain)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    fn revert(&self, previous: Arc<EntityState>, predicted: &Arc<EntityState>) {
        let entity_id = previous.entity_id.clone();
        let reverted = match self.entities.get_mut(&entity_id) {
            Some(mut current) if Arc::ptr_eq(current.value(), predicted) => {
                *current = previous;
                true
            }
            _ => false,
        };
        if reverted {
            self.rebuild_snapshot();
        }
    }

    fn rebuild_snapshot(&self) {
        let mut values: Vec<Arc<EntityState>> =
            self.entities.iter().map(|r| Arc::clone(r.value())).collect();
        values.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}
