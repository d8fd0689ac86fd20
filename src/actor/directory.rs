use std::sync::Arc;

use dashmap::DashMap;

use crate::actor::core_types::ActorId;
use crate::actor::reference::ActorRef;

/// Per-system index of live actors by id. Weak parent lookups and incoming
/// wire requests resolve through it; entries are removed when the actor
/// reaches `Destroyed`, so a hit is always a live (or at least not yet
/// fully dead) target.
#[derive(Debug, Clone, Default)]
pub(crate) struct ActorDirectory {
  entries: Arc<DashMap<ActorId, ActorRef>>,
}

impl ActorDirectory {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register(&self, actor_ref: ActorRef) {
    self.entries.insert(actor_ref.id().clone(), actor_ref);
  }

  pub fn unregister(&self, id: &ActorId) {
    self.entries.remove(id);
  }

  pub fn get(&self, id: &ActorId) -> Option<ActorRef> {
    self.entries.get(id).map(|entry| entry.value().clone())
  }
}
