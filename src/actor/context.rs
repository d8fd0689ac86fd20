use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::actor::cell::{spawn_actor, CellShared, ParentLink};
use crate::actor::core_types::{ActorId, ChildOptions};
use crate::actor::reference::ActorRef;
use crate::behavior::BehaviorDef;
use crate::error::ActorError;
use crate::logging::LogHandle;
use crate::system::ActorSystem;

/// What a behavior sees of its own actor: identity, log handle, child
/// creation and the weak parent link. Cheap to clone into handler futures.
#[derive(Clone)]
pub struct ActorContext {
  system: ActorSystem,
  cell: Arc<CellShared>,
  log: LogHandle,
}

impl ActorContext {
  pub(crate) fn new(system: ActorSystem, cell: Arc<CellShared>, log: LogHandle) -> Self {
    ActorContext { system, cell, log }
  }

  pub fn id(&self) -> &ActorId {
    &self.cell.id
  }

  pub fn log(&self) -> &LogHandle {
    &self.log
  }

  pub fn system(&self) -> &ActorSystem {
    &self.system
  }

  /// Creates a child owned by this actor. Usable from `initialize` onward.
  pub async fn create_child(&self, def: BehaviorDef, options: ChildOptions) -> Result<ActorRef, ActorError> {
    let link = ParentLink {
      id: self.cell.id.clone(),
      children: self.cell.children.clone(),
    };
    spawn_actor(&self.system, Some(link), def, options).await
  }

  /// Weak parent resolution: id plus a directory lookup. `None` for the
  /// root and for a parent that has already died.
  pub fn parent(&self) -> Option<ActorRef> {
    let parent_id = self.cell.parent_id.as_ref()?;
    self.system.directory().get(parent_id)
  }
}

impl Debug for ActorContext {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ActorContext").field("id", &self.cell.id).finish()
  }
}
