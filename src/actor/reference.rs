use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use serde_json::Value;
use static_assertions::assert_impl_all;
use tokio::sync::watch;

use crate::actor::core_types::{ActorId, ActorState, ChildOptions, Mode};
use crate::actor::endpoint::Endpoint;
use crate::behavior::BehaviorDef;
use crate::error::ActorError;
use crate::logging::LogHandle;
use crate::message::Delivery;
use crate::system::ActorSystem;

/// Location-transparent handle to an actor. Freely clonable; does not own
/// the target — the parent does. All calls route through the backing
/// endpoint, so in-memory, forked, remote and router placements share this
/// one API.
#[derive(Clone)]
pub struct ActorRef {
  inner: Arc<ActorRefInner>,
}

struct ActorRefInner {
  id: ActorId,
  mode: Mode,
  endpoint: Arc<dyn Endpoint>,
  log: LogHandle,
  system: ActorSystem,
  parent_id: Option<ActorId>,
  custom_properties: Option<Value>,
}

assert_impl_all!(ActorRef: Send, Sync);

impl ActorRef {
  pub(crate) fn new(
    id: ActorId,
    mode: Mode,
    endpoint: Arc<dyn Endpoint>,
    log: LogHandle,
    system: ActorSystem,
    parent_id: Option<ActorId>,
    custom_properties: Option<Value>,
  ) -> Self {
    ActorRef {
      inner: Arc::new(ActorRefInner {
        id,
        mode,
        endpoint,
        log,
        system,
        parent_id,
        custom_properties,
      }),
    }
  }

  pub fn id(&self) -> &ActorId {
    &self.inner.id
  }

  /// The placement mode; router refs report their replica mode.
  pub fn mode(&self) -> Mode {
    self.inner.mode
  }

  pub fn log(&self) -> &LogHandle {
    &self.inner.log
  }

  pub fn custom_properties(&self) -> Option<&Value> {
    self.inner.custom_properties.as_ref()
  }

  /// Fire-and-forget send; resolves once the endpoint accepts the
  /// delivery.
  pub async fn send(&self, topic: impl Into<String>, payload: Value) -> Result<(), ActorError> {
    self.inner.endpoint.deliver(Delivery::fire_and_forget(topic, payload)).await
  }

  /// Request/response send; resolves with the handler's return value or
  /// fails with the error it raised.
  pub async fn send_and_receive(&self, topic: impl Into<String>, payload: Value) -> Result<Value, ActorError> {
    self.inner.endpoint.request(&topic.into(), payload).await
  }

  /// Delivers once to every replica behind a router ref, in replica-index
  /// order; equivalent to `send` elsewhere.
  pub async fn broadcast(&self, topic: impl Into<String>, payload: Value) -> Result<(), ActorError> {
    self.inner.endpoint.broadcast(&topic.into(), payload).await
  }

  /// Per-replica replies in replica-index order; a one-element sequence on
  /// non-router refs.
  pub async fn broadcast_and_receive(&self, topic: impl Into<String>, payload: Value) -> Result<Vec<Value>, ActorError> {
    self.inner.endpoint.broadcast_and_receive(&topic.into(), payload).await
  }

  pub async fn metrics(&self) -> Result<Value, ActorError> {
    self.inner.endpoint.metrics().await
  }

  pub async fn create_child(&self, def: BehaviorDef, options: ChildOptions) -> Result<ActorRef, ActorError> {
    self.inner.endpoint.create_child(def, options).await
  }

  /// Requests destruction; resolves when the subtree rooted here is fully
  /// destroyed. Idempotent.
  pub async fn destroy(&self) -> Result<(), ActorError> {
    self.inner.endpoint.destroy().await
  }

  /// Weak parent lookup through the system directory.
  pub fn parent(&self) -> Option<ActorRef> {
    let parent_id = self.inner.parent_id.as_ref()?;
    self.inner.system.directory().get(parent_id)
  }

  pub fn is_alive(&self) -> bool {
    self.inner.endpoint.is_alive()
  }

  pub(crate) fn state_watch(&self) -> watch::Receiver<ActorState> {
    self.inner.endpoint.state_watch()
  }

  pub(crate) async fn deliver_raw(&self, delivery: Delivery) -> Result<(), ActorError> {
    self.inner.endpoint.deliver(delivery).await
  }

  /// Ownership list of the backing in-process cell, for hosting code that
  /// links actors under a local root.
  pub(crate) fn children_list(&self) -> Option<std::sync::Arc<tokio::sync::Mutex<Vec<ActorRef>>>> {
    self.inner.endpoint.cell().map(|cell| cell.children.clone())
  }
}

impl Debug for ActorRef {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ActorRef")
      .field("id", &self.inner.id)
      .field("mode", &self.inner.mode)
      .finish()
  }
}
