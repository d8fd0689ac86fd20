use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::watch;

use crate::actor::cell::CellShared;
use crate::actor::core_types::{ActorState, ChildOptions};
use crate::actor::reference::ActorRef;
use crate::behavior::BehaviorDef;
use crate::error::ActorError;
use crate::message::Delivery;

/// What an `ActorRef` routes through: an in-memory mailbox, a framed
/// channel to another process, or a router. The ref stays one thin type;
/// placement differences live entirely behind this trait.
#[async_trait]
pub(crate) trait Endpoint: Debug + Send + Sync + 'static {
  /// Accepts a delivery. Resolution means acceptance, not processing.
  async fn deliver(&self, delivery: Delivery) -> Result<(), ActorError>;

  /// Requests destruction of the target and its subtree; resolves once the
  /// subtree is fully destroyed.
  async fn destroy(&self) -> Result<(), ActorError>;

  async fn create_child(&self, def: BehaviorDef, options: ChildOptions) -> Result<ActorRef, ActorError>;

  /// Lifecycle observation; `Destroyed` doubles as the death signal for
  /// crash detection.
  fn state_watch(&self) -> watch::Receiver<ActorState>;

  /// The backing in-process cell, when there is one. Hosting code uses it
  /// to link actors under a local root on behalf of a remote parent.
  fn cell(&self) -> Option<&Arc<CellShared>> {
    None
  }

  fn is_alive(&self) -> bool {
    *self.state_watch().borrow() < ActorState::Destroying
  }

  async fn request(&self, topic: &str, payload: Value) -> Result<Value, ActorError> {
    let (delivery, rx) = Delivery::request(topic, payload);
    self.deliver(delivery).await?;
    rx.await
      .map_err(|_| ActorError::delivery("reply channel closed before a response arrived"))?
  }

  /// Non-router refs treat broadcast as a plain send.
  async fn broadcast(&self, topic: &str, payload: Value) -> Result<(), ActorError> {
    self.deliver(Delivery::fire_and_forget(topic, payload)).await
  }

  async fn broadcast_and_receive(&self, topic: &str, payload: Value) -> Result<Vec<Value>, ActorError> {
    let value = self.request(topic, payload).await?;
    Ok(vec![value])
  }

  /// The `metrics` topic, with an absent handler reading as an empty
  /// record. Routers override this with per-replica aggregation.
  async fn metrics(&self) -> Result<Value, ActorError> {
    let value = self.request("metrics", Value::Null).await?;
    Ok(empty_record_when_null(value))
  }
}

pub(crate) fn empty_record_when_null(value: Value) -> Value {
  match value {
    Value::Null => Value::Object(Map::new()),
    other => other,
  }
}
