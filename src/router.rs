use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Number, Value};
use tokio::sync::{watch, Mutex};

use crate::actor::cell::{spawn_actor, ParentLink};
use crate::actor::core_types::{ActorId, ActorState, ChildOptions, OnCrash};
use crate::actor::endpoint::{empty_record_when_null, Endpoint};
use crate::actor::reference::ActorRef;
use crate::behavior::BehaviorDef;
use crate::error::ActorError;
use crate::message::Delivery;
use crate::system::ActorSystem;

pub mod balancer;

#[cfg(test)]
mod balancer_test;

use self::balancer::{Balancer, ForwardTarget, DEFAULT_BALANCER};

struct RouterShared {
  system: ActorSystem,
  id: ActorId,
  replicas: Arc<Mutex<Vec<ActorRef>>>,
  balancer: Mutex<Box<dyn Balancer>>,
  def: BehaviorDef,
  replica_options: ChildOptions,
  respawn: bool,
  state: watch::Sender<ActorState>,
  destroying: AtomicBool,
  parent_children: Option<Arc<Mutex<Vec<ActorRef>>>>,
}

impl Debug for RouterShared {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("RouterShared")
      .field("id", &self.id)
      .field("state", &*self.state.borrow())
      .finish()
  }
}

/// A synthetic actor fronting N replicas. It has no mailbox of its own:
/// routable deliveries go through the balancer, broadcasts fan out to the
/// whole set, and replica death feeds crash handling.
pub(crate) struct RouterEndpoint {
  shared: Arc<RouterShared>,
}

impl Debug for RouterEndpoint {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("RouterEndpoint").field("id", &self.shared.id).finish()
  }
}

pub(crate) async fn spawn_router(
  system: &ActorSystem,
  link: Option<ParentLink>,
  def: BehaviorDef,
  options: ChildOptions,
) -> Result<ActorRef, ActorError> {
  let cluster_size = options.cluster_size.unwrap_or(1);
  let balancer_name = options.balancer.clone().unwrap_or_else(|| DEFAULT_BALANCER.to_string());
  let balancer = system.balancers().create(&balancer_name)?;

  let id = system.allocate_actor_id();
  let replicas = Arc::new(Mutex::new(Vec::new()));
  let replica_options = options.replica_options();
  let (state, _) = watch::channel(ActorState::Constructed);
  let shared = Arc::new(RouterShared {
    system: system.clone(),
    id: id.clone(),
    replicas: replicas.clone(),
    balancer: Mutex::new(balancer),
    def: def.clone(),
    replica_options: replica_options.clone(),
    respawn: options.on_crash == OnCrash::Respawn,
    state,
    destroying: AtomicBool::new(false),
    parent_children: link.as_ref().map(|link| link.children.clone()),
  });

  for _ in 0..cluster_size {
    let replica_link = ParentLink {
      id: id.clone(),
      children: replicas.clone(),
    };
    if let Err(error) = spawn_actor(system, Some(replica_link), def.clone(), replica_options.clone()).await {
      let created: Vec<ActorRef> = replicas.lock().await.clone();
      for replica in created {
        let _ = replica.destroy().await;
      }
      return Err(error);
    }
  }

  shared.state.send_replace(ActorState::Ready);

  let initial: Vec<ActorRef> = replicas.lock().await.clone();
  shared.balancer.lock().await.cluster_changed(&initial).await;
  for replica in &initial {
    monitor_replica(shared.clone(), replica.clone());
  }

  let log = system.logger().handle(def.name());
  let endpoint = Arc::new(RouterEndpoint { shared });
  let actor_ref = ActorRef::new(
    id,
    options.mode,
    endpoint,
    log,
    system.clone(),
    link.as_ref().map(|link| link.id.clone()),
    options.custom_properties.clone(),
  );
  system.directory().register(actor_ref.clone());
  if let Some(link) = link {
    link.children.lock().await.push(actor_ref.clone());
  }
  Ok(actor_ref)
}

/// Watches one replica's lifecycle; a transition to `Destroyed` that the
/// router did not initiate is a crash.
fn monitor_replica(shared: Arc<RouterShared>, replica: ActorRef) {
  tokio::spawn(async move {
    let mut state = replica.state_watch();
    while *state.borrow() != ActorState::Destroyed {
      if state.changed().await.is_err() {
        break;
      }
    }
    handle_replica_death(shared, replica).await;
  });
}

async fn handle_replica_death(shared: Arc<RouterShared>, dead: ActorRef) {
  if shared.destroying.load(Ordering::SeqCst) {
    return;
  }
  let survivors: Vec<ActorRef> = {
    let mut replicas = shared.replicas.lock().await;
    replicas.retain(|replica| replica.id() != dead.id());
    replicas.clone()
  };
  tracing::warn!(router = %shared.id, replica = %dead.id(), "replica died, rebalancing over {} survivors", survivors.len());
  shared.balancer.lock().await.cluster_changed(&survivors).await;

  if !shared.respawn {
    return;
  }
  let replacement_link = ParentLink {
    id: shared.id.clone(),
    children: shared.replicas.clone(),
  };
  match spawn_actor(
    &shared.system,
    Some(replacement_link),
    shared.def.clone(),
    shared.replica_options.clone(),
  )
  .await
  {
    Ok(replacement) => {
      if shared.destroying.load(Ordering::SeqCst) {
        let _ = replacement.destroy().await;
        return;
      }
      let current: Vec<ActorRef> = shared.replicas.lock().await.clone();
      shared.balancer.lock().await.cluster_changed(&current).await;
      monitor_replica(shared.clone(), replacement);
    }
    Err(error) => {
      tracing::error!(router = %shared.id, error = %error, "failed to respawn replica");
    }
  }
}

impl RouterEndpoint {
  async fn select(&self, topic: &str, payload: &Value) -> Result<ActorRef, ActorError> {
    let snapshot: Vec<ActorRef> = self.shared.replicas.lock().await.clone();
    if snapshot.is_empty() {
      return Err(ActorError::NoRoutableChild);
    }
    let target = self.shared.balancer.lock().await.forward(topic, payload).await;
    match target {
      Some(ForwardTarget::Id(id)) => snapshot
        .iter()
        .find(|replica| replica.id().as_str() == id)
        .cloned()
        .ok_or(ActorError::NoRoutableChild),
      Some(ForwardTarget::Ref(actor_ref)) => Ok(actor_ref),
      None => Err(ActorError::NoRoutableChild),
    }
  }

  async fn snapshot(&self) -> Vec<ActorRef> {
    self.shared.replicas.lock().await.clone()
  }
}

#[async_trait]
impl Endpoint for RouterEndpoint {
  async fn deliver(&self, delivery: Delivery) -> Result<(), ActorError> {
    if self.shared.destroying.load(Ordering::SeqCst) {
      return Err(ActorError::StaleReference(self.shared.id.clone()));
    }
    let replica = self.select(&delivery.topic, &delivery.payload).await?;
    replica.deliver_raw(delivery).await
  }

  async fn destroy(&self) -> Result<(), ActorError> {
    if self.shared.destroying.swap(true, Ordering::SeqCst) {
      let mut state = self.shared.state.subscribe();
      while *state.borrow() != ActorState::Destroyed {
        if state.changed().await.is_err() {
          break;
        }
      }
      return Ok(());
    }
    self.shared.state.send_replace(ActorState::Destroying);
    let replicas = self.snapshot().await;
    for replica in replicas {
      if let Err(error) = replica.destroy().await {
        tracing::error!(router = %self.shared.id, error = %error, "replica destroy failed");
      }
    }
    self.shared.state.send_replace(ActorState::Destroyed);
    self.shared.system.directory().unregister(&self.shared.id);
    if let Some(parent_children) = &self.shared.parent_children {
      parent_children.lock().await.retain(|sibling| sibling.id() != &self.shared.id);
    }
    Ok(())
  }

  async fn create_child(&self, _def: BehaviorDef, _options: ChildOptions) -> Result<ActorRef, ActorError> {
    Err(ActorError::config("cannot create a child under a router reference"))
  }

  fn state_watch(&self) -> watch::Receiver<ActorState> {
    self.shared.state.subscribe()
  }

  async fn broadcast(&self, topic: &str, payload: Value) -> Result<(), ActorError> {
    for replica in self.snapshot().await {
      replica.deliver_raw(Delivery::fire_and_forget(topic, payload.clone())).await?;
    }
    Ok(())
  }

  async fn broadcast_and_receive(&self, topic: &str, payload: Value) -> Result<Vec<Value>, ActorError> {
    let replicas = self.snapshot().await;
    let mut receivers = Vec::with_capacity(replicas.len());
    for replica in &replicas {
      let (delivery, rx) = Delivery::request(topic, payload.clone());
      replica.deliver_raw(delivery).await?;
      receivers.push(rx);
    }
    let mut replies = Vec::with_capacity(receivers.len());
    for rx in receivers {
      let reply = rx
        .await
        .map_err(|_| ActorError::delivery("reply channel closed before a response arrived"))??;
      replies.push(reply);
    }
    Ok(replies)
  }

  /// Per-replica metrics keyed by replica index, plus a `summary` entry
  /// holding the field-wise sum of numeric fields.
  async fn metrics(&self) -> Result<Value, ActorError> {
    let replicas = self.snapshot().await;
    let mut result = Map::new();
    let mut summary = Map::new();
    for (index, replica) in replicas.iter().enumerate() {
      let record = empty_record_when_null(replica.send_and_receive("metrics", Value::Null).await?);
      if let Value::Object(fields) = &record {
        for (key, value) in fields {
          add_numeric(&mut summary, key, value);
        }
      }
      result.insert(index.to_string(), record);
    }
    result.insert("summary".to_string(), Value::Object(summary));
    Ok(Value::Object(result))
  }
}

fn add_numeric(summary: &mut Map<String, Value>, key: &str, value: &Value) {
  let Some(number) = value.as_number() else {
    return;
  };
  let updated = match summary.get(key).and_then(Value::as_number) {
    Some(existing) => sum_numbers(existing, number),
    None => Some(number.clone()),
  };
  if let Some(updated) = updated {
    summary.insert(key.to_string(), Value::Number(updated));
  }
}

fn sum_numbers(a: &Number, b: &Number) -> Option<Number> {
  if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
    return Some(Number::from(a + b));
  }
  Number::from_f64(a.as_f64()? + b.as_f64()?)
}
