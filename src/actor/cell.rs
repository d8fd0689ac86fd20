use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch, Mutex};

use crate::actor::context::ActorContext;
use crate::actor::core_types::{ActorId, ActorState, ChildOptions, Mode};
use crate::actor::endpoint::Endpoint;
use crate::actor::reference::ActorRef;
use crate::behavior::{Behavior, BehaviorDef};
use crate::error::ActorError;
use crate::message::Delivery;
use crate::remote;
use crate::router;
use crate::system::ActorSystem;

pub(crate) enum Control {
  Stop { ack: oneshot::Sender<()> },
}

/// State shared between an in-memory actor's task, its endpoint and its
/// context: identity, lifecycle watch, the mailbox senders and the owned
/// children.
pub(crate) struct CellShared {
  pub id: ActorId,
  pub name: String,
  pub parent_id: Option<ActorId>,
  pub state: watch::Sender<ActorState>,
  pub user_tx: mpsc::UnboundedSender<Delivery>,
  pub ctrl_tx: mpsc::UnboundedSender<Control>,
  pub children: Arc<Mutex<Vec<ActorRef>>>,
}

impl Debug for CellShared {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CellShared")
      .field("id", &self.id)
      .field("name", &self.name)
      .field("state", &*self.state.borrow())
      .finish()
  }
}

/// Where a new actor hangs in the supervision tree: the logical parent id
/// (what `parent()` resolves) and the ownership list the new ref joins.
/// Hosted actors in a worker process link under the worker root while their
/// logical parent lives across the connection.
#[derive(Clone)]
pub(crate) struct ParentLink {
  pub id: ActorId,
  pub children: Arc<Mutex<Vec<ActorRef>>>,
}

/// Entry point for all placements. Cluster options win first, then the
/// placement mode picks the endpoint.
pub(crate) async fn spawn_actor(
  system: &ActorSystem,
  link: Option<ParentLink>,
  def: BehaviorDef,
  options: ChildOptions,
) -> Result<ActorRef, ActorError> {
  options.validate()?;
  if options.cluster_size.is_some() {
    return Box::pin(router::spawn_router(system, link, def, options)).await;
  }
  match options.mode {
    Mode::InMemory => spawn_local(system, link, def, options).await,
    Mode::Forked => remote::fork::spawn_forked(system, link, def, options).await,
    Mode::Remote => remote::spawn_remote(system, link, def, options).await,
  }
}

pub(crate) async fn spawn_local(
  system: &ActorSystem,
  link: Option<ParentLink>,
  def: BehaviorDef,
  options: ChildOptions,
) -> Result<ActorRef, ActorError> {
  let local = def.resolve()?;

  let mut injected = Vec::with_capacity(local.dependencies.len());
  for dependency in &local.dependencies {
    let resource = system.resources().resolve(dependency).await.map_err(|_| {
      ActorError::InjectionFailure {
        behavior: local.name.clone(),
        resource: dependency.clone(),
      }
    })?;
    injected.push(resource);
  }
  let behavior = (local.produce)(&injected).map_err(ActorError::InitFailure)?;

  let id = system.allocate_actor_id();
  let (user_tx, user_rx) = mpsc::unbounded_channel();
  let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
  let (state, _) = watch::channel(ActorState::Constructed);
  let shared = Arc::new(CellShared {
    id: id.clone(),
    name: local.name.clone(),
    parent_id: link.as_ref().map(|link| link.id.clone()),
    state,
    user_tx,
    ctrl_tx,
    children: Arc::new(Mutex::new(Vec::new())),
  });

  let log = system.logger().handle(&local.name);
  let endpoint = Arc::new(LocalEndpoint {
    system: system.clone(),
    shared: shared.clone(),
  });
  let actor_ref = ActorRef::new(
    id.clone(),
    Mode::InMemory,
    endpoint,
    log.clone(),
    system.clone(),
    shared.parent_id.clone(),
    options.custom_properties.clone(),
  );
  system.directory().register(actor_ref.clone());

  let ctx = ActorContext::new(system.clone(), shared.clone(), log);
  let (init_tx, init_rx) = oneshot::channel();
  let parent_children = link.as_ref().map(|link| link.children.clone());
  tokio::spawn(run_cell(behavior, ctx, shared, user_rx, ctrl_rx, init_tx, parent_children.clone()));

  match init_rx.await {
    Ok(Ok(())) => {}
    Ok(Err(error)) => {
      system.directory().unregister(&id);
      return Err(error);
    }
    Err(_) => {
      system.directory().unregister(&id);
      return Err(ActorError::delivery("actor task ended before initialization completed"));
    }
  }

  if let Some(link) = link {
    link.children.lock().await.push(actor_ref.clone());
  }
  Ok(actor_ref)
}

async fn run_cell(
  mut behavior: Box<dyn Behavior>,
  ctx: ActorContext,
  shared: Arc<CellShared>,
  mut user_rx: mpsc::UnboundedReceiver<Delivery>,
  mut ctrl_rx: mpsc::UnboundedReceiver<Control>,
  init_ack: oneshot::Sender<Result<(), ActorError>>,
  parent_children: Option<Arc<Mutex<Vec<ActorRef>>>>,
) {
  shared.state.send_replace(ActorState::Initializing);
  if let Err(reason) = behavior.initialize(&ctx).await {
    ctx.log().error(format!("initialize failed: {}", reason));
    user_rx.close();
    while let Ok(delivery) = user_rx.try_recv() {
      delivery.fail(ActorError::delivery("actor failed to initialize"));
    }
    let children: Vec<ActorRef> = shared.children.lock().await.clone();
    for child in children {
      let _ = child.destroy().await;
    }
    shared.state.send_replace(ActorState::Destroyed);
    ctx.system().directory().unregister(&shared.id);
    let _ = init_ack.send(Err(ActorError::InitFailure(reason)));
    return;
  }
  shared.state.send_replace(ActorState::Ready);
  let _ = init_ack.send(Ok(()));

  let mut stop_acks = Vec::new();
  loop {
    tokio::select! {
      biased;
      control = ctrl_rx.recv() => {
        match control {
          Some(Control::Stop { ack }) => {
            stop_acks.push(ack);
            break;
          }
          None => break,
        }
      }
      delivery = user_rx.recv() => {
        match delivery {
          Some(delivery) => process_delivery(behavior.as_mut(), &ctx, delivery).await,
          None => break,
        }
      }
    }
  }

  shared.state.send_replace(ActorState::Destroying);
  user_rx.close();
  while let Ok(delivery) = user_rx.try_recv() {
    delivery.fail(ActorError::delivery("actor destroyed before the message was processed"));
  }

  let children: Vec<ActorRef> = shared.children.lock().await.clone();
  for child in children {
    if let Err(error) = child.destroy().await {
      ctx.log().error(format!("child {} destroy failed: {}", child.id(), error));
    }
  }

  if let Err(reason) = behavior.destroy(&ctx).await {
    ctx.log().error(format!("destroy hook failed: {}", reason));
  }

  shared.state.send_replace(ActorState::Destroyed);
  ctx.system().directory().unregister(&shared.id);
  if let Some(parent_children) = parent_children {
    parent_children.lock().await.retain(|sibling| sibling.id() != &shared.id);
  }

  ctrl_rx.close();
  for ack in stop_acks {
    let _ = ack.send(());
  }
  while let Ok(Control::Stop { ack }) = ctrl_rx.try_recv() {
    let _ = ack.send(());
  }
}

async fn process_delivery(behavior: &mut dyn Behavior, ctx: &ActorContext, delivery: Delivery) {
  let Delivery { topic, payload, reply } = delivery;
  match behavior.handle(&topic, payload, ctx).await {
    Ok(value) => {
      if let Some(reply) = reply {
        let _ = reply.send(Ok(value));
      }
    }
    Err(reason) => {
      match reply {
        Some(reply) => {
          let _ = reply.send(Err(ActorError::HandlerFailure(reason)));
        }
        None => ctx.log().error(format!("handler for {} failed: {}", topic, reason)),
      }
    }
  }
}

/// Endpoint for an actor living in this process: direct access to the
/// mailbox channels and the lifecycle watch.
pub(crate) struct LocalEndpoint {
  pub system: ActorSystem,
  pub shared: Arc<CellShared>,
}

impl Debug for LocalEndpoint {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("LocalEndpoint").field("id", &self.shared.id).finish()
  }
}

#[async_trait]
impl Endpoint for LocalEndpoint {
  async fn deliver(&self, delivery: Delivery) -> Result<(), ActorError> {
    if *self.shared.state.borrow() >= ActorState::Destroying {
      return Err(ActorError::StaleReference(self.shared.id.clone()));
    }
    self
      .shared
      .user_tx
      .send(delivery)
      .map_err(|_| ActorError::StaleReference(self.shared.id.clone()))
  }

  async fn destroy(&self) -> Result<(), ActorError> {
    let mut state = self.shared.state.subscribe();
    if *state.borrow() == ActorState::Destroyed {
      return Ok(());
    }
    let (ack_tx, ack_rx) = oneshot::channel();
    if self.shared.ctrl_tx.send(Control::Stop { ack: ack_tx }).is_ok() && ack_rx.await.is_ok() {
      return Ok(());
    }
    while *state.borrow() != ActorState::Destroyed {
      if state.changed().await.is_err() {
        break;
      }
    }
    Ok(())
  }

  async fn create_child(&self, def: BehaviorDef, options: ChildOptions) -> Result<ActorRef, ActorError> {
    if *self.shared.state.borrow() >= ActorState::Destroying {
      return Err(ActorError::StaleReference(self.shared.id.clone()));
    }
    let link = ParentLink {
      id: self.shared.id.clone(),
      children: self.shared.children.clone(),
    };
    spawn_actor(&self.system, Some(link), def, options).await
  }

  fn state_watch(&self) -> watch::Receiver<ActorState> {
    self.shared.state.subscribe()
  }

  fn cell(&self) -> Option<&Arc<CellShared>> {
    Some(&self.shared)
  }
}

/// Empty behavior used for the synthesized root when no root behavior is
/// configured.
pub(crate) struct EmptyBehavior {
  name: String,
}

impl EmptyBehavior {
  pub fn new(name: impl Into<String>) -> Self {
    EmptyBehavior { name: name.into() }
  }
}

#[async_trait]
impl Behavior for EmptyBehavior {
  fn name(&self) -> &str {
    &self.name
  }

  async fn handle(&mut self, _topic: &str, _payload: Value, _ctx: &ActorContext) -> Result<Value, crate::error::ErrorReason> {
    Ok(Value::Null)
  }
}
