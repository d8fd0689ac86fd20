use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use serde_json::Value;

use crate::actor::ActorContext;
use crate::error::{ActorError, ErrorReason};
use crate::resources::Resource;

/// The user-facing contract of an actor. Handlers are addressed by string
/// topic; a topic the behavior does not recognize is a no-op returning
/// `Value::Null`, which is what the router's metrics aggregation relies on
/// for replicas without a `metrics` handler.
#[async_trait]
pub trait Behavior: Send + 'static {
  /// Category name, used for logger gating and diagnostics.
  fn name(&self) -> &str;

  async fn initialize(&mut self, _ctx: &ActorContext) -> Result<(), ErrorReason> {
    Ok(())
  }

  async fn handle(&mut self, topic: &str, payload: Value, ctx: &ActorContext) -> Result<Value, ErrorReason>;

  async fn destroy(&mut self, _ctx: &ActorContext) -> Result<(), ErrorReason> {
    Ok(())
  }
}

type HandlerFn = Arc<dyn Fn(Value, ActorContext) -> BoxFuture<'static, Result<Value, ErrorReason>> + Send + Sync>;
type HookFn = Arc<dyn Fn(ActorContext) -> BoxFuture<'static, Result<(), ErrorReason>> + Send + Sync>;

/// Behavior assembled from a table of topic handlers. This is the "record
/// of methods" definition style; dispatch is an explicit map lookup rather
/// than reflective method resolution.
#[derive(Clone)]
pub struct Handlers {
  name: String,
  init: Option<HookFn>,
  teardown: Option<HookFn>,
  handlers: HashMap<String, HandlerFn>,
}

impl Handlers {
  pub fn new(name: impl Into<String>) -> Self {
    Handlers {
      name: name.into(),
      init: None,
      teardown: None,
      handlers: HashMap::new(),
    }
  }

  pub fn on<F, Fut>(mut self, topic: impl Into<String>, handler: F) -> Self
  where
    F: Fn(Value, ActorContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ErrorReason>> + Send + 'static, {
    self
      .handlers
      .insert(topic.into(), Arc::new(move |payload, ctx| Box::pin(handler(payload, ctx))));
    self
  }

  pub fn on_initialize<F, Fut>(mut self, hook: F) -> Self
  where
    F: Fn(ActorContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ErrorReason>> + Send + 'static, {
    self.init = Some(Arc::new(move |ctx| Box::pin(hook(ctx))));
    self
  }

  pub fn on_destroy<F, Fut>(mut self, hook: F) -> Self
  where
    F: Fn(ActorContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ErrorReason>> + Send + 'static, {
    self.teardown = Some(Arc::new(move |ctx| Box::pin(hook(ctx))));
    self
  }
}

impl Debug for Handlers {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Handlers")
      .field("name", &self.name)
      .field("topics", &self.handlers.keys().collect::<Vec<_>>())
      .finish()
  }
}

#[async_trait]
impl Behavior for Handlers {
  fn name(&self) -> &str {
    &self.name
  }

  async fn initialize(&mut self, ctx: &ActorContext) -> Result<(), ErrorReason> {
    match &self.init {
      Some(hook) => hook(ctx.clone()).await,
      None => Ok(()),
    }
  }

  async fn handle(&mut self, topic: &str, payload: Value, ctx: &ActorContext) -> Result<Value, ErrorReason> {
    match self.handlers.get(topic) {
      Some(handler) => handler(payload, ctx.clone()).await,
      None => Ok(Value::Null),
    }
  }

  async fn destroy(&mut self, ctx: &ActorContext) -> Result<(), ErrorReason> {
    match &self.teardown {
      Some(hook) => hook(ctx.clone()).await,
      None => Ok(()),
    }
  }
}

pub type BehaviorProducer = Arc<dyn Fn(&[Arc<dyn Resource>]) -> Result<Box<dyn Behavior>, ErrorReason> + Send + Sync>;

/// A behavior definition usable only in the process that created it: a
/// name, the resource names to inject, and a factory producing a fresh
/// behavior instance per actor (cluster replicas never share instances).
#[derive(Clone)]
pub struct LocalBehavior {
  pub(crate) name: String,
  pub(crate) dependencies: Vec<String>,
  pub(crate) produce: BehaviorProducer,
}

/// What `create_child` accepts. `Local` definitions work for in-memory
/// placement; forked and remote placement require a `Registered` name,
/// because only the identifier crosses the process boundary.
#[derive(Clone)]
pub enum BehaviorDef {
  Local(LocalBehavior),
  Registered(String),
}

impl BehaviorDef {
  pub fn local<B, F>(name: impl Into<String>, produce: F) -> Self
  where
    B: Behavior,
    F: Fn() -> B + Send + Sync + 'static, {
    BehaviorDef::Local(LocalBehavior {
      name: name.into(),
      dependencies: Vec::new(),
      produce: Arc::new(move |_| Ok(Box::new(produce()))),
    })
  }

  pub fn local_with_dependencies<F>(name: impl Into<String>, dependencies: Vec<String>, produce: F) -> Self
  where
    F: Fn(&[Arc<dyn Resource>]) -> Result<Box<dyn Behavior>, ErrorReason> + Send + Sync + 'static, {
    BehaviorDef::Local(LocalBehavior {
      name: name.into(),
      dependencies,
      produce: Arc::new(produce),
    })
  }

  pub fn registered(name: impl Into<String>) -> Self {
    BehaviorDef::Registered(name.into())
  }

  pub fn name(&self) -> &str {
    match self {
      BehaviorDef::Local(local) => &local.name,
      BehaviorDef::Registered(name) => name,
    }
  }

  /// The name workers resolve, when the definition can travel at all.
  pub(crate) fn registered_name(&self) -> Option<&str> {
    match self {
      BehaviorDef::Registered(name) => Some(name),
      BehaviorDef::Local(_) => None,
    }
  }

  pub(crate) fn resolve(&self) -> Result<LocalBehavior, ActorError> {
    match self {
      BehaviorDef::Local(local) => Ok(local.clone()),
      BehaviorDef::Registered(name) => lookup_behavior(name)
        .ok_or_else(|| ActorError::config(format!("behavior {} is not registered", name))),
    }
  }
}

impl Debug for BehaviorDef {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      BehaviorDef::Local(local) => f.debug_tuple("Local").field(&local.name).finish(),
      BehaviorDef::Registered(name) => f.debug_tuple("Registered").field(name).finish(),
    }
  }
}

static BEHAVIORS: Lazy<DashMap<String, LocalBehavior>> = Lazy::new(DashMap::new);

/// Registers a behavior under a process-wide name so forked and remote
/// workers can reconstruct it. Applications register in `main` before
/// `troupe::init()`; last registration wins.
pub fn register_behavior<B, F>(name: impl Into<String>, produce: F)
where
  B: Behavior,
  F: Fn() -> B + Send + Sync + 'static, {
  let name = name.into();
  BEHAVIORS.insert(
    name.clone(),
    LocalBehavior {
      name,
      dependencies: Vec::new(),
      produce: Arc::new(move |_| Ok(Box::new(produce()))),
    },
  );
}

pub fn register_behavior_with_dependencies<F>(name: impl Into<String>, dependencies: Vec<String>, produce: F)
where
  F: Fn(&[Arc<dyn Resource>]) -> Result<Box<dyn Behavior>, ErrorReason> + Send + Sync + 'static, {
  let name = name.into();
  BEHAVIORS.insert(
    name.clone(),
    LocalBehavior {
      name,
      dependencies,
      produce: Arc::new(produce),
    },
  );
}

pub(crate) fn lookup_behavior(name: &str) -> Option<LocalBehavior> {
  BEHAVIORS.get(name).map(|entry| entry.value().clone())
}
