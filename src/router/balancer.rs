use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde_json::Value;

use crate::actor::ActorRef;
use crate::error::ActorError;

/// What `forward` may hand back: a replica id, or a ref directly.
#[derive(Debug, Clone)]
pub enum ForwardTarget {
  Id(String),
  Ref(ActorRef),
}

/// Pluggable replica-selection strategy. `cluster_changed` fires once per
/// membership change with the surviving replicas in insertion order;
/// `forward` picks the destination for one routable delivery. Returning
/// `None`, or an id outside the current set, fails the delivery with
/// *no routable child*.
#[async_trait]
pub trait Balancer: Debug + Send + Sync + 'static {
  async fn cluster_changed(&mut self, _replicas: &[ActorRef]) {}

  async fn forward(&mut self, topic: &str, payload: &Value) -> Option<ForwardTarget>;
}

/// Default strategy: index modulo the current replica count, advanced
/// after each forward. Over K deliveries to N replicas every replica gets
/// either ceil(K/N) or floor(K/N).
#[derive(Debug, Default)]
pub struct RoundRobinBalancer {
  ids: Vec<String>,
  next: usize,
}

impl RoundRobinBalancer {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl Balancer for RoundRobinBalancer {
  async fn cluster_changed(&mut self, replicas: &[ActorRef]) {
    self.ids = replicas.iter().map(|replica| replica.id().to_string()).collect();
  }

  async fn forward(&mut self, _topic: &str, _payload: &Value) -> Option<ForwardTarget> {
    if self.ids.is_empty() {
      return None;
    }
    let index = self.next % self.ids.len();
    self.next = index + 1;
    Some(ForwardTarget::Id(self.ids[index].clone()))
  }
}

/// Uniform selection over the current replicas. Seeded deterministically
/// when the system runs with the `test` flag.
pub struct RandomBalancer {
  ids: Vec<String>,
  rng: StdRng,
}

impl RandomBalancer {
  pub fn new(seed: Option<u64>) -> Self {
    let rng = match seed {
      Some(seed) => StdRng::seed_from_u64(seed),
      None => StdRng::from_entropy(),
    };
    RandomBalancer { ids: Vec::new(), rng }
  }
}

impl Debug for RandomBalancer {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("RandomBalancer").field("ids", &self.ids).finish()
  }
}

#[async_trait]
impl Balancer for RandomBalancer {
  async fn cluster_changed(&mut self, replicas: &[ActorRef]) {
    self.ids = replicas.iter().map(|replica| replica.id().to_string()).collect();
  }

  async fn forward(&mut self, _topic: &str, _payload: &Value) -> Option<ForwardTarget> {
    self.ids.choose(&mut self.rng).cloned().map(ForwardTarget::Id)
  }
}

pub type BalancerFactory = Arc<dyn Fn() -> Box<dyn Balancer> + Send + Sync>;

pub const DEFAULT_BALANCER: &str = "roundrobin";

/// Per-system registry of balancer classes: the built-ins plus whatever
/// the configuration registered by name.
#[derive(Clone)]
pub struct BalancerRegistry {
  factories: Arc<DashMap<String, BalancerFactory>>,
}

impl BalancerRegistry {
  pub(crate) fn with_builtins(random_seed: Option<u64>) -> Self {
    let registry = BalancerRegistry {
      factories: Arc::new(DashMap::new()),
    };
    registry.register(DEFAULT_BALANCER, Arc::new(|| Box::new(RoundRobinBalancer::new())));
    registry.register("random", Arc::new(move || Box::new(RandomBalancer::new(random_seed))));
    registry
  }

  pub fn register(&self, name: impl Into<String>, factory: BalancerFactory) {
    self.factories.insert(name.into(), factory);
  }

  pub fn create(&self, name: &str) -> Result<Box<dyn Balancer>, ActorError> {
    match self.factories.get(name) {
      Some(factory) => Ok(factory()),
      None => Err(ActorError::config(format!("balancer {} is not registered", name))),
    }
  }
}

impl Debug for BalancerRegistry {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let names: Vec<String> = self.factories.iter().map(|entry| entry.key().clone()).collect();
    f.debug_struct("BalancerRegistry").field("names", &names).finish()
  }
}
