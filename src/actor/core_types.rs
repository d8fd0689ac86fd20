use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ActorError;

/// Process-unique opaque actor identity. The embedded node fragment keeps
/// ids from colliding across the systems a wire connection bridges.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
  pub(crate) fn new(node: &str, seq: u64) -> Self {
    ActorId(format!("actor-{}-{}", node, seq))
  }

  pub(crate) fn from_wire(raw: String) -> Self {
    ActorId(raw)
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl Display for ActorId {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Lifecycle states, ordered. Anything at `Destroying` or beyond rejects
/// new deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ActorState {
  Constructed,
  Initializing,
  Ready,
  Destroying,
  Destroyed,
}

/// Where an actor physically runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
  #[default]
  InMemory,
  Forked,
  Remote,
}

impl Display for Mode {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let text = match self {
      Mode::InMemory => "in-memory",
      Mode::Forked => "forked",
      Mode::Remote => "remote",
    };
    write!(f, "{}", text)
  }
}

/// What happens when a clustered replica dies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OnCrash {
  #[default]
  None,
  Respawn,
}

/// Options accepted by `create_child`. Serializable because forked and
/// remote placement forward them in the spawn frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ChildOptions {
  pub mode: Mode,
  /// Target `host:port` for remote placement.
  pub host: Option<String>,
  /// Present -> a router fronts this many replicas, even when it is 1.
  pub cluster_size: Option<usize>,
  /// Balancer name resolved through the system registry; `roundrobin`
  /// when unset.
  pub balancer: Option<String>,
  pub on_crash: OnCrash,
  /// Opaque bag surfaced on the ref for balancer plugins.
  pub custom_properties: Option<Value>,
}

impl ChildOptions {
  pub fn with_mode(mut self, mode: Mode) -> Self {
    self.mode = mode;
    self
  }

  pub fn with_host(mut self, host: impl Into<String>) -> Self {
    self.host = Some(host.into());
    self
  }

  pub fn with_cluster_size(mut self, size: usize) -> Self {
    self.cluster_size = Some(size);
    self
  }

  pub fn with_balancer(mut self, name: impl Into<String>) -> Self {
    self.balancer = Some(name.into());
    self
  }

  pub fn with_on_crash(mut self, on_crash: OnCrash) -> Self {
    self.on_crash = on_crash;
    self
  }

  pub fn with_custom_properties(mut self, properties: Value) -> Self {
    self.custom_properties = Some(properties);
    self
  }

  pub(crate) fn validate(&self) -> Result<(), ActorError> {
    if let Some(0) = self.cluster_size {
      return Err(ActorError::config("cluster size must be at least 1"));
    }
    if self.mode == Mode::Remote && self.host.is_none() {
      return Err(ActorError::config("remote placement requires a host"));
    }
    Ok(())
  }

  /// The options one replica (or a plain child) is spawned with once the
  /// router has consumed the cluster-level fields.
  pub(crate) fn replica_options(&self) -> ChildOptions {
    ChildOptions {
      mode: self.mode,
      host: self.host.clone(),
      cluster_size: None,
      balancer: None,
      on_crash: OnCrash::None,
      custom_properties: self.custom_properties.clone(),
    }
  }
}
