use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::actor::ActorId;

/// User-originated failure payload. Carried by the *init failure* and
/// *handler failure* error kinds and across process boundaries on the reply
/// path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorReason(String);

impl ErrorReason {
  pub fn new(message: impl Into<String>) -> Self {
    ErrorReason(message.into())
  }

  pub fn message(&self) -> &str {
    &self.0
  }
}

impl Display for ErrorReason {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl From<&str> for ErrorReason {
  fn from(value: &str) -> Self {
    ErrorReason(value.to_string())
  }
}

impl From<String> for ErrorReason {
  fn from(value: String) -> Self {
    ErrorReason(value)
  }
}

/// Every error the runtime surfaces to callers. One variant per user-visible
/// error kind; message prefixes are part of the contract and are kept stable.
/// Serializable because reply frames carry failures across process
/// boundaries as a kind-tagged descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActorError {
  #[error("invalid configuration: {0}")]
  InvalidConfig(String),
  #[error("unknown resource: {0}")]
  UnknownResource(String),
  #[error("duplicate resource: {0}")]
  DuplicateResource(String),
  #[error("injection failure: behavior {behavior} depends on unknown resource {resource}")]
  InjectionFailure { behavior: String, resource: String },
  #[error("init failure: {0}")]
  InitFailure(ErrorReason),
  #[error("stale reference: {0}")]
  StaleReference(ActorId),
  #[error("delivery failure: {0}")]
  DeliveryFailure(String),
  // An empty forward and an unknown replica id must be indistinguishable to
  // callers, so this variant carries no detail.
  #[error("no routable child")]
  NoRoutableChild,
  #[error("handler failure: {0}")]
  HandlerFailure(ErrorReason),
}

impl ActorError {
  pub fn handler(reason: impl Into<ErrorReason>) -> Self {
    ActorError::HandlerFailure(reason.into())
  }

  pub fn delivery(message: impl Into<String>) -> Self {
    ActorError::DeliveryFailure(message.into())
  }

  pub fn config(message: impl Into<String>) -> Self {
    ActorError::InvalidConfig(message.into())
  }
}
