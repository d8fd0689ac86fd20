use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::actor::core_types::ChildOptions;
use crate::error::ActorError;
use crate::logging::{LogLevel, LoggerSpec};

/// Wire messages. Requests carry a sequence number the reply echoes;
/// both directions may originate requests (a hosted child calls back to
/// its parent over the same connection).
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub(crate) enum Frame {
  /// First frame on a hosting connection: materialize an actor for the
  /// given registered behavior. Carries the logger identifier and the
  /// bootstrap directive; neither logger instances nor behavior objects
  /// ever travel.
  Spawn {
    seq: u64,
    behavior: String,
    options: ChildOptions,
    logger: LoggerSpec,
    categories: HashMap<String, LogLevel>,
    test: bool,
    bootstrap: Option<String>,
    parent: String,
  },
  Request {
    seq: u64,
    target: String,
    topic: String,
    payload: Value,
    expect_reply: bool,
  },
  CreateChild {
    seq: u64,
    parent: String,
    behavior: String,
    options: ChildOptions,
  },
  Destroy {
    seq: u64,
    target: String,
  },
  Reply {
    seq: u64,
    result: WireResult,
  },
}

/// Reply body: a payload or a kind-tagged error descriptor.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) enum WireResult {
  Ok(Value),
  Err(ActorError),
}

impl From<Result<Value, ActorError>> for WireResult {
  fn from(result: Result<Value, ActorError>) -> Self {
    match result {
      Ok(value) => WireResult::Ok(value),
      Err(error) => WireResult::Err(error),
    }
  }
}

impl From<WireResult> for Result<Value, ActorError> {
  fn from(result: WireResult) -> Self {
    match result {
      WireResult::Ok(value) => Ok(value),
      WireResult::Err(error) => Err(error),
    }
  }
}
