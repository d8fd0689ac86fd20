use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::ActorError;

pub type ReplySender = oneshot::Sender<Result<Value, ActorError>>;
pub type ReplyReceiver = oneshot::Receiver<Result<Value, ActorError>>;

/// One message in flight: a string topic, an opaque payload and, for
/// request/response calls, the handle the reply travels back on. A delivery
/// without a reply handle is fire-and-forget.
#[derive(Debug)]
pub struct Delivery {
  pub topic: String,
  pub payload: Value,
  pub reply: Option<ReplySender>,
}

impl Delivery {
  pub fn fire_and_forget(topic: impl Into<String>, payload: Value) -> Self {
    Delivery {
      topic: topic.into(),
      payload,
      reply: None,
    }
  }

  pub fn request(topic: impl Into<String>, payload: Value) -> (Self, ReplyReceiver) {
    let (tx, rx) = oneshot::channel();
    let delivery = Delivery {
      topic: topic.into(),
      payload,
      reply: Some(tx),
    };
    (delivery, rx)
  }

  pub fn expects_reply(&self) -> bool {
    self.reply.is_some()
  }

  /// Completes the caller side, if anyone is waiting.
  pub fn respond(self, result: Result<Value, ActorError>) {
    if let Some(reply) = self.reply {
      let _ = reply.send(result);
    }
  }

  pub fn fail(self, error: ActorError) {
    self.respond(Err(error));
  }
}
