use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::actor::cell::{spawn_actor, ParentLink};
use crate::actor::core_types::{ActorId, ChildOptions};
use crate::actor::reference::ActorRef;
use crate::behavior::BehaviorDef;
use crate::error::ActorError;
use crate::remote::connection::{Connection, FrameHandler};
use crate::remote::protocol::{Frame, WireResult};
use crate::system::ActorSystem;

/// Serves the hosting side of a connection against a local system: spawn
/// requests land under the local root (with the logical parent across the
/// wire), request frames resolve through the directory, and create-child /
/// destroy frames operate on local refs. The same handler also serves the
/// originating side, where only request frames ever arrive (a hosted child
/// calling back to its parent).
pub(crate) struct HostFrameHandler {
  system: ActorSystem,
  hosted: DashMap<ActorId, ActorRef>,
}

impl HostFrameHandler {
  pub fn new(system: ActorSystem) -> Self {
    HostFrameHandler {
      system,
      hosted: DashMap::new(),
    }
  }

  /// Materializes a hosted actor: linked under the local root for ordered
  /// teardown, logical parent pointing across the connection.
  pub async fn spawn_hosted(&self, behavior: &str, options: ChildOptions, parent: &str) -> Result<ActorRef, ActorError> {
    let root = self.system.root_actor();
    let children = root
      .children_list()
      .ok_or_else(|| ActorError::delivery("hosting system has no local root"))?;
    let link = ParentLink {
      id: ActorId::from_wire(parent.to_string()),
      children,
    };
    let actor_ref = spawn_actor(&self.system, Some(link), BehaviorDef::registered(behavior), options).await?;
    self.hosted.insert(actor_ref.id().clone(), actor_ref.clone());
    Ok(actor_ref)
  }

  /// Tears down every actor this connection spawned. Used by listen-mode
  /// servers when a client disconnects; workers tear down their whole
  /// system instead.
  pub async fn destroy_hosted(&self) {
    let refs: Vec<ActorRef> = self.hosted.iter().map(|entry| entry.value().clone()).collect();
    self.hosted.clear();
    for actor_ref in refs {
      if let Err(error) = actor_ref.destroy().await {
        tracing::error!(actor = %actor_ref.id(), error = %error, "hosted actor teardown failed");
      }
    }
  }

  fn lookup(&self, raw: &str) -> Option<ActorRef> {
    self.system.directory().get(&ActorId::from_wire(raw.to_string()))
  }
}

#[async_trait]
impl FrameHandler for HostFrameHandler {
  async fn handle(&self, frame: Frame, _conn: Connection) -> Option<Frame> {
    match frame {
      Frame::Spawn {
        seq,
        behavior,
        options,
        parent,
        ..
      } => {
        let result = self
          .spawn_hosted(&behavior, options, &parent)
          .await
          .map(|actor_ref| Value::String(actor_ref.id().to_string()));
        Some(Frame::Reply {
          seq,
          result: WireResult::from(result),
        })
      }
      Frame::Request {
        seq,
        target,
        topic,
        payload,
        expect_reply,
      } => match self.lookup(&target) {
        Some(actor_ref) => {
          if expect_reply {
            let result = actor_ref.send_and_receive(topic, payload).await;
            Some(Frame::Reply {
              seq,
              result: WireResult::from(result),
            })
          } else {
            if let Err(error) = actor_ref.send(topic, payload).await {
              tracing::error!(actor = %actor_ref.id(), error = %error, "incoming send failed");
            }
            None
          }
        }
        None => expect_reply.then(|| Frame::Reply {
          seq,
          result: WireResult::Err(ActorError::StaleReference(ActorId::from_wire(target))),
        }),
      },
      Frame::CreateChild {
        seq,
        parent,
        behavior,
        options,
      } => {
        let result = match self.lookup(&parent) {
          Some(parent_ref) => parent_ref
            .create_child(BehaviorDef::registered(behavior), options)
            .await
            .map(|child| Value::String(child.id().to_string())),
          None => Err(ActorError::StaleReference(ActorId::from_wire(parent))),
        };
        Some(Frame::Reply {
          seq,
          result: WireResult::from(result),
        })
      }
      Frame::Destroy { seq, target } => {
        let result = match self.lookup(&target) {
          Some(actor_ref) => actor_ref.destroy().await.map(|_| Value::Null),
          None => Ok(Value::Null),
        };
        Some(Frame::Reply {
          seq,
          result: WireResult::from(result),
        })
      }
      Frame::Reply { .. } => None,
    }
  }
}

/// Accepts one listen-mode client connection: serve frames until
/// disconnect, then destroy whatever it spawned.
pub(crate) fn serve_client(system: ActorSystem, stream: tokio::net::TcpStream) {
  let handler = Arc::new(HostFrameHandler::new(system));
  let conn = Connection::spawn(stream, handler.clone());
  let mut death = conn.death_watch();
  tokio::spawn(async move {
    while *death.borrow() {
      if death.changed().await.is_err() {
        break;
      }
    }
    handler.destroy_hosted().await;
  });
}
