use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::actor::core_types::{ActorId, ActorState, ChildOptions, Mode};
use crate::actor::endpoint::Endpoint;
use crate::actor::reference::ActorRef;
use crate::behavior::BehaviorDef;
use crate::error::ActorError;
use crate::message::Delivery;
use crate::remote::connection::Connection;
use crate::remote::protocol::Frame;
use crate::system::ActorSystem;

/// Endpoint for an actor hosted on the far side of a framed connection:
/// forked children, remote children, children created on either, and the
/// worker-side parent proxy all use this one type. Only the target id
/// differs.
pub(crate) struct ChannelEndpoint {
  system: ActorSystem,
  conn: Connection,
  target: ActorId,
  mode: Mode,
  owns_connection: bool,
  state: watch::Sender<ActorState>,
}

impl ChannelEndpoint {
  pub fn create(system: ActorSystem, conn: Connection, target: ActorId, mode: Mode, owns_connection: bool) -> Arc<Self> {
    let (state, _) = watch::channel(ActorState::Ready);
    let endpoint = Arc::new(ChannelEndpoint {
      system,
      conn,
      target,
      mode,
      owns_connection,
      state,
    });
    endpoint.clone().watch_disconnect();
    endpoint
  }

  fn watch_disconnect(self: Arc<Self>) {
    let mut death = self.conn.death_watch();
    tokio::spawn(async move {
      while *death.borrow() {
        if death.changed().await.is_err() {
          break;
        }
      }
      self.finish(ActorState::Destroyed);
    });
  }

  fn finish(&self, state: ActorState) {
    self.state.send_replace(state);
    self.system.directory().unregister(&self.target);
  }
}

impl Debug for ChannelEndpoint {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ChannelEndpoint")
      .field("target", &self.target)
      .field("alive", &self.conn.is_alive())
      .finish()
  }
}

#[async_trait]
impl Endpoint for ChannelEndpoint {
  async fn deliver(&self, delivery: Delivery) -> Result<(), ActorError> {
    if *self.state.borrow() >= ActorState::Destroying || !self.conn.is_alive() {
      return Err(ActorError::StaleReference(self.target.clone()));
    }
    let Delivery { topic, payload, reply } = delivery;
    let seq = self.conn.next_seq();
    let frame = Frame::Request {
      seq,
      target: self.target.to_string(),
      topic,
      payload,
      expect_reply: reply.is_some(),
    };
    match reply {
      Some(reply) => {
        let rx = self.conn.request(frame, seq).await?;
        tokio::spawn(async move {
          let result = rx
            .await
            .unwrap_or_else(|_| Err(ActorError::delivery("connection closed")));
          let _ = reply.send(result);
        });
        Ok(())
      }
      None => self.conn.send_frame(&frame).await,
    }
  }

  async fn destroy(&self) -> Result<(), ActorError> {
    if *self.state.borrow() == ActorState::Destroyed {
      return Ok(());
    }
    if self.conn.is_alive() {
      let seq = self.conn.next_seq();
      let frame = Frame::Destroy {
        seq,
        target: self.target.to_string(),
      };
      if let Ok(rx) = self.conn.request(frame, seq).await {
        let _ = rx.await;
      }
    }
    self.finish(ActorState::Destroyed);
    if self.owns_connection {
      self.conn.close().await;
    }
    Ok(())
  }

  async fn create_child(&self, def: BehaviorDef, options: ChildOptions) -> Result<ActorRef, ActorError> {
    let behavior = def
      .registered_name()
      .ok_or_else(|| {
        ActorError::config(format!(
          "behavior {} must be registered by name to create children across processes",
          def.name()
        ))
      })?
      .to_string();
    if !self.conn.is_alive() {
      return Err(ActorError::StaleReference(self.target.clone()));
    }
    let seq = self.conn.next_seq();
    let frame = Frame::CreateChild {
      seq,
      parent: self.target.to_string(),
      behavior: behavior.clone(),
      options: options.clone(),
    };
    let rx = self.conn.request(frame, seq).await?;
    let value = rx
      .await
      .map_err(|_| ActorError::delivery("connection closed before the create-child reply arrived"))??;
    let id = value
      .as_str()
      .map(|raw| ActorId::from_wire(raw.to_string()))
      .ok_or_else(|| ActorError::delivery("malformed create-child reply"))?;

    let endpoint = ChannelEndpoint::create(self.system.clone(), self.conn.clone(), id.clone(), self.mode, false);
    let actor_ref = ActorRef::new(
      id,
      self.mode,
      endpoint,
      self.system.logger().handle(&behavior),
      self.system.clone(),
      Some(self.target.clone()),
      options.custom_properties,
    );
    self.system.directory().register(actor_ref.clone());
    Ok(actor_ref)
  }

  fn state_watch(&self) -> watch::Receiver<ActorState> {
    self.state.subscribe()
  }
}
