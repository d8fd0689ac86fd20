use std::sync::Arc;

use tokio::net::TcpStream;

use crate::actor::cell::ParentLink;
use crate::actor::core_types::{ActorId, ChildOptions, Mode};
use crate::actor::reference::ActorRef;
use crate::behavior::BehaviorDef;
use crate::error::ActorError;
use crate::system::ActorSystem;

pub mod codec;
pub(crate) mod connection;
pub mod fork;
pub(crate) mod host;
pub(crate) mod protocol;
pub(crate) mod proxy;


/// Default port for systems in listen mode, used when a remote host is
/// given without one.
pub const DEFAULT_PORT: u16 = 6161;

pub(crate) fn host_with_port(host: &str) -> String {
  if host.contains(':') {
    host.to_string()
  } else {
    format!("{}:{}", host, DEFAULT_PORT)
  }
}

/// Remote placement: connect to a peer system in listen mode and ask it to
/// host the actor. After the handshake this is the same code path as a
/// forked child.
pub(crate) async fn spawn_remote(
  system: &ActorSystem,
  link: Option<ParentLink>,
  def: BehaviorDef,
  options: ChildOptions,
) -> Result<ActorRef, ActorError> {
  let host = options
    .host
    .clone()
    .ok_or_else(|| ActorError::config("remote placement requires a host"))?;
  let address = host_with_port(&host);
  let stream = TcpStream::connect(&address)
    .await
    .map_err(|error| ActorError::delivery(format!("failed to connect to {}: {}", address, error)))?;
  spawn_over_stream(system, link, def, options, stream, Mode::Remote).await
}

/// Shared tail of forked and remote spawning: run the spawn handshake over
/// an established stream and wrap the hosted actor id in a channel-backed
/// ref.
pub(crate) async fn spawn_over_stream(
  system: &ActorSystem,
  link: Option<ParentLink>,
  def: BehaviorDef,
  options: ChildOptions,
  stream: TcpStream,
  mode: Mode,
) -> Result<ActorRef, ActorError> {
  let behavior = def
    .registered_name()
    .ok_or_else(|| {
      ActorError::config(format!(
        "behavior {} must be registered by name for {} placement",
        def.name(),
        mode
      ))
    })?
    .to_string();
  let link = link.ok_or_else(|| ActorError::config("cross-process actors require a parent"))?;

  let handler = Arc::new(host::HostFrameHandler::new(system.clone()));
  let conn = connection::Connection::spawn(stream, handler);

  let config = system.config();
  let seq = conn.next_seq();
  let frame = protocol::Frame::Spawn {
    seq,
    behavior: behavior.clone(),
    options: ChildOptions {
      custom_properties: options.custom_properties.clone(),
      ..ChildOptions::default()
    },
    logger: config.logger.clone(),
    categories: config.log_categories.clone(),
    test: config.test,
    bootstrap: config.bootstrap.clone(),
    parent: link.id.to_string(),
  };
  let rx = conn.request(frame, seq).await?;
  let value = rx
    .await
    .map_err(|_| ActorError::delivery("connection closed before the spawn reply arrived"))??;
  let id = value
    .as_str()
    .map(|raw| ActorId::from_wire(raw.to_string()))
    .ok_or_else(|| ActorError::delivery("malformed spawn reply"))?;

  let endpoint = proxy::ChannelEndpoint::create(system.clone(), conn, id.clone(), mode, true);
  let actor_ref = ActorRef::new(
    id,
    mode,
    endpoint,
    system.logger().handle(&behavior),
    system.clone(),
    Some(link.id.clone()),
    options.custom_properties,
  );
  system.directory().register(actor_ref.clone());
  link.children.lock().await.push(actor_ref.clone());
  Ok(actor_ref)
}
