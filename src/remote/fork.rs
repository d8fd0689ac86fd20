use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::process::Command;

use crate::actor::cell::ParentLink;
use crate::actor::core_types::{ActorId, ChildOptions, Mode};
use crate::actor::reference::ActorRef;
use crate::behavior::BehaviorDef;
use crate::error::ActorError;
use crate::remote::connection::Connection;
use crate::remote::protocol::{Frame, WireResult};
use crate::remote::{codec, host, proxy, spawn_over_stream};
use crate::system::{ActorSystem, SystemConfig};

/// Environment variable carrying the parent's connect-back address into a
/// worker process.
pub const ENV_CONNECT: &str = "TROUPE_WORKER_CONNECT";
/// Environment variable carrying the opaque bootstrap directive.
pub const ENV_BOOTSTRAP: &str = "TROUPE_BOOTSTRAP";

/// Name of the libtest entry generated by `enable_fork_support!`, used as
/// the worker filter when a test system forks.
pub const FORK_TEST_ENTRY: &str = "troupe_fork_worker_host";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// How a forked worker process is executed. The default re-executes the
/// current binary, which must call `troupe::init()` before anything else;
/// test systems swap in the libtest filter arguments instead.
#[derive(Debug, Clone)]
pub struct WorkerLauncher {
  pub program: PathBuf,
  pub args: Vec<String>,
}

impl WorkerLauncher {
  pub(crate) fn resolve(config: &SystemConfig) -> Result<WorkerLauncher, ActorError> {
    if let Some(launcher) = &config.worker_launcher {
      return Ok(launcher.clone());
    }
    let program = std::env::current_exe()
      .map_err(|error| ActorError::config(format!("cannot locate the worker binary: {}", error)))?;
    let args = if config.test {
      vec![FORK_TEST_ENTRY.to_string(), "--exact".to_string(), "--nocapture".to_string()]
    } else {
      Vec::new()
    };
    Ok(WorkerLauncher { program, args })
  }
}

/// Forked placement: bind an ephemeral loopback listener, launch the
/// worker with the connect-back address in its environment, and run the
/// spawn handshake once it dials in. From the handshake on this is the
/// remote code path.
pub(crate) async fn spawn_forked(
  system: &ActorSystem,
  link: Option<ParentLink>,
  def: BehaviorDef,
  options: ChildOptions,
) -> Result<ActorRef, ActorError> {
  if def.registered_name().is_none() {
    return Err(ActorError::config(format!(
      "behavior {} must be registered by name for forked placement",
      def.name()
    )));
  }
  let listener = TcpListener::bind("127.0.0.1:0")
    .await
    .map_err(|error| ActorError::delivery(format!("failed to bind the worker listener: {}", error)))?;
  let address = listener
    .local_addr()
    .map_err(|error| ActorError::delivery(format!("failed to read the worker listener address: {}", error)))?;

  let launcher = WorkerLauncher::resolve(system.config())?;
  let mut command = Command::new(&launcher.program);
  command
    .args(&launcher.args)
    .env(ENV_CONNECT, address.to_string())
    .stdin(Stdio::null());
  if let Some(bootstrap) = &system.config().bootstrap {
    command.env(ENV_BOOTSTRAP, bootstrap);
  }
  let mut child = command
    .spawn()
    .map_err(|error| ActorError::delivery(format!("failed to launch the worker process: {}", error)))?;

  let accepted = tokio::time::timeout(CONNECT_TIMEOUT, listener.accept()).await;
  let stream = match accepted {
    Ok(Ok((stream, _))) => stream,
    Ok(Err(error)) => {
      let _ = child.start_kill();
      return Err(ActorError::delivery(format!("worker accept failed: {}", error)));
    }
    Err(_) => {
      let _ = child.start_kill();
      return Err(ActorError::delivery("worker did not connect back in time"));
    }
  };
  tokio::spawn(async move {
    let _ = child.wait().await;
  });

  spawn_over_stream(system, link, def, options, stream, Mode::Forked).await
}

/// Application entry hook: call first thing in `main`. When the process
/// was launched as a worker this serves the hosting protocol and never
/// returns; otherwise it is a no-op.
pub fn init() {
  worker_host_from_env();
}

pub fn worker_requested() -> bool {
  std::env::var(ENV_CONNECT).is_ok()
}

/// Runs the worker protocol when the connect-back address is present in
/// the environment, then exits the process. Returns immediately when it is
/// not, so test harness entries can call this unconditionally.
pub fn worker_host_from_env() {
  let Ok(address) = std::env::var(ENV_CONNECT) else {
    return;
  };
  let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
    Ok(runtime) => runtime,
    Err(error) => {
      eprintln!("troupe worker: failed to start a runtime: {}", error);
      std::process::exit(1);
    }
  };
  let code = runtime.block_on(worker_main(address));
  std::process::exit(code);
}

async fn worker_main(address: String) -> i32 {
  let mut stream = match TcpStream::connect(&address).await {
    Ok(stream) => stream,
    Err(error) => {
      eprintln!("troupe worker: failed to dial {}: {}", address, error);
      return 1;
    }
  };

  let first = match codec::read_frame(&mut stream).await {
    Ok(frame) => frame,
    Err(error) => {
      eprintln!("troupe worker: failed to read the spawn frame: {}", error);
      return 1;
    }
  };
  let Frame::Spawn {
    seq,
    behavior,
    options,
    logger,
    categories,
    test,
    bootstrap,
    parent,
  } = first
  else {
    eprintln!("troupe worker: expected a spawn frame first");
    return 1;
  };
  if let Some(bootstrap) = &bootstrap {
    std::env::set_var(ENV_BOOTSTRAP, bootstrap);
  }

  let config = SystemConfig::default()
    .with_logger(logger)
    .with_log_categories(categories)
    .with_test(test);
  let system = match ActorSystem::new(config).await {
    Ok(system) => system,
    Err(error) => {
      let _ = codec::write_frame(
        &mut stream,
        &Frame::Reply {
          seq,
          result: WireResult::Err(error),
        },
      )
      .await;
      return 1;
    }
  };

  let handler = Arc::new(host::HostFrameHandler::new(system.clone()));
  let conn = Connection::spawn(stream, handler.clone());

  let parent_id = ActorId::from_wire(parent.clone());
  let parent_endpoint = proxy::ChannelEndpoint::create(system.clone(), conn.clone(), parent_id.clone(), Mode::Remote, false);
  let parent_ref = ActorRef::new(
    parent_id,
    Mode::Remote,
    parent_endpoint,
    system.logger().handle("parent"),
    system.clone(),
    None,
    None,
  );
  system.directory().register(parent_ref);

  let result = handler
    .spawn_hosted(&behavior, options, &parent)
    .await
    .map(|actor_ref| Value::String(actor_ref.id().to_string()));
  let reply = Frame::Reply {
    seq,
    result: WireResult::from(result),
  };
  if conn.send_frame(&reply).await.is_err() {
    let _ = system.destroy().await;
    return 1;
  }

  let mut death = conn.death_watch();
  while *death.borrow() {
    if death.changed().await.is_err() {
      break;
    }
  }
  let _ = system.destroy().await;
  0
}

/// Generates the libtest entry a forking test binary needs. The optional
/// setup path runs in the worker process before hosting starts, so both
/// sides of the fork register the same behaviors and loggers.
#[macro_export]
macro_rules! enable_fork_support {
  () => {
    #[test]
    fn troupe_fork_worker_host() {
      $crate::remote::fork::worker_host_from_env();
    }
  };
  ($setup:path) => {
    #[test]
    fn troupe_fork_worker_host() {
      if $crate::remote::fork::worker_requested() {
        $setup();
        $crate::remote::fork::worker_host_from_env();
      }
    }
  };
}
