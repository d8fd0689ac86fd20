use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use static_assertions::assert_impl_all;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::actor::cell::{spawn_actor, EmptyBehavior};
use crate::actor::core_types::{ActorId, ChildOptions};
use crate::actor::directory::ActorDirectory;
use crate::actor::reference::ActorRef;
use crate::behavior::BehaviorDef;
use crate::error::ActorError;
use crate::logging::{LogHandle, LogLevel, LoggerFactory, LoggerSpec};
use crate::remote::fork::WorkerLauncher;
use crate::remote::host;
use crate::resources::{ResourceDef, ResourceRegistry};
use crate::router::balancer::{BalancerFactory, BalancerRegistry};

const TEST_RANDOM_SEED: u64 = 0x5eed;

/// The single configuration record the system factory accepts.
#[derive(Default)]
pub struct SystemConfig {
  /// Root actor behavior; an empty behavior when unset.
  pub root: Option<BehaviorDef>,
  /// Resources instantiated once per system, in order.
  pub resources: Vec<ResourceDef>,
  /// Logger implementation reference; only the identifier ever travels to
  /// workers.
  pub logger: LoggerSpec,
  /// Actor-name (or `default`) to level map gating emission.
  pub log_categories: HashMap<String, LogLevel>,
  /// Balancer classes registered by name, next to the built-ins.
  pub balancers: Vec<(String, BalancerFactory)>,
  /// Deterministic defaults for test suites (seeded random balancer,
  /// libtest worker launch).
  pub test: bool,
  /// Opaque directive forwarded to forked and remote workers.
  pub bootstrap: Option<String>,
  /// Address `listen()` binds. Port 0 picks an ephemeral port.
  pub listen_addr: Option<SocketAddr>,
  /// Override for how forked workers are executed.
  pub worker_launcher: Option<WorkerLauncher>,
}

impl SystemConfig {
  pub fn with_root(mut self, root: BehaviorDef) -> Self {
    self.root = Some(root);
    self
  }

  pub fn with_resource(mut self, resource: ResourceDef) -> Self {
    self.resources.push(resource);
    self
  }

  pub fn with_logger(mut self, logger: LoggerSpec) -> Self {
    self.logger = logger;
    self
  }

  pub fn with_log_categories(mut self, categories: HashMap<String, LogLevel>) -> Self {
    self.log_categories = categories;
    self
  }

  pub fn with_log_category(mut self, name: impl Into<String>, level: LogLevel) -> Self {
    self.log_categories.insert(name.into(), level);
    self
  }

  pub fn with_balancer(mut self, name: impl Into<String>, factory: BalancerFactory) -> Self {
    self.balancers.push((name.into(), factory));
    self
  }

  pub fn with_test(mut self, test: bool) -> Self {
    self.test = test;
    self
  }

  pub fn with_bootstrap(mut self, bootstrap: impl Into<String>) -> Self {
    self.bootstrap = Some(bootstrap.into());
    self
  }

  pub fn with_listen_addr(mut self, addr: SocketAddr) -> Self {
    self.listen_addr = Some(addr);
    self
  }

  pub fn with_worker_launcher(mut self, launcher: WorkerLauncher) -> Self {
    self.worker_launcher = Some(launcher);
    self
  }
}

impl Debug for SystemConfig {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SystemConfig")
      .field("logger", &self.logger)
      .field("log_categories", &self.log_categories)
      .field("test", &self.test)
      .field("listen_addr", &self.listen_addr)
      .finish()
  }
}

struct SystemInner {
  id: String,
  node: String,
  config: SystemConfig,
  resources: ResourceRegistry,
  logger: LoggerFactory,
  balancers: BalancerRegistry,
  directory: ActorDirectory,
  root: OnceCell<ActorRef>,
  log: LogHandle,
  actor_seq: AtomicU64,
  listen: Mutex<Option<(SocketAddr, JoinHandle<()>)>>,
  destroyed: AtomicBool,
}

/// Global assembly: registries, the synthesized root actor, listen mode
/// and ordered teardown. Clone-able handle in the usual style.
#[derive(Clone)]
pub struct ActorSystem {
  inner: Arc<SystemInner>,
}

assert_impl_all!(ActorSystem: Send, Sync);

impl ActorSystem {
  pub async fn new(config: SystemConfig) -> Result<ActorSystem, ActorError> {
    let logger = LoggerFactory::new(&config.logger, config.log_categories.clone())?;
    let log = logger.handle("system");

    let random_seed = config.test.then_some(TEST_RANDOM_SEED);
    let balancers = BalancerRegistry::with_builtins(random_seed);
    for (name, factory) in &config.balancers {
      balancers.register(name.clone(), factory.clone());
    }

    let resources = ResourceRegistry::new();
    for def in &config.resources {
      resources.register(def.name(), def.construct()).await?;
    }

    let id = Uuid::new_v4().to_string();
    let node = id.split('-').next().unwrap_or("node").to_string();
    let system = ActorSystem {
      inner: Arc::new(SystemInner {
        id,
        node,
        config,
        resources,
        logger,
        balancers,
        directory: ActorDirectory::new(),
        root: OnceCell::new(),
        log,
        actor_seq: AtomicU64::new(1),
        listen: Mutex::new(None),
        destroyed: AtomicBool::new(false),
      }),
    };

    let root_def = system
      .inner
      .config
      .root
      .clone()
      .unwrap_or_else(|| BehaviorDef::local("Root", || EmptyBehavior::new("Root")));
    let root = spawn_actor(&system, None, root_def, ChildOptions::default()).await?;
    let _ = system.inner.root.set(root);

    system.inner.log.debug(format!("actor system {} started", system.inner.id));
    Ok(system)
  }

  pub fn id(&self) -> &str {
    &self.inner.id
  }

  /// The synthesized root every user actor descends from.
  pub fn root_actor(&self) -> ActorRef {
    self
      .inner
      .root
      .get()
      .cloned()
      .unwrap_or_else(|| unreachable!("root actor is set during construction"))
  }

  pub fn log(&self) -> &LogHandle {
    &self.inner.log
  }

  pub fn logger(&self) -> &LoggerFactory {
    &self.inner.logger
  }

  pub(crate) fn resources(&self) -> &ResourceRegistry {
    &self.inner.resources
  }

  pub fn balancers(&self) -> &BalancerRegistry {
    &self.inner.balancers
  }

  pub(crate) fn directory(&self) -> &ActorDirectory {
    &self.inner.directory
  }

  pub(crate) fn config(&self) -> &SystemConfig {
    &self.inner.config
  }

  pub(crate) fn allocate_actor_id(&self) -> ActorId {
    let seq = self.inner.actor_seq.fetch_add(1, Ordering::Relaxed);
    ActorId::new(&self.inner.node, seq)
  }

  /// Starts accepting actor-hosting requests from remote systems. Returns
  /// once bound with the actual address; idempotent.
  pub async fn listen(&self) -> Result<SocketAddr, ActorError> {
    let mut listen = self.inner.listen.lock().await;
    if let Some((addr, _)) = listen.as_ref() {
      return Ok(*addr);
    }
    let requested = self
      .inner
      .config
      .listen_addr
      .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], crate::remote::DEFAULT_PORT)));
    let listener = TcpListener::bind(requested)
      .await
      .map_err(|error| ActorError::config(format!("failed to bind {}: {}", requested, error)))?;
    let addr = listener
      .local_addr()
      .map_err(|error| ActorError::config(format!("failed to read the bound address: {}", error)))?;

    let system = self.clone();
    let accept_loop = tokio::spawn(async move {
      loop {
        match listener.accept().await {
          Ok((stream, peer)) => {
            tracing::debug!(peer = %peer, "accepted hosting connection");
            host::serve_client(system.clone(), stream);
          }
          Err(error) => {
            tracing::error!(error = %error, "accept failed");
            break;
          }
        }
      }
    });
    *listen = Some((addr, accept_loop));
    self.inner.log.info(format!("listening on {}", addr));
    Ok(addr)
  }

  pub async fn listen_addr(&self) -> Option<SocketAddr> {
    self.inner.listen.lock().await.as_ref().map(|(addr, _)| *addr)
  }

  /// Destroys the whole tree, then the resources: equivalent to destroying
  /// the root ref followed by `destroy_all` on the resource registry.
  pub async fn destroy(&self) -> Result<(), ActorError> {
    if self.inner.destroyed.swap(true, Ordering::SeqCst) {
      return Ok(());
    }
    if let Some((_, accept_loop)) = self.inner.listen.lock().await.take() {
      accept_loop.abort();
    }
    let result = self.root_actor().destroy().await;
    self.inner.resources.destroy_all().await;
    self.inner.log.debug(format!("actor system {} destroyed", self.inner.id));
    result
  }
}

impl Debug for ActorSystem {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ActorSystem").field("id", &self.inner.id).finish()
  }
}
