use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use troupe::{
  register_behavior, register_logger, ActorRef, ActorSystem, Balancer, BehaviorDef, ChildOptions, ErrorReason,
  ForwardTarget, Handlers, LogLevel, Logger, LoggerSpec, Mode, OnCrash, SystemConfig,
};

troupe::enable_fork_support!(setup);

#[derive(Debug, Default)]
struct CaptureLogger {
  entries: StdMutex<HashMap<LogLevel, Vec<String>>>,
}

impl CaptureLogger {
  fn push(&self, level: LogLevel, message: &str) {
    self.entries.lock().unwrap().entry(level).or_default().push(message.to_string());
  }

  fn at(&self, level: LogLevel) -> Vec<String> {
    self.entries.lock().unwrap().get(&level).cloned().unwrap_or_default()
  }
}

impl Logger for CaptureLogger {
  fn error(&self, _category: &str, message: &str) {
    self.push(LogLevel::Error, message);
  }

  fn warn(&self, _category: &str, message: &str) {
    self.push(LogLevel::Warn, message);
  }

  fn info(&self, _category: &str, message: &str) {
    self.push(LogLevel::Info, message);
  }

  fn debug(&self, _category: &str, message: &str) {
    self.push(LogLevel::Debug, message);
  }

  fn as_any(&self) -> &dyn Any {
    self
  }
}

/// Registrations shared by both sides of a fork; the worker entry runs this
/// before hosting starts.
fn setup() {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .try_init();
  register_logger("process-capture", CaptureLogger::default);

  register_behavior("MyActor", || {
    Handlers::new("MyActor")
      .on("test", |payload: Value, ctx| async move {
        ctx.log().info(payload.as_str().unwrap_or(""));
        Ok(Value::Null)
      })
      .on("getLoggerMessages", |_payload, ctx| async move {
        let implementation = ctx.system().logger().implementation();
        let info = implementation
          .as_any()
          .downcast_ref::<CaptureLogger>()
          .map(|capture| capture.at(LogLevel::Info))
          .unwrap_or_default();
        Ok(json!({ "info": info }))
      })
  });

  register_behavior("PidActor", || {
    Handlers::new("PidActor")
      .on("getPid", |_payload, _ctx| async move { Ok(json!(std::process::id())) })
      .on("kill", |_payload, _ctx| async move { std::process::exit(1) })
  });

  register_behavior("ParentCaller", || {
    Handlers::new("ParentCaller").on("poke", |_payload, ctx| async move {
      let parent = ctx.parent().ok_or_else(|| ErrorReason::from("no parent in scope"))?;
      parent
        .send_and_receive("bump", Value::Null)
        .await
        .map_err(|error| ErrorReason::from(error.to_string()))
    })
  });

  register_behavior("Echo", || {
    Handlers::new("Echo").on("echo", |payload: Value, _ctx| async move { Ok(payload) })
  });
}

fn process_config() -> SystemConfig {
  SystemConfig::default()
    .with_test(true)
    .with_logger(LoggerSpec::Named("process-capture".to_string()))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn forked_child_reconstructs_the_logger_by_name() {
  setup();
  let config = process_config()
    .with_log_category("default", LogLevel::Silent)
    .with_log_category("MyActor", LogLevel::Info);
  let system = ActorSystem::new(config).await.unwrap();

  let child = system
    .root_actor()
    .create_child(
      BehaviorDef::registered("MyActor"),
      ChildOptions::default().with_mode(Mode::Forked),
    )
    .await
    .unwrap();
  assert_eq!(child.mode(), Mode::Forked);

  child.send_and_receive("test", json!("Hello!")).await.unwrap();
  let messages = child.send_and_receive("getLoggerMessages", Value::Null).await.unwrap();
  assert_eq!(messages["info"], json!(["Hello!"]));
  system.destroy().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn forked_cluster_round_robins_across_processes() {
  setup();
  let system = ActorSystem::new(process_config()).await.unwrap();
  let cluster = system
    .root_actor()
    .create_child(
      BehaviorDef::registered("PidActor"),
      ChildOptions::default().with_mode(Mode::Forked).with_cluster_size(3),
    )
    .await
    .unwrap();
  assert_eq!(cluster.mode(), Mode::Forked);

  let mut pids = Vec::new();
  for _ in 0..6 {
    let pid = cluster.send_and_receive("getPid", Value::Null).await.unwrap();
    pids.push(pid.as_u64().unwrap());
  }
  assert_eq!(pids[0], pids[3]);
  assert_eq!(pids[1], pids[4]);
  assert_eq!(pids[2], pids[5]);
  let parent_pid = u64::from(std::process::id());
  assert!(pids.iter().all(|pid| *pid != parent_pid));
  let distinct: std::collections::HashSet<u64> = pids.iter().copied().collect();
  assert_eq!(distinct.len(), 3);
  system.destroy().await.unwrap();
}

#[derive(Debug)]
struct FirstReplicaBalancer {
  ids: Vec<String>,
  changes: Arc<AtomicUsize>,
}

#[async_trait]
impl Balancer for FirstReplicaBalancer {
  async fn cluster_changed(&mut self, replicas: &[ActorRef]) {
    self.ids = replicas.iter().map(|replica| replica.id().to_string()).collect();
    self.changes.fetch_add(1, Ordering::SeqCst);
  }

  async fn forward(&mut self, _topic: &str, _payload: &Value) -> Option<ForwardTarget> {
    self.ids.first().cloned().map(ForwardTarget::Id)
  }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn crashed_replicas_are_respawned_and_never_reselected() {
  setup();
  let changes = Arc::new(AtomicUsize::new(0));
  let config = process_config().with_balancer("first", {
    let changes = changes.clone();
    Arc::new(move || {
      Box::new(FirstReplicaBalancer {
        ids: Vec::new(),
        changes: changes.clone(),
      }) as Box<dyn Balancer>
    })
  });
  let system = ActorSystem::new(config).await.unwrap();
  let cluster = system
    .root_actor()
    .create_child(
      BehaviorDef::registered("PidActor"),
      ChildOptions::default()
        .with_mode(Mode::Forked)
        .with_cluster_size(3)
        .with_balancer("first")
        .with_on_crash(OnCrash::Respawn),
    )
    .await
    .unwrap();

  let baseline = changes.load(Ordering::SeqCst);
  assert_eq!(baseline, 1);
  let first_pid = cluster.send_and_receive("getPid", Value::Null).await.unwrap();

  cluster.send("kill", Value::Null).await.unwrap();
  let deadline = Instant::now() + Duration::from_secs(30);
  while changes.load(Ordering::SeqCst) < baseline + 2 {
    assert!(Instant::now() < deadline, "respawn did not complete in time");
    tokio::time::sleep(Duration::from_millis(50)).await;
  }
  assert_eq!(changes.load(Ordering::SeqCst), baseline + 2);

  let next_pid = cluster.send_and_receive("getPid", Value::Null).await.unwrap();
  assert_ne!(next_pid, first_pid);
  system.destroy().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn forked_child_calls_back_into_its_parent() {
  setup();
  let system = ActorSystem::new(process_config()).await.unwrap();

  let counter_def = BehaviorDef::local("Counter", || {
    let count = Arc::new(Mutex::new(0i64));
    let read = count.clone();
    Handlers::new("Counter")
      .on("bump", move |_payload, _ctx| {
        let count = count.clone();
        async move {
          let mut count = count.lock().await;
          *count += 1;
          Ok(json!(*count))
        }
      })
      .on("get", move |_payload, _ctx| {
        let read = read.clone();
        async move { Ok(json!(*read.lock().await)) }
      })
  });
  let counter = system.root_actor().create_child(counter_def, ChildOptions::default()).await.unwrap();

  let child = counter
    .create_child(
      BehaviorDef::registered("ParentCaller"),
      ChildOptions::default().with_mode(Mode::Forked),
    )
    .await
    .unwrap();

  let bumped = child.send_and_receive("poke", Value::Null).await.unwrap();
  assert_eq!(bumped, json!(1));
  let observed = counter.send_and_receive("get", Value::Null).await.unwrap();
  assert_eq!(observed, json!(1));
  system.destroy().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn remote_children_are_hosted_by_a_listening_system() {
  setup();
  let host_system = ActorSystem::new(
    process_config().with_listen_addr("127.0.0.1:0".parse().unwrap()),
  )
  .await
  .unwrap();
  let addr = host_system.listen().await.unwrap();
  assert_eq!(host_system.listen_addr().await, Some(addr));

  let system = ActorSystem::new(process_config()).await.unwrap();
  let child = system
    .root_actor()
    .create_child(
      BehaviorDef::registered("Echo"),
      ChildOptions::default().with_mode(Mode::Remote).with_host(addr.to_string()),
    )
    .await
    .unwrap();
  assert_eq!(child.mode(), Mode::Remote);

  let reply = child.send_and_receive("echo", json!({ "from": "afar" })).await.unwrap();
  assert_eq!(reply, json!({ "from": "afar" }));

  system.destroy().await.unwrap();
  host_system.destroy().await.unwrap();
}
