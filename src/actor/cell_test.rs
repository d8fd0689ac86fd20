use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::actor::core_types::ChildOptions;
use crate::behavior::{BehaviorDef, Handlers};
use crate::error::{ActorError, ErrorReason};
use crate::system::{ActorSystem, SystemConfig};

async fn test_system() -> ActorSystem {
  ActorSystem::new(SystemConfig::default().with_test(true)).await.unwrap()
}

#[tokio::test]
async fn executions_on_one_actor_never_overlap() {
  let system = test_system().await;
  let trace: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
  let def = {
    let trace = trace.clone();
    BehaviorDef::local("Serial", move || {
      let trace = trace.clone();
      Handlers::new("Serial").on("work", move |payload: Value, _ctx| {
        let trace = trace.clone();
        async move {
          let tag = payload.as_str().unwrap_or("?").to_string();
          trace.lock().await.push(format!("start {}", tag));
          tokio::time::sleep(Duration::from_millis(10)).await;
          trace.lock().await.push(format!("end {}", tag));
          Ok(Value::Null)
        }
      })
    })
  };
  let actor = system.root_actor().create_child(def, ChildOptions::default()).await.unwrap();
  for tag in ["a", "b", "c"] {
    actor.send("work", json!(tag)).await.unwrap();
  }
  actor.send_and_receive("work", json!("d")).await.unwrap();

  let trace = trace.lock().await.clone();
  assert_eq!(
    trace,
    vec!["start a", "end a", "start b", "end b", "start c", "end c", "start d", "end d"]
  );
  system.destroy().await.unwrap();
}

#[tokio::test]
async fn messages_sent_during_initialize_are_queued_not_dropped() {
  let system = test_system().await;
  let def = BehaviorDef::local("SlowStart", || {
    Handlers::new("SlowStart")
      .on_initialize(|_ctx| async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(())
      })
      .on("ping", |_payload, _ctx| async move { Ok(json!("pong")) })
  });
  let actor = system.root_actor().create_child(def, ChildOptions::default()).await.unwrap();
  let reply = actor.send_and_receive("ping", Value::Null).await.unwrap();
  assert_eq!(reply, json!("pong"));
  system.destroy().await.unwrap();
}

#[tokio::test]
async fn init_failure_reaches_the_creator_and_skips_destroy() {
  let system = test_system().await;
  let destroyed: Arc<Mutex<bool>> = Arc::new(Mutex::new(false));
  let def = {
    let destroyed = destroyed.clone();
    BehaviorDef::local("Broken", move || {
      let destroyed = destroyed.clone();
      Handlers::new("Broken")
        .on_initialize(|_ctx| async move { Err(ErrorReason::from("refused")) })
        .on_destroy(move |_ctx| {
          let destroyed = destroyed.clone();
          async move {
            *destroyed.lock().await = true;
            Ok(())
          }
        })
    })
  };
  let error = system
    .root_actor()
    .create_child(def, ChildOptions::default())
    .await
    .unwrap_err();
  assert_eq!(error, ActorError::InitFailure(ErrorReason::from("refused")));
  assert!(!*destroyed.lock().await);
  system.destroy().await.unwrap();
}

#[tokio::test]
async fn sends_after_destroy_fail_with_stale_reference() {
  let system = test_system().await;
  let def = BehaviorDef::local("ShortLived", || Handlers::new("ShortLived"));
  let actor = system.root_actor().create_child(def, ChildOptions::default()).await.unwrap();
  actor.destroy().await.unwrap();
  let error = actor.send("ping", Value::Null).await.unwrap_err();
  assert!(matches!(error, ActorError::StaleReference(_)));
  let error = actor.send_and_receive("ping", Value::Null).await.unwrap_err();
  assert!(matches!(error, ActorError::StaleReference(_)));
  system.destroy().await.unwrap();
}

#[tokio::test]
async fn handler_errors_surface_with_the_original_reason() {
  let system = test_system().await;
  let def = BehaviorDef::local("Thrower", || {
    Handlers::new("Thrower").on("fail", |_payload, _ctx| async move { Err(ErrorReason::from("on purpose")) })
  });
  let actor = system.root_actor().create_child(def, ChildOptions::default()).await.unwrap();
  let error = actor.send_and_receive("fail", Value::Null).await.unwrap_err();
  assert_eq!(error, ActorError::HandlerFailure(ErrorReason::from("on purpose")));
  system.destroy().await.unwrap();
}

#[tokio::test]
async fn destroy_is_idempotent() {
  let system = test_system().await;
  let def = BehaviorDef::local("Twice", || Handlers::new("Twice"));
  let actor = system.root_actor().create_child(def, ChildOptions::default()).await.unwrap();
  actor.destroy().await.unwrap();
  actor.destroy().await.unwrap();
  system.destroy().await.unwrap();
}

#[tokio::test]
async fn parent_resolves_through_the_tree_and_root_has_none() {
  let system = test_system().await;
  let def = BehaviorDef::local("Child", || Handlers::new("Child"));
  let actor = system.root_actor().create_child(def, ChildOptions::default()).await.unwrap();
  let parent = actor.parent().unwrap();
  assert_eq!(parent.id(), system.root_actor().id());
  assert!(system.root_actor().parent().is_none());
  system.destroy().await.unwrap();
}
