use serde_json::{json, Value};

use crate::behavior::{lookup_behavior, register_behavior, BehaviorDef, Handlers};
use crate::system::{ActorSystem, SystemConfig};

#[tokio::test]
async fn handler_table_dispatches_by_topic() {
  let system = ActorSystem::new(SystemConfig::default()).await.unwrap();
  let def = BehaviorDef::local("Adder", || {
    Handlers::new("Adder").on("add", |payload: Value, _ctx| async move {
      let a = payload["a"].as_i64().unwrap_or(0);
      let b = payload["b"].as_i64().unwrap_or(0);
      Ok(json!(a + b))
    })
  });
  let actor = system.root_actor().create_child(def, Default::default()).await.unwrap();
  let sum = actor.send_and_receive("add", json!({ "a": 2, "b": 3 })).await.unwrap();
  assert_eq!(sum, json!(5));
  system.destroy().await.unwrap();
}

#[tokio::test]
async fn unknown_topic_is_a_no_op() {
  let system = ActorSystem::new(SystemConfig::default()).await.unwrap();
  let def = BehaviorDef::local("Sparse", || Handlers::new("Sparse"));
  let actor = system.root_actor().create_child(def, Default::default()).await.unwrap();
  let reply = actor.send_and_receive("anything", Value::Null).await.unwrap();
  assert_eq!(reply, Value::Null);
  system.destroy().await.unwrap();
}

#[test]
fn registration_is_resolvable_and_idempotent() {
  register_behavior("Registered", || Handlers::new("Registered"));
  register_behavior("Registered", || Handlers::new("Registered"));
  assert!(lookup_behavior("Registered").is_some());
  assert!(lookup_behavior("Unregistered").is_none());
}

#[tokio::test]
async fn unregistered_definitions_fail_spawn() {
  let system = ActorSystem::new(SystemConfig::default()).await.unwrap();
  let error = system
    .root_actor()
    .create_child(BehaviorDef::registered("NeverRegistered"), Default::default())
    .await
    .unwrap_err();
  assert!(matches!(error, crate::error::ActorError::InvalidConfig(_)));
  system.destroy().await.unwrap();
}
