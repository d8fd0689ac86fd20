use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{ActorError, ErrorReason};
use crate::resources::{Resource, ResourceRegistry};

#[derive(Debug)]
struct RecordingResource {
  tag: &'static str,
  record: Arc<Mutex<Vec<&'static str>>>,
}

#[async_trait]
impl Resource for RecordingResource {
  async fn destroy(&self) -> Result<(), ErrorReason> {
    self.record.lock().await.push(self.tag);
    Ok(())
  }

  fn as_any(&self) -> &dyn Any {
    self
  }
}

#[derive(Debug)]
struct FailingResource;

#[async_trait]
impl Resource for FailingResource {
  async fn destroy(&self) -> Result<(), ErrorReason> {
    Err(ErrorReason::from("boom"))
  }

  fn as_any(&self) -> &dyn Any {
    self
  }
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
  let registry = ResourceRegistry::new();
  let record = Arc::new(Mutex::new(Vec::new()));
  registry
    .register(
      "db",
      Arc::new(RecordingResource {
        tag: "a",
        record: record.clone(),
      }),
    )
    .await
    .unwrap();
  let error = registry
    .register("db", Arc::new(RecordingResource { tag: "b", record }))
    .await
    .unwrap_err();
  assert_eq!(error, ActorError::DuplicateResource("db".to_string()));
}

#[tokio::test]
async fn unknown_resource_fails_resolution() {
  let registry = ResourceRegistry::new();
  let error = registry.resolve("missing").await.unwrap_err();
  assert_eq!(error, ActorError::UnknownResource("missing".to_string()));
}

#[tokio::test]
async fn destroy_all_runs_in_reverse_registration_order() {
  let registry = ResourceRegistry::new();
  let record = Arc::new(Mutex::new(Vec::new()));
  for tag in ["first", "second", "third"] {
    registry
      .register(
        tag,
        Arc::new(RecordingResource {
          tag,
          record: record.clone(),
        }),
      )
      .await
      .unwrap();
  }
  registry.destroy_all().await;
  assert_eq!(*record.lock().await, vec!["third", "second", "first"]);
}

#[tokio::test]
async fn destroy_failures_are_swallowed() {
  let registry = ResourceRegistry::new();
  let record = Arc::new(Mutex::new(Vec::new()));
  registry
    .register(
      "ok",
      Arc::new(RecordingResource {
        tag: "ok",
        record: record.clone(),
      }),
    )
    .await
    .unwrap();
  registry.register("bad", Arc::new(FailingResource)).await.unwrap();
  registry.destroy_all().await;
  assert_eq!(*record.lock().await, vec!["ok"]);
}
