use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{ActorError, ErrorReason};

/// A named singleton shared by every actor in the system. Instances are
/// constructed once at system construction and destroyed after the last
/// actor hook has run.
#[async_trait]
pub trait Resource: Send + Sync + 'static {
  async fn destroy(&self) -> Result<(), ErrorReason> {
    Ok(())
  }

  fn as_any(&self) -> &dyn Any;
}

type ResourceCtor = Arc<dyn Fn() -> Arc<dyn Resource> + Send + Sync>;

/// How a resource enters the system configuration: a name plus a
/// constructor. The name defaults to whatever the definition was created
/// with and is what behaviors reference in their dependency lists.
#[derive(Clone)]
pub struct ResourceDef {
  name: String,
  construct: ResourceCtor,
}

impl ResourceDef {
  pub fn new<R, F>(name: impl Into<String>, construct: F) -> Self
  where
    R: Resource,
    F: Fn() -> R + Send + Sync + 'static, {
    ResourceDef {
      name: name.into(),
      construct: Arc::new(move || Arc::new(construct())),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub(crate) fn construct(&self) -> Arc<dyn Resource> {
    (self.construct)()
  }
}

impl Debug for ResourceDef {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ResourceDef").field("name", &self.name).finish()
  }
}

/// Name -> instance registry. Registration order is retained because
/// `destroy_all` runs hooks in reverse registration order.
#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
  entries: Arc<Mutex<Vec<(String, Arc<dyn Resource>)>>>,
}

impl Debug for dyn Resource {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "Resource")
  }
}

impl ResourceRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn register(&self, name: impl Into<String>, instance: Arc<dyn Resource>) -> Result<(), ActorError> {
    let name = name.into();
    let mut entries = self.entries.lock().await;
    if entries.iter().any(|(existing, _)| *existing == name) {
      return Err(ActorError::DuplicateResource(name));
    }
    entries.push((name, instance));
    Ok(())
  }

  pub async fn resolve(&self, name: &str) -> Result<Arc<dyn Resource>, ActorError> {
    let entries = self.entries.lock().await;
    entries
      .iter()
      .find(|(existing, _)| existing == name)
      .map(|(_, instance)| instance.clone())
      .ok_or_else(|| ActorError::UnknownResource(name.to_string()))
  }

  /// Destroys every registered resource, newest first. Hook failures are
  /// logged and swallowed so one broken resource cannot block the rest.
  pub async fn destroy_all(&self) {
    let mut entries = self.entries.lock().await;
    while let Some((name, instance)) = entries.pop() {
      if let Err(reason) = instance.destroy().await {
        tracing::error!(resource = %name, error = %reason, "resource destroy hook failed");
      }
    }
  }
}
