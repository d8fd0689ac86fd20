use std::any::Any;
use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::ActorError;

/// Emission threshold for one category. Ordering follows declaration order,
/// so `Silent < Error < Warn < Info < Debug`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LogLevel {
  Silent,
  Error,
  Warn,
  Info,
  Debug,
}

impl LogLevel {
  pub fn parse(value: &str) -> Option<LogLevel> {
    match value.to_ascii_lowercase().as_str() {
      "silent" => Some(LogLevel::Silent),
      "error" => Some(LogLevel::Error),
      "warn" => Some(LogLevel::Warn),
      "info" => Some(LogLevel::Info),
      "debug" => Some(LogLevel::Debug),
      _ => None,
    }
  }
}

impl Display for LogLevel {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let text = match self {
      LogLevel::Silent => "silent",
      LogLevel::Error => "error",
      LogLevel::Warn => "warn",
      LogLevel::Info => "info",
      LogLevel::Debug => "debug",
    };
    write!(f, "{}", text)
  }
}

/// The pluggable logger implementation contract. The four methods are the
/// full capability set; the trait bound itself is what validates them at
/// compile time, so the only construction-time failure left is an unknown
/// registered name.
pub trait Logger: Send + Sync + 'static {
  fn error(&self, category: &str, message: &str);
  fn warn(&self, category: &str, message: &str);
  fn info(&self, category: &str, message: &str);
  fn debug(&self, category: &str, message: &str);

  fn as_any(&self) -> &dyn Any;
}

/// Default implementation: forwards to `tracing` with the category attached
/// as a field.
#[derive(Debug, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
  fn error(&self, category: &str, message: &str) {
    tracing::error!(category = category, "{}", message);
  }

  fn warn(&self, category: &str, message: &str) {
    tracing::warn!(category = category, "{}", message);
  }

  fn info(&self, category: &str, message: &str) {
    tracing::info!(category = category, "{}", message);
  }

  fn debug(&self, category: &str, message: &str) {
    tracing::debug!(category = category, "{}", message);
  }

  fn as_any(&self) -> &dyn Any {
    self
  }
}

/// How a logger implementation is referenced in configuration and in spawn
/// frames sent to forked or remote workers. Only the identifier travels;
/// the receiving process resolves it through its own registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoggerSpec {
  #[default]
  Default,
  Named(String),
}

type LoggerCtor = Arc<dyn Fn() -> Arc<dyn Logger> + Send + Sync>;

static LOGGERS: Lazy<DashMap<String, LoggerCtor>> = Lazy::new(DashMap::new);

/// Registers a logger implementation under a name resolvable in this
/// process. Last registration wins, which keeps repeated registration in
/// test binaries harmless.
pub fn register_logger<L, F>(name: impl Into<String>, construct: F)
where
  L: Logger,
  F: Fn() -> L + Send + Sync + 'static, {
  LOGGERS.insert(name.into(), Arc::new(move || Arc::new(construct())));
}

/// Produces per-actor log handles for one system, gated by the
/// category -> level map. `default` applies when no entry matches.
#[derive(Clone)]
pub struct LoggerFactory {
  implementation: Arc<dyn Logger>,
  categories: HashMap<String, LogLevel>,
  default_level: LogLevel,
}

impl LoggerFactory {
  pub fn new(spec: &LoggerSpec, categories: HashMap<String, LogLevel>) -> Result<Self, ActorError> {
    let implementation: Arc<dyn Logger> = match spec {
      LoggerSpec::Default => Arc::new(TracingLogger),
      LoggerSpec::Named(name) => match LOGGERS.get(name) {
        Some(ctor) => ctor(),
        None => {
          return Err(ActorError::config(format!("logger {} is not registered", name)));
        }
      },
    };
    let default_level = categories.get("default").copied().unwrap_or(LogLevel::Info);
    Ok(LoggerFactory {
      implementation,
      categories,
      default_level,
    })
  }

  pub fn handle(&self, category: &str) -> LogHandle {
    let level = self.categories.get(category).copied().unwrap_or(self.default_level);
    LogHandle {
      category: category.to_string(),
      level,
      backend: self.implementation.clone(),
    }
  }

  /// The backing instance, exposed for tests that inject a capturing
  /// implementation.
  pub fn implementation(&self) -> Arc<dyn Logger> {
    self.implementation.clone()
  }
}

impl Debug for LoggerFactory {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("LoggerFactory")
      .field("categories", &self.categories)
      .field("default_level", &self.default_level)
      .finish()
  }
}

/// Thin per-actor wrapper: holds the resolved threshold and delegates to
/// the shared implementation.
#[derive(Clone)]
pub struct LogHandle {
  category: String,
  level: LogLevel,
  backend: Arc<dyn Logger>,
}

impl LogHandle {
  pub fn category(&self) -> &str {
    &self.category
  }

  pub fn level(&self) -> LogLevel {
    self.level
  }

  pub fn error(&self, message: impl AsRef<str>) {
    if self.level >= LogLevel::Error {
      self.backend.error(&self.category, message.as_ref());
    }
  }

  pub fn warn(&self, message: impl AsRef<str>) {
    if self.level >= LogLevel::Warn {
      self.backend.warn(&self.category, message.as_ref());
    }
  }

  pub fn info(&self, message: impl AsRef<str>) {
    if self.level >= LogLevel::Info {
      self.backend.info(&self.category, message.as_ref());
    }
  }

  pub fn debug(&self, message: impl AsRef<str>) {
    if self.level >= LogLevel::Debug {
      self.backend.debug(&self.category, message.as_ref());
    }
  }
}

impl Debug for LogHandle {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("LogHandle")
      .field("category", &self.category)
      .field("level", &self.level)
      .finish()
  }
}
