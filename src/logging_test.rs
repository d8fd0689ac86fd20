use std::any::Any;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::ActorError;
use crate::logging::{register_logger, LogLevel, Logger, LoggerFactory, LoggerSpec};

#[derive(Debug, Default)]
struct CapturingLogger {
  entries: Mutex<Vec<(LogLevel, String, String)>>,
}

impl CapturingLogger {
  fn entries(&self) -> Vec<(LogLevel, String, String)> {
    self.entries.lock().unwrap().clone()
  }

  fn push(&self, level: LogLevel, category: &str, message: &str) {
    self
      .entries
      .lock()
      .unwrap()
      .push((level, category.to_string(), message.to_string()));
  }
}

impl Logger for CapturingLogger {
  fn error(&self, category: &str, message: &str) {
    self.push(LogLevel::Error, category, message);
  }

  fn warn(&self, category: &str, message: &str) {
    self.push(LogLevel::Warn, category, message);
  }

  fn info(&self, category: &str, message: &str) {
    self.push(LogLevel::Info, category, message);
  }

  fn debug(&self, category: &str, message: &str) {
    self.push(LogLevel::Debug, category, message);
  }

  fn as_any(&self) -> &dyn Any {
    self
  }
}

#[test]
fn levels_are_ordered_and_parseable() {
  assert!(LogLevel::Silent < LogLevel::Error);
  assert!(LogLevel::Error < LogLevel::Warn);
  assert!(LogLevel::Warn < LogLevel::Info);
  assert!(LogLevel::Info < LogLevel::Debug);
  assert_eq!(LogLevel::parse("Info"), Some(LogLevel::Info));
  assert_eq!(LogLevel::parse("SILENT"), Some(LogLevel::Silent));
  assert_eq!(LogLevel::parse("verbose"), None);
}

#[test]
fn categories_gate_emission() {
  register_logger("capture-gate", CapturingLogger::default);
  let mut categories = HashMap::new();
  categories.insert("default".to_string(), LogLevel::Silent);
  categories.insert("Chatty".to_string(), LogLevel::Info);
  let factory = LoggerFactory::new(&LoggerSpec::Named("capture-gate".to_string()), categories).unwrap();

  let chatty = factory.handle("Chatty");
  chatty.info("visible");
  chatty.debug("gated");
  let muted = factory.handle("Quiet");
  muted.error("gated by default");

  let implementation = factory.implementation();
  let capture = implementation.as_any().downcast_ref::<CapturingLogger>().unwrap();
  let entries = capture.entries();
  assert_eq!(entries.len(), 1);
  assert_eq!(entries[0], (LogLevel::Info, "Chatty".to_string(), "visible".to_string()));
}

#[test]
fn default_level_applies_when_no_entry_matches() {
  register_logger("capture-default", CapturingLogger::default);
  let factory = LoggerFactory::new(&LoggerSpec::Named("capture-default".to_string()), HashMap::new()).unwrap();
  let handle = factory.handle("Anything");
  assert_eq!(handle.level(), LogLevel::Info);
  handle.debug("gated");
  handle.warn("visible");

  let implementation = factory.implementation();
  let capture = implementation.as_any().downcast_ref::<CapturingLogger>().unwrap();
  assert_eq!(capture.entries().len(), 1);
}

#[test]
fn unknown_logger_name_is_invalid_configuration() {
  let error = LoggerFactory::new(&LoggerSpec::Named("nope".to_string()), HashMap::new()).unwrap_err();
  assert!(matches!(error, ActorError::InvalidConfig(_)));
}
