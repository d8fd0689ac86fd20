//! A hierarchical actor runtime. Actors are isolated stateful units in a
//! parent/child tree, addressed through location-transparent refs and
//! communicating by asynchronous topic messages. An actor runs in-process,
//! in a forked child process, or on a remote host behind one API, and a
//! logical ref can fan out over N replicas through a router with pluggable
//! balancing, crash detection and respawn.
//!
//! ```ignore
//! use serde_json::json;
//! use troupe::{ActorSystem, BehaviorDef, Handlers, SystemConfig};
//!
//! troupe::init(); // first thing in main: worker processes never return
//!
//! let system = ActorSystem::new(SystemConfig::default()).await?;
//! let greeter = BehaviorDef::local("Greeter", || {
//!   Handlers::new("Greeter").on("greet", |payload, _ctx| async move {
//!     Ok(json!(format!("hello, {}", payload["name"].as_str().unwrap_or("world"))))
//!   })
//! });
//! let child = system.root_actor().create_child(greeter, Default::default()).await?;
//! let reply = child.send_and_receive("greet", json!({ "name": "troupe" })).await?;
//! system.destroy().await?;
//! ```

pub mod actor;
pub mod behavior;
pub mod error;
pub mod logging;
pub mod message;
pub mod remote;
pub mod resources;
pub mod router;
pub mod system;

#[cfg(test)]
mod behavior_test;
#[cfg(test)]
mod logging_test;
#[cfg(test)]
mod resources_test;

pub use actor::{ActorContext, ActorId, ActorRef, ChildOptions, Mode, OnCrash};
pub use behavior::{register_behavior, register_behavior_with_dependencies, Behavior, BehaviorDef, Handlers};
pub use error::{ActorError, ErrorReason};
pub use logging::{register_logger, LogHandle, LogLevel, Logger, LoggerSpec};
pub use remote::fork::{init, WorkerLauncher, FORK_TEST_ENTRY};
pub use resources::{Resource, ResourceDef};
pub use router::balancer::{Balancer, BalancerFactory, ForwardTarget};
pub use system::{ActorSystem, SystemConfig};
