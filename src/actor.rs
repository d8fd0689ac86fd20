pub mod cell;
pub mod context;
pub mod core_types;
pub mod directory;
pub mod endpoint;
pub mod reference;

#[cfg(test)]
mod cell_test;

pub use context::ActorContext;
pub use core_types::{ActorId, ActorState, ChildOptions, Mode, OnCrash};
pub use reference::ActorRef;
