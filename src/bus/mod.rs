//! Event system for read-only observers of a monitored run.
//!
//! The controller is the only publisher. Every change it makes to the run,
//! an agent's status, the display log or the result bundle is mirrored onto
//! an in-memory broadcast channel so a CLI or UI can follow along without
//! touching controller state.

mod event_bus;
pub mod event_types;

pub use event_bus::{BusEvent, EventBus};
