//! Workflow run monitoring.
//!
//! [`WorkflowController`] owns the run, the agent registry and the display
//! log, and folds stream signals into them one at a time. Everything it
//! changes is mirrored onto the [`crate::bus::EventBus`].

pub mod agents;
mod controller;
mod error;
pub mod event_log;
mod run;

pub use agents::{default_catalog, AgentInfo, AgentRegistry, AgentState, AgentStatus};
pub use controller::WorkflowController;
pub use error::MonitorError;
pub use event_log::{EventLog, LogEntry, LogKind};
pub use run::{RunState, WorkflowRun};

#[cfg(test)]
pub(crate) use controller::{RETRIES_EXHAUSTED_MESSAGE, STREAM_REJECTED_PREFIX};
