//! Workflow execution monitor.
//!
//! Starts a long-running workflow on the content-generation service, follows
//! its progress over Server-Sent Events and fetches the final artifact once
//! the run completes.
//!
//! # Architecture
//!
//! - `core`: workflow identifier validation and the stable identifier cell
//! - `stream`: SSE framing, event decoding and the reconnecting stream client
//! - `api`: typed HTTP client for start, results, status, agents and packages
//! - `monitor`: the controller that folds stream signals into run state
//! - `bus`: broadcast of every state change for read-only observers
//! - `config`: `MonitorConfig` defaults and environment overrides

pub mod api;
pub mod bus;
pub mod config;
pub mod core;
pub mod monitor;
pub mod stream;

#[cfg(test)]
mod testing;

#[cfg(test)]
mod tests;

pub use api::{ApiError, HttpWorkflowApi, ResultBundle, WorkflowApi};
pub use bus::{BusEvent, EventBus};
pub use config::{ConfigError, MonitorConfig};
pub use monitor::{MonitorError, RunState, WorkflowController, WorkflowRun};
pub use stream::{StreamClient, StreamEvent, StreamSignal};
