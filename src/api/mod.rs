//! HTTP client for the workflow service.
//!
//! [`WorkflowApi`] is the seam the controller depends on (start, health and
//! result fetching); [`HttpWorkflowApi`] also exposes the status, agent
//! catalog and package endpoints used by the CLI.

mod client;
mod error;
mod types;

pub use client::{HttpWorkflowApi, WorkflowApi};
pub use error::ApiError;
pub use types::{AgentDescriptor, ResultBundle, StartResponse, WorkflowStatusView};
