//! Shared types used by the API client, the stream client and the controller.

pub mod workflow_id;

pub use workflow_id::{resolve_workflow_id, validate_workflow_id, WorkflowIdCell, WorkflowIdError};
