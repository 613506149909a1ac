//! Server-issued workflow identifiers.
//!
//! The remote service hands out an opaque identifier at start time. Every
//! later network call (stream subscription, result fetch, status, package)
//! embeds it in a URL path, so a bad value is rejected here before any
//! request is made.

use thiserror::Error;

/// Placeholder values that show up when an identifier was never assigned
/// upstream. Compared case-insensitively.
const PLACEHOLDER_IDS: &[&str] = &["null", "undefined", "none", "nil"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowIdError {
    #[error("workflow id is empty")]
    Empty,
    #[error("workflow id is a placeholder value: {0}")]
    Placeholder(String),
    #[error("workflow id contains invalid characters: {0}")]
    InvalidCharacters(String),
}

/// Check that `id` is usable as a path segment for the workflow endpoints.
pub fn validate_workflow_id(id: &str) -> Result<&str, WorkflowIdError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(WorkflowIdError::Empty);
    }
    if PLACEHOLDER_IDS
        .iter()
        .any(|placeholder| trimmed.eq_ignore_ascii_case(placeholder))
    {
        return Err(WorkflowIdError::Placeholder(trimmed.to_string()));
    }
    if trimmed.len() != id.len()
        || id
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '/' | '?' | '#' | '\\'))
    {
        return Err(WorkflowIdError::InvalidCharacters(id.to_string()));
    }
    Ok(id)
}

/// Pick the authoritative identifier from the places one might be found.
///
/// Order is: the stable cell written at start, then the run's display state,
/// then a value handed in directly by the caller. The first candidate that
/// passes [`validate_workflow_id`] wins.
pub fn resolve_workflow_id<'a>(
    stable: Option<&'a str>,
    display: Option<&'a str>,
    fallback: Option<&'a str>,
) -> Option<&'a str> {
    [stable, display, fallback]
        .into_iter()
        .flatten()
        .find(|candidate| validate_workflow_id(candidate).is_ok())
}

/// Single-writer storage for the current run's identifier.
///
/// Written once when a start request succeeds and cleared only by a reset.
/// Handlers that run later read it through the controller instead of relying
/// on whatever value was in scope when they were scheduled.
#[derive(Debug, Default, Clone)]
pub struct WorkflowIdCell {
    value: Option<String>,
}

impl WorkflowIdCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `id` if the cell is empty. Returns `false` (and leaves the old
    /// value in place) when an identifier was already written for this run.
    pub fn set(&mut self, id: impl Into<String>) -> bool {
        if self.value.is_some() {
            tracing::warn!("workflow id cell already written; ignoring new value");
            return false;
        }
        self.value = Some(id.into());
        true
    }

    pub fn get(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    pub fn clear(&mut self) {
        self.value = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_server_style_ids() {
        assert_eq!(validate_workflow_id("wf-123"), Ok("wf-123"));
        assert!(validate_workflow_id("edu_workflow_1718000000_ab12").is_ok());
        assert!(validate_workflow_id("550e8400-e29b-41d4-a716-446655440000").is_ok());
    }

    #[test]
    fn rejects_empty_and_placeholder_ids() {
        assert_eq!(validate_workflow_id(""), Err(WorkflowIdError::Empty));
        assert_eq!(validate_workflow_id("   "), Err(WorkflowIdError::Empty));
        assert!(matches!(
            validate_workflow_id("null"),
            Err(WorkflowIdError::Placeholder(_))
        ));
        assert!(matches!(
            validate_workflow_id("Undefined"),
            Err(WorkflowIdError::Placeholder(_))
        ));
    }

    #[test]
    fn rejects_ids_that_would_escape_the_path() {
        assert!(matches!(
            validate_workflow_id("../results"),
            Err(WorkflowIdError::InvalidCharacters(_))
        ));
        assert!(matches!(
            validate_workflow_id("wf 1"),
            Err(WorkflowIdError::InvalidCharacters(_))
        ));
        assert!(matches!(
            validate_workflow_id(" wf-1"),
            Err(WorkflowIdError::InvalidCharacters(_))
        ));
    }

    #[test]
    fn resolution_prefers_stable_then_display_then_fallback() {
        assert_eq!(
            resolve_workflow_id(Some("stable"), Some("display"), Some("direct")),
            Some("stable")
        );
        assert_eq!(
            resolve_workflow_id(None, Some("display"), Some("direct")),
            Some("display")
        );
        assert_eq!(
            resolve_workflow_id(Some(""), Some("null"), Some("direct")),
            Some("direct")
        );
        assert_eq!(resolve_workflow_id(None, None, Some("undefined")), None);
    }

    #[test]
    fn cell_is_written_once_until_cleared() {
        let mut cell = WorkflowIdCell::new();
        assert!(cell.set("wf-1"));
        assert!(!cell.set("wf-2"));
        assert_eq!(cell.get(), Some("wf-1"));

        cell.clear();
        assert!(!cell.is_set());
        assert!(cell.set("wf-2"));
        assert_eq!(cell.get(), Some("wf-2"));
    }
}
