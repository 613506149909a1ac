//! Category and event-type names published by the controller.
//!
//! Single source of truth for the strings observers match on.

use super::event_bus::BusEvent;

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

pub const CATEGORY_RUN: &str = "run";
pub const CATEGORY_AGENT: &str = "agent";
pub const CATEGORY_LOG: &str = "log";
pub const CATEGORY_RESULT: &str = "result";

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

pub const EVENT_RUN_STATE_CHANGED: &str = "run.state_changed";
pub const EVENT_RUN_RESET: &str = "run.reset";
pub const EVENT_AGENT_STATUS_CHANGED: &str = "agent.status_changed";
pub const EVENT_LOG_APPENDED: &str = "log.appended";
pub const EVENT_RESULTS_LOADED: &str = "result.loaded";

/// True for events after which a run-following observer can stop listening.
pub fn is_run_finished(event: &BusEvent) -> bool {
    if event.event_type != EVENT_RUN_STATE_CHANGED {
        return false;
    }
    matches!(
        event.payload.get("state").and_then(|s| s.as_str()),
        Some("completed") | Some("error")
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn event(event_type: &str, payload: serde_json::Value) -> BusEvent {
        BusEvent {
            id: "e1".to_string(),
            run_id: Some("wf-1".to_string()),
            seq: 0,
            category: CATEGORY_RUN.to_string(),
            event_type: event_type.to_string(),
            payload,
            created_at: "2025-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn terminal_state_changes_finish_the_run() {
        assert!(is_run_finished(&event(
            EVENT_RUN_STATE_CHANGED,
            json!({"state": "completed"})
        )));
        assert!(is_run_finished(&event(
            EVENT_RUN_STATE_CHANGED,
            json!({"state": "error"})
        )));
        assert!(!is_run_finished(&event(
            EVENT_RUN_STATE_CHANGED,
            json!({"state": "executing"})
        )));
        assert!(!is_run_finished(&event(
            EVENT_LOG_APPENDED,
            json!({"state": "completed"})
        )));
    }
}
