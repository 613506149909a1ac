//! Decoding of push-channel payloads.
//!
//! Every `data:` payload is a JSON envelope `{ "type": ..., "data": {...}, ... }`.
//! Some kinds put their fields inside `data`, others (errors, completion) at
//! the top level, so field lookup checks `data` first and then the envelope.
//! Decoding never fails: bad input becomes [`StreamEvent::Malformed`].

use std::fmt;

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    AgentStarted,
    AgentProgress,
    AgentCompleted,
    WorkflowCompleted,
    Error,
    Unknown,
    Malformed,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Connected => "connected",
            EventKind::AgentStarted => "agent_started",
            EventKind::AgentProgress => "agent_progress",
            EventKind::AgentCompleted => "agent_completed",
            EventKind::WorkflowCompleted => "workflow_completed",
            EventKind::Error => "error",
            EventKind::Unknown => "unknown",
            EventKind::Malformed => "malformed",
        }
    }

    fn from_wire(kind: &str) -> Self {
        match kind {
            "connected" => EventKind::Connected,
            "agent_started" => EventKind::AgentStarted,
            "agent_progress" => EventKind::AgentProgress,
            "agent_completed" => EventKind::AgentCompleted,
            "workflow_completed" => EventKind::WorkflowCompleted,
            "error" => EventKind::Error,
            _ => EventKind::Unknown,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EventKind::WorkflowCompleted | EventKind::Error)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields shared by the agent-scoped kinds.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AgentUpdate {
    pub agent_id: String,
    pub agent_name: Option<String>,
    pub task: Option<String>,
    pub message: Option<String>,
    /// Raw progress as sent; clamping happens in the registry.
    pub progress: Option<i64>,
    pub result_summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Connected {
        workflow_id: Option<String>,
        message: Option<String>,
    },
    AgentStarted(AgentUpdate),
    AgentProgress(AgentUpdate),
    AgentCompleted(AgentUpdate),
    WorkflowCompleted {
        workflow_id: Option<String>,
        status: Option<String>,
        message: Option<String>,
        /// Result bundle some servers inline into the completion event.
        results: Option<Value>,
    },
    Error {
        message: String,
    },
    Unknown {
        kind: String,
    },
    Malformed {
        reason: String,
    },
}

pub(crate) const PARSE_ERROR_MESSAGE: &str = "Error parsing server response";

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl Envelope {
    fn field(&self, key: &str) -> Option<&Value> {
        self.data
            .as_ref()
            .and_then(|d| d.get(key))
            .filter(|v| !v.is_null())
            .or_else(|| self.extra.get(key).filter(|v| !v.is_null()))
    }

    fn string(&self, key: &str) -> Option<String> {
        self.field(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    fn number(&self, key: &str) -> Option<i64> {
        let value = self.field(key)?;
        match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.round() as i64)),
            Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f.round() as i64),
            _ => None,
        }
    }
}

impl StreamEvent {
    /// Decode one `data:` payload.
    pub fn decode(raw: &str) -> Self {
        match serde_json::from_str::<Envelope>(raw) {
            Ok(envelope) => Self::from_envelope(envelope),
            Err(e) => match sniff_kind(raw) {
                // The server said it was done but the body is unusable; treat
                // it as a terminal failure so the run does not hang.
                Some(kind) if kind.is_terminal() => StreamEvent::Error {
                    message: PARSE_ERROR_MESSAGE.to_string(),
                },
                _ => StreamEvent::Malformed {
                    reason: e.to_string(),
                },
            },
        }
    }

    fn from_envelope(envelope: Envelope) -> Self {
        let kind = EventKind::from_wire(envelope.kind.as_str());
        match kind {
            EventKind::Connected => StreamEvent::Connected {
                workflow_id: envelope.string("workflow_id"),
                message: envelope.string("message"),
            },
            EventKind::AgentStarted | EventKind::AgentProgress | EventKind::AgentCompleted => {
                let Some(agent_id) = envelope.string("agent_id") else {
                    return StreamEvent::Malformed {
                        reason: format!("{} event without agent_id", kind),
                    };
                };
                let update = AgentUpdate {
                    agent_id,
                    agent_name: envelope.string("agent_name"),
                    task: envelope.string("task").or_else(|| envelope.string("step")),
                    message: envelope.string("message"),
                    progress: envelope.number("progress"),
                    result_summary: envelope
                        .string("result_summary")
                        .or_else(|| envelope.string("result")),
                };
                match kind {
                    EventKind::AgentStarted => StreamEvent::AgentStarted(update),
                    EventKind::AgentProgress => StreamEvent::AgentProgress(update),
                    _ => StreamEvent::AgentCompleted(update),
                }
            }
            EventKind::WorkflowCompleted => StreamEvent::WorkflowCompleted {
                workflow_id: envelope.string("workflow_id"),
                status: envelope.string("status"),
                message: envelope.string("message"),
                results: envelope.field("results").cloned(),
            },
            EventKind::Error => StreamEvent::Error {
                message: envelope
                    .string("message")
                    .or_else(|| envelope.string("error"))
                    .unwrap_or_else(|| "Unknown error".to_string()),
            },
            _ => StreamEvent::Unknown {
                kind: envelope.kind,
            },
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            StreamEvent::Connected { .. } => EventKind::Connected,
            StreamEvent::AgentStarted(_) => EventKind::AgentStarted,
            StreamEvent::AgentProgress(_) => EventKind::AgentProgress,
            StreamEvent::AgentCompleted(_) => EventKind::AgentCompleted,
            StreamEvent::WorkflowCompleted { .. } => EventKind::WorkflowCompleted,
            StreamEvent::Error { .. } => EventKind::Error,
            StreamEvent::Unknown { .. } => EventKind::Unknown,
            StreamEvent::Malformed { .. } => EventKind::Malformed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.kind().is_terminal()
    }

    pub fn agent_id(&self) -> Option<&str> {
        match self {
            StreamEvent::AgentStarted(update)
            | StreamEvent::AgentProgress(update)
            | StreamEvent::AgentCompleted(update) => Some(update.agent_id.as_str()),
            _ => None,
        }
    }
}

/// Best-effort read of the `"type"` value from text that is not valid JSON.
fn sniff_kind(raw: &str) -> Option<EventKind> {
    let after_key = &raw[raw.find("\"type\"")? + "\"type\"".len()..];
    let after_colon = after_key.trim_start().strip_prefix(':')?.trim_start();
    let value = after_colon.strip_prefix('"')?;
    let end = value.find('"')?;
    Some(EventKind::from_wire(&value[..end]))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_agent_progress_from_data_object() {
        let event = StreamEvent::decode(
            r#"{"type":"agent_progress","data":{"agent_id":"content_creator","agent_name":"Content Creator","task":"Drafting lesson 2","progress":40}}"#,
        );
        assert_eq!(
            event,
            StreamEvent::AgentProgress(AgentUpdate {
                agent_id: "content_creator".to_string(),
                agent_name: Some("Content Creator".to_string()),
                task: Some("Drafting lesson 2".to_string()),
                progress: Some(40),
                ..AgentUpdate::default()
            })
        );
        assert_eq!(event.agent_id(), Some("content_creator"));
    }

    #[test]
    fn reads_error_message_from_top_level() {
        let event = StreamEvent::decode(r#"{"type":"error","message":"model quota exceeded"}"#);
        assert_eq!(
            event,
            StreamEvent::Error {
                message: "model quota exceeded".to_string()
            }
        );
        assert!(event.is_terminal());
    }

    #[test]
    fn completion_keeps_status_and_inline_results() {
        let event = StreamEvent::decode(
            r#"{"type":"workflow_completed","status":"completed","message":"done","data":{"results":{"lessons":3}}}"#,
        );
        match event {
            StreamEvent::WorkflowCompleted {
                status,
                message,
                results,
                ..
            } => {
                assert_eq!(status.as_deref(), Some("completed"));
                assert_eq!(message.as_deref(), Some("done"));
                assert_eq!(results, Some(json!({"lessons": 3})));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn unknown_kind_is_preserved() {
        let event = StreamEvent::decode(r#"{"type":"agent_thinking","data":{}}"#);
        assert_eq!(
            event,
            StreamEvent::Unknown {
                kind: "agent_thinking".to_string()
            }
        );
        assert!(!event.is_terminal());
    }

    #[test]
    fn agent_event_without_agent_id_is_malformed() {
        let event = StreamEvent::decode(r#"{"type":"agent_started","data":{"task":"x"}}"#);
        assert_eq!(event.kind(), EventKind::Malformed);
    }

    #[test]
    fn garbage_is_malformed_but_broken_terminal_is_an_error() {
        assert_eq!(StreamEvent::decode("not json").kind(), EventKind::Malformed);
        assert_eq!(StreamEvent::decode(r#"{"data":{}}"#).kind(), EventKind::Malformed);

        let event = StreamEvent::decode(r#"{"type": "workflow_completed", "data": {"#);
        assert_eq!(
            event,
            StreamEvent::Error {
                message: PARSE_ERROR_MESSAGE.to_string()
            }
        );
    }

    #[test]
    fn progress_accepts_floats_and_numeric_strings() {
        let event =
            StreamEvent::decode(r#"{"type":"agent_progress","data":{"agent_id":"a","progress":"62.6"}}"#);
        match event {
            StreamEvent::AgentProgress(update) => assert_eq!(update.progress, Some(63)),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
