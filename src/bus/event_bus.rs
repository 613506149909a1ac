use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

const BUS_CAPACITY: usize = 1024;

/// One observable change in the monitor, as seen by read-only subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEvent {
    pub id: String,
    pub run_id: Option<String>,
    pub seq: i64,
    pub category: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: String,
}

pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
    seq: AtomicI64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            tx,
            seq: AtomicI64::new(0),
        }
    }

    /// Publish a pre-built event. Having no subscribers is normal for a
    /// headless controller, so a failed send is only traced.
    pub fn publish(&self, event: BusEvent) {
        if self.tx.receiver_count() == 0 {
            tracing::trace!(event_type = %event.event_type, "no bus subscribers");
            return;
        }
        if let Err(e) = self.tx.send(event) {
            tracing::warn!("event bus publish failed: {e}");
        }
    }

    /// Build and publish an event in one call.
    pub fn emit(
        &self,
        category: impl Into<String>,
        event_type: impl Into<String>,
        run_id: Option<String>,
        payload: serde_json::Value,
    ) -> BusEvent {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let event = BusEvent {
            id: Uuid::new_v4().to_string(),
            run_id,
            seq,
            category: category.into(),
            event_type: event_type.into(),
            payload,
            created_at: Utc::now().to_rfc3339(),
        };
        self.publish(event.clone());
        event
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::bus::event_types::{CATEGORY_LOG, EVENT_LOG_APPENDED};

    #[tokio::test]
    async fn subscribers_receive_events_in_sequence() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(CATEGORY_LOG, EVENT_LOG_APPENDED, Some("wf-1".into()), json!({"text": "a"}));
        bus.emit(CATEGORY_LOG, EVENT_LOG_APPENDED, Some("wf-1".into()), json!({"text": "b"}));

        let first = rx.recv().await.expect("first event");
        let second = rx.recv().await.expect("second event");
        assert_eq!(first.seq + 1, second.seq);
        assert_eq!(first.payload["text"], "a");
        assert_eq!(second.run_id.as_deref(), Some("wf-1"));
    }

    #[test]
    fn emitting_without_subscribers_still_advances_sequence() {
        let bus = EventBus::new();
        let a = bus.emit(CATEGORY_LOG, EVENT_LOG_APPENDED, None, json!({}));
        let b = bus.emit(CATEGORY_LOG, EVENT_LOG_APPENDED, None, json!({}));
        assert_eq!(a.seq, 0);
        assert_eq!(b.seq, 1);
    }
}
