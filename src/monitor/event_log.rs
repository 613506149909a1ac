use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    System,
    Agent,
    Progress,
    Success,
    Error,
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogKind::System => "system",
            LogKind::Agent => "agent",
            LogKind::Progress => "progress",
            LogKind::Success => "success",
            LogKind::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// `{millis}-{seq}-{nonce}`; unique even for entries in the same millisecond.
    pub id: String,
    pub seq: u64,
    pub kind: LogKind,
    pub text: String,
    pub agent_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Append-only display log for one run.
#[derive(Debug, Default)]
pub struct EventLog {
    entries: Vec<LogEntry>,
    next_seq: u64,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(
        &mut self,
        kind: LogKind,
        text: impl Into<String>,
        agent_id: Option<&str>,
    ) -> &LogEntry {
        let timestamp = Utc::now();
        let seq = self.next_seq;
        self.next_seq += 1;
        let nonce: u32 = rand::thread_rng().gen();

        self.entries.push(LogEntry {
            id: format!("{}-{}-{:08x}", timestamp.timestamp_millis(), seq, nonce),
            seq,
            kind,
            text: text.into(),
            agent_id: agent_id.map(str::to_string),
            timestamp,
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count_of(&self, kind: LogKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }

    /// Drop every entry. Sequence numbers keep counting so ids stay unique
    /// across resets.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn entries_are_ordered_and_ids_unique() {
        let mut log = EventLog::new();
        for i in 0..200 {
            log.append(LogKind::Progress, format!("step {i}"), Some("content_creator"));
        }

        let ids: HashSet<&str> = log.entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids.len(), 200);
        assert!(log.entries().windows(2).all(|w| w[0].seq < w[1].seq));
        assert!(log
            .entries()
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn clear_empties_but_keeps_counting() {
        let mut log = EventLog::new();
        log.append(LogKind::System, "Connected", None);
        log.append(LogKind::Error, "boom", None);
        assert_eq!(log.count_of(LogKind::Error), 1);

        log.clear();
        assert!(log.is_empty());

        let entry = log.append(LogKind::System, "again", None);
        assert_eq!(entry.seq, 2);
        assert!(entry.id.contains("-2-"));
    }
}
