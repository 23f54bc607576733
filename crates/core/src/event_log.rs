//! Append-only log of every protocol event seen in a session.
//!
//! The connector owns the single [`EventLog`] writer. Consumers hold an
//! [`EventLogReader`] and keep their own [`ProcessedEvents`] set, because each
//! consumer filters the log differently and a shared cursor would not fit them all.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, RwLock};
use tokio::sync::watch;

/// Monotonic within a session; the dedup key for consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EventId(u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Client,
    Server,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggedEvent {
    pub id: EventId,
    pub direction: Direction,
    pub name: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl LoggedEvent {
    /// The `response.id` carried by response lifecycle events.
    pub fn response_id(&self) -> Option<&str> {
        self.payload
            .pointer("/response/id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    pub fn is_response_done(&self) -> bool {
        self.direction == Direction::Server && self.name == "response.done"
    }
}

type Entries = Arc<RwLock<Vec<Arc<LoggedEvent>>>>;

/// The writer half. Not `Clone`: exactly one owner appends.
pub struct EventLog {
    entries: Entries,
    next_id: u64,
    appended: watch::Sender<usize>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        let (appended, _) = watch::channel(0);
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            next_id: 1,
            appended,
        }
    }

    pub fn reader(&self) -> EventLogReader {
        EventLogReader {
            entries: self.entries.clone(),
            appended: self.appended.subscribe(),
        }
    }

    pub fn append(&mut self, direction: Direction, name: &str, payload: Value) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        let event = Arc::new(LoggedEvent {
            id,
            direction,
            name: name.to_string(),
            payload,
            timestamp: Utc::now(),
        });

        let len = {
            // A poisoned lock only means a reader panicked mid-clone; the Vec is intact.
            let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
            entries.push(event);
            entries.len()
        };
        tracing::trace!(event_id = %id, ?direction, name, "event logged");
        self.appended.send_replace(len);
        id
    }

    /// Appends a serializable protocol event, named after its `type` field.
    pub fn append_typed<T: Serialize>(&mut self, direction: Direction, event: &T) -> EventId {
        let payload = serde_json::to_value(event).unwrap_or_else(|e| {
            tracing::warn!("event could not be serialized for the log: {}", e);
            Value::Null
        });
        let name = payload
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        self.append(direction, &name, payload)
    }
}

/// Read-only view shared by consumers.
#[derive(Clone)]
pub struct EventLogReader {
    entries: Entries,
    appended: watch::Receiver<usize>,
}

impl EventLogReader {
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or_else(|e| e.into_inner().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<Arc<LoggedEvent>> {
        self.since(0)
    }

    /// Events from position `start` onward, in arrival order.
    pub fn since(&self, start: usize) -> Vec<Arc<LoggedEvent>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(start..).map(<[_]>::to_vec).unwrap_or_default()
    }

    /// Resolves once something new has been appended. `false` means the writer is gone.
    pub async fn changed(&mut self) -> bool {
        self.appended.changed().await.is_ok()
    }
}

/// Per-consumer record of already handled event ids.
#[derive(Debug, Default)]
pub struct ProcessedEvents {
    ids: HashSet<EventId>,
}

impl ProcessedEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `id` as processed. Returns `false` if it already was.
    pub fn mark(&mut self, id: EventId) -> bool {
        self.ids.insert(id)
    }

    pub fn contains(&self, id: EventId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
