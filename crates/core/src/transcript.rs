//! Conversation transcript plus breadcrumbs.
//!
//! Same single-writer split as the event log: the connector (or the voice
//! runtime) holds [`Transcript`], everyone else reads through [`TranscriptReader`].

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    InProgress,
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub status: MessageStatus,
    pub created_at_ms: i64,
    pub is_simulated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Breadcrumb {
    pub id: u64,
    pub text: String,
    pub meta: Option<Value>,
    pub created_at_ms: i64,
}

#[derive(Debug, Default)]
struct TranscriptStore {
    messages: Vec<TranscriptMessage>,
    breadcrumbs: Vec<Breadcrumb>,
    next_breadcrumb: u64,
}

impl TranscriptStore {
    fn find_mut(&mut self, id: &str) -> Option<&mut TranscriptMessage> {
        self.messages.iter_mut().find(|m| m.id == id)
    }
}

/// The writer half.
pub struct Transcript {
    store: Arc<RwLock<TranscriptStore>>,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcript {
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(TranscriptStore::default())),
        }
    }

    pub fn reader(&self) -> TranscriptReader {
        TranscriptReader {
            store: self.store.clone(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, TranscriptStore> {
        self.store.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Adds an in-progress message. A second add with a known id is ignored.
    pub fn add_message(&mut self, id: &str, role: Role, content: &str, is_simulated: bool) {
        self.add_message_at(id, role, content, is_simulated, Utc::now().timestamp_millis());
    }

    pub fn add_message_at(
        &mut self,
        id: &str,
        role: Role,
        content: &str,
        is_simulated: bool,
        created_at_ms: i64,
    ) {
        let mut store = self.write();
        if store.find_mut(id).is_some() {
            tracing::debug!(item_id = id, "message already in transcript");
            return;
        }
        store.messages.push(TranscriptMessage {
            id: id.to_string(),
            role,
            content: content.to_string(),
            status: MessageStatus::InProgress,
            created_at_ms,
            is_simulated,
        });
    }

    /// Appends streamed text to a message that is still in progress.
    pub fn append_delta(&mut self, id: &str, delta: &str) {
        let mut store = self.write();
        match store.find_mut(id) {
            Some(message) if message.status == MessageStatus::InProgress => {
                message.content.push_str(delta)
            }
            Some(_) => tracing::debug!(item_id = id, "delta for a finished message ignored"),
            None => tracing::debug!(item_id = id, "delta for unknown message ignored"),
        }
    }

    /// Marks a message done, replacing its text when the final text is known.
    pub fn complete(&mut self, id: &str, final_content: Option<&str>) {
        let mut store = self.write();
        if let Some(message) = store.find_mut(id) {
            if let Some(text) = final_content {
                message.content = text.to_string();
            }
            message.status = MessageStatus::Done;
        } else {
            tracing::debug!(item_id = id, "completion for unknown message ignored");
        }
    }

    pub fn add_breadcrumb(&mut self, text: &str, meta: Option<Value>) {
        let mut store = self.write();
        store.next_breadcrumb += 1;
        let id = store.next_breadcrumb;
        store.breadcrumbs.push(Breadcrumb {
            id,
            text: text.to_string(),
            meta,
            created_at_ms: Utc::now().timestamp_millis(),
        });
    }

    pub fn clear(&mut self) {
        let mut store = self.write();
        store.messages.clear();
        store.breadcrumbs.clear();
    }
}

#[derive(Clone)]
pub struct TranscriptReader {
    store: Arc<RwLock<TranscriptStore>>,
}

impl TranscriptReader {
    fn read(&self) -> RwLockReadGuard<'_, TranscriptStore> {
        self.store.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn messages(&self) -> Vec<TranscriptMessage> {
        self.read().messages.clone()
    }

    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        self.read().breadcrumbs.clone()
    }

    /// Most recent finished message for `role`, by creation time.
    ///
    /// Ties go to the message appended last.
    pub fn latest_completed(&self, role: Role) -> Option<TranscriptMessage> {
        self.read()
            .messages
            .iter()
            .filter(|m| m.role == role && m.status == MessageStatus::Done)
            .max_by_key(|m| m.created_at_ms)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_completed_uses_creation_time_not_arrival() {
        let mut transcript = Transcript::new();
        transcript.add_message_at("b", Role::Assistant, "newer", false, 2_000);
        transcript.add_message_at("a", Role::Assistant, "older", false, 1_000);
        transcript.complete("a", None);
        transcript.complete("b", None);

        let latest = transcript.reader().latest_completed(Role::Assistant).unwrap();
        assert_eq!(latest.id, "b");
    }

    #[test]
    fn in_progress_and_user_messages_are_not_candidates() {
        let mut transcript = Transcript::new();
        transcript.add_message_at("u1", Role::User, "hi", false, 3_000);
        transcript.complete("u1", None);
        transcript.add_message_at("a1", Role::Assistant, "What is Rust?", false, 4_000);

        assert!(transcript.reader().latest_completed(Role::Assistant).is_none());
        transcript.complete("a1", None);
        assert_eq!(
            transcript.reader().latest_completed(Role::Assistant).unwrap().content,
            "What is Rust?"
        );
    }

    #[test]
    fn deltas_accumulate_until_done() {
        let mut transcript = Transcript::new();
        transcript.add_message("a1", Role::Assistant, "", false);
        transcript.append_delta("a1", "Tell me ");
        transcript.append_delta("a1", "about yourself.");
        transcript.complete("a1", None);
        transcript.append_delta("a1", " ignored");

        let message = &transcript.reader().messages()[0];
        assert_eq!(message.content, "Tell me about yourself.");
        assert_eq!(message.status, MessageStatus::Done);
    }

    #[test]
    fn final_text_replaces_streamed_text() {
        let mut transcript = Transcript::new();
        transcript.add_message("a1", Role::Assistant, "", false);
        transcript.append_delta("a1", "Tell me abo");
        transcript.complete("a1", Some("Tell me about yourself."));
        assert_eq!(transcript.reader().messages()[0].content, "Tell me about yourself.");
    }

    #[test]
    fn duplicate_add_keeps_first_message() {
        let mut transcript = Transcript::new();
        transcript.add_message("m", Role::User, "first", true);
        transcript.add_message("m", Role::User, "second", false);
        let messages = transcript.reader().messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "first");
        assert!(messages[0].is_simulated);
    }

    #[test]
    fn clear_drops_messages_and_breadcrumbs() {
        let mut transcript = Transcript::new();
        let reader = transcript.reader();
        transcript.add_message("m", Role::User, "hi", false);
        transcript.add_breadcrumb("Agent: interviewer", None);
        assert_eq!(reader.breadcrumbs().len(), 1);
        transcript.clear();
        assert!(reader.messages().is_empty());
        assert!(reader.breadcrumbs().is_empty());
    }
}
