use crate::Item;
use crate::audio::Base64EncodedAudioBytes;
use crate::session::Session;
use serde::{Deserialize, Serialize};

/// `session.update`. Only the fields set on `session` are sent, so a partial
/// update leaves the rest of the server-side session untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionUpdateEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    event_id: Option<String>,
    session: Session,
}

impl SessionUpdateEvent {
    pub fn new(session: Session) -> Self {
        Self { event_id: None, session }
    }
}

/// `input_audio_buffer.append`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputAudioBufferAppendEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    event_id: Option<String>,
    /// Base64 PCM16 at 24 kHz
    audio: Base64EncodedAudioBytes,
}

impl InputAudioBufferAppendEvent {
    pub fn new(audio: Base64EncodedAudioBytes) -> Self {
        Self { event_id: None, audio }
    }
}

/// Body of events that carry nothing but their type: `input_audio_buffer.commit`,
/// `input_audio_buffer.clear` and `response.cancel`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BareEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    event_id: Option<String>,
}

impl BareEvent {
    pub fn new() -> Self {
        Self::default()
    }
}

/// `conversation.item.create`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationItemCreateEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    event_id: Option<String>,
    /// Insert after this item instead of at the end.
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_item_id: Option<String>,
    item: Item,
}

impl ConversationItemCreateEvent {
    pub fn new(item: Item) -> Self {
        Self {
            event_id: None,
            previous_item_id: None,
            item,
        }
    }
}

/// `response.create`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseCreateEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    event_id: Option<String>,
    /// Overrides of the session settings for this response only.
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<Session>,
}

impl ResponseCreateEvent {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClientEvent;

    #[test]
    fn unset_fields_stay_off_the_wire() {
        let commit = serde_json::to_value(ClientEvent::InputAudioBufferCommit(BareEvent::new())).unwrap();
        assert_eq!(commit, serde_json::json!({ "type": "input_audio_buffer.commit" }));

        let append = serde_json::to_value(ClientEvent::InputAudioBufferAppend(
            InputAudioBufferAppendEvent::new("AAAA".to_string()),
        ))
        .unwrap();
        assert_eq!(
            append,
            serde_json::json!({ "type": "input_audio_buffer.append", "audio": "AAAA" })
        );
    }
}
