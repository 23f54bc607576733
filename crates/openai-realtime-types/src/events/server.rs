mod error;
mod resources;

pub use error::ErrorDetails;
pub use resources::*;

use serde::{Deserialize, Serialize};

/// Borrowing accessors for wire fields, `accessors!(Event { field: Type })`.
macro_rules! accessors {
    ($event:ty { $($field:ident: $ty:ty),* $(,)? }) => {
        impl $event {
            $(
                pub fn $field(&self) -> &$ty {
                    &self.$field
                }
            )*
        }
    };
}

/// `error`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEvent {
    #[serde(default)]
    event_id: String,
    error: ErrorDetails,
}
accessors!(ErrorEvent { error: ErrorDetails });

/// `session.created`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCreatedEvent {
    event_id: String,
    session: SessionResource,
}
accessors!(SessionCreatedEvent { session: SessionResource });

/// `session.updated`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionUpdatedEvent {
    event_id: String,
    session: SessionResource,
}
accessors!(SessionUpdatedEvent { session: SessionResource });

/// `input_audio_buffer.committed`: the user turn that will become `item_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputAudioBufferCommittedEvent {
    event_id: String,
    #[serde(default)]
    previous_item_id: Option<String>,
    item_id: String,
}
accessors!(InputAudioBufferCommittedEvent { item_id: str });

/// `input_audio_buffer.speech_started`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputAudioBufferSpeechStartedEvent {
    event_id: String,
    /// Offset from session start.
    #[serde(default)]
    audio_start_ms: u32,
    item_id: String,
}
accessors!(InputAudioBufferSpeechStartedEvent { item_id: str, audio_start_ms: u32 });

/// `input_audio_buffer.speech_stopped`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputAudioBufferSpeechStoppedEvent {
    event_id: String,
    #[serde(default)]
    audio_end_ms: u32,
    item_id: String,
}
accessors!(InputAudioBufferSpeechStoppedEvent { item_id: str, audio_end_ms: u32 });

/// `conversation.item.created`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationItemCreatedEvent {
    event_id: String,
    #[serde(default)]
    previous_item_id: Option<String>,
    item: ItemResource,
}
accessors!(ConversationItemCreatedEvent { item: ItemResource });

/// `conversation.item.input_audio_transcription.completed`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationItemInputAudioTranscriptionCompletedEvent {
    event_id: String,
    item_id: String,
    #[serde(default)]
    content_index: u32,
    transcript: String,
}
accessors!(ConversationItemInputAudioTranscriptionCompletedEvent {
    item_id: str,
    transcript: str,
});

/// `response.created`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseCreatedEvent {
    event_id: String,
    response: ResponseResource,
}
accessors!(ResponseCreatedEvent { response: ResponseResource });

/// `response.done`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseDoneEvent {
    event_id: String,
    response: ResponseResource,
}
accessors!(ResponseDoneEvent { response: ResponseResource });

/// `response.output_item.done`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseOutputItemDoneEvent {
    event_id: String,
    response_id: String,
    #[serde(default)]
    output_index: u32,
    item: ItemResource,
}
accessors!(ResponseOutputItemDoneEvent { response_id: str, item: ItemResource });

/// Position of a streamed part inside a response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentRef {
    pub response_id: String,
    pub item_id: String,
    #[serde(default)]
    pub output_index: u32,
    #[serde(default)]
    pub content_index: u32,
}

/// `response.text.delta` and `response.audio_transcript.delta`: a text
/// fragment of item `item_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextDeltaEvent {
    event_id: String,
    #[serde(flatten)]
    part: ContentRef,
    delta: String,
}
accessors!(TextDeltaEvent { part: ContentRef, delta: str });

/// `response.text.done`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseTextDoneEvent {
    event_id: String,
    #[serde(flatten)]
    part: ContentRef,
    text: String,
}
accessors!(ResponseTextDoneEvent { part: ContentRef, text: str });

/// `response.audio_transcript.done`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseAudioTranscriptDoneEvent {
    event_id: String,
    #[serde(flatten)]
    part: ContentRef,
    transcript: String,
}
accessors!(ResponseAudioTranscriptDoneEvent { part: ContentRef, transcript: str });

/// `response.audio.delta`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseAudioDeltaEvent {
    event_id: String,
    #[serde(flatten)]
    part: ContentRef,
    /// Base64 PCM16 chunk
    delta: String,
}
accessors!(ResponseAudioDeltaEvent { part: ContentRef, delta: str });

/// `response.audio.done`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseAudioDoneEvent {
    event_id: String,
    #[serde(flatten)]
    part: ContentRef,
}
accessors!(ResponseAudioDoneEvent { part: ContentRef });
