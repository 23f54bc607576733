pub mod client;
pub mod server;

use client::*;
use server::*;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate(SessionUpdateEvent),
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend(InputAudioBufferAppendEvent),
    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioBufferCommit(BareEvent),
    #[serde(rename = "input_audio_buffer.clear")]
    InputAudioBufferClear(BareEvent),
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate(ConversationItemCreateEvent),
    #[serde(rename = "response.create")]
    ResponseCreate(ResponseCreateEvent),
    #[serde(rename = "response.cancel")]
    ResponseCancel(BareEvent),
}

impl ClientEvent {
    /// Wire name of the event, as carried in its `type` field.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::SessionUpdate(_) => "session.update",
            ClientEvent::InputAudioBufferAppend(_) => "input_audio_buffer.append",
            ClientEvent::InputAudioBufferCommit(_) => "input_audio_buffer.commit",
            ClientEvent::InputAudioBufferClear(_) => "input_audio_buffer.clear",
            ClientEvent::ConversationItemCreate(_) => "conversation.item.create",
            ClientEvent::ResponseCreate(_) => "response.create",
            ClientEvent::ResponseCancel(_) => "response.cancel",
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "close")]
    Close { reason: Option<String> },
    #[serde(rename = "error")]
    Error(ErrorEvent),
    #[serde(rename = "session.created")]
    SessionCreated(SessionCreatedEvent),
    #[serde(rename = "session.updated")]
    SessionUpdated(SessionUpdatedEvent),
    #[serde(rename = "input_audio_buffer.committed")]
    InputAudioBufferCommitted(InputAudioBufferCommittedEvent),
    #[serde(rename = "input_audio_buffer.speech_started")]
    InputAudioBufferSpeechStarted(InputAudioBufferSpeechStartedEvent),
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    InputAudioBufferSpeechStopped(InputAudioBufferSpeechStoppedEvent),
    #[serde(rename = "conversation.item.created")]
    ConversationItemCreated(ConversationItemCreatedEvent),
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    ConversationItemInputAudioTranscriptionCompleted(
        ConversationItemInputAudioTranscriptionCompletedEvent,
    ),
    #[serde(rename = "response.created")]
    ResponseCreated(ResponseCreatedEvent),
    #[serde(rename = "response.done")]
    ResponseDone(ResponseDoneEvent),
    #[serde(rename = "response.output_item.done")]
    ResponseOutputItemDone(ResponseOutputItemDoneEvent),
    #[serde(rename = "response.text.delta")]
    ResponseTextDelta(TextDeltaEvent),
    #[serde(rename = "response.text.done")]
    ResponseTextDone(ResponseTextDoneEvent),
    #[serde(rename = "response.audio_transcript.delta")]
    ResponseAudioTranscriptDelta(TextDeltaEvent),
    #[serde(rename = "response.audio_transcript.done")]
    ResponseAudioTranscriptDone(ResponseAudioTranscriptDoneEvent),
    #[serde(rename = "response.audio.delta")]
    ResponseAudioDelta(ResponseAudioDeltaEvent),
    #[serde(rename = "response.audio.done")]
    ResponseAudioDone(ResponseAudioDoneEvent),
    /// Any event type this crate does not model.
    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Close { .. } => "close",
            ServerEvent::Error(_) => "error",
            ServerEvent::SessionCreated(_) => "session.created",
            ServerEvent::SessionUpdated(_) => "session.updated",
            ServerEvent::InputAudioBufferCommitted(_) => "input_audio_buffer.committed",
            ServerEvent::InputAudioBufferSpeechStarted(_) => "input_audio_buffer.speech_started",
            ServerEvent::InputAudioBufferSpeechStopped(_) => "input_audio_buffer.speech_stopped",
            ServerEvent::ConversationItemCreated(_) => "conversation.item.created",
            ServerEvent::ConversationItemInputAudioTranscriptionCompleted(_) => {
                "conversation.item.input_audio_transcription.completed"
            }
            ServerEvent::ResponseCreated(_) => "response.created",
            ServerEvent::ResponseDone(_) => "response.done",
            ServerEvent::ResponseOutputItemDone(_) => "response.output_item.done",
            ServerEvent::ResponseTextDelta(_) => "response.text.delta",
            ServerEvent::ResponseTextDone(_) => "response.text.done",
            ServerEvent::ResponseAudioTranscriptDelta(_) => "response.audio_transcript.delta",
            ServerEvent::ResponseAudioTranscriptDone(_) => "response.audio_transcript.done",
            ServerEvent::ResponseAudioDelta(_) => "response.audio.delta",
            ServerEvent::ResponseAudioDone(_) => "response.audio.done",
            ServerEvent::Unknown => "unknown",
        }
    }
}
