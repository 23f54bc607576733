use crate::audio::{InputAudioTranscription, TurnDetection, Voice};

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Audio,
}

/// Session configuration carried by `session.update`.
///
/// Only the fields that were set are serialized, so a partial update leaves
/// the rest of the server-side session untouched.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct Session {
    /// The set of modalities the model can respond with. `["text"]` disables audio output.
    #[serde(skip_serializing_if = "Option::is_none")]
    modalities: Option<Vec<Modality>>,

    /// The default system instructions prepended to model calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<String>,

    /// Cannot be changed once the model has responded with audio at least once.
    #[serde(skip_serializing_if = "Option::is_none")]
    voice: Option<Voice>,

    #[serde(skip_serializing_if = "Option::is_none")]
    input_audio_transcription: Option<InputAudioTranscription>,

    #[serde(skip_serializing_if = "Option::is_none")]
    turn_detection: Option<TurnDetection>,
}

pub struct SessionConfigurator {
    session: Session,
}

impl Default for SessionConfigurator {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionConfigurator {
    pub fn new() -> Self {
        Self {
            session: Session::default(),
        }
    }

    pub fn with_modalities_disable_audio(mut self) -> Self {
        self.session.modalities = Some(vec![Modality::Text]);
        self
    }

    pub fn with_modalities_enable_audio(mut self) -> Self {
        self.session.modalities = Some(vec![Modality::Text, Modality::Audio]);
        self
    }

    pub fn with_instructions(mut self, instructions: &str) -> Self {
        self.session.instructions = Some(instructions.to_string());
        self
    }

    pub fn with_voice(mut self, voice: Voice) -> Self {
        self.session.voice = Some(voice);
        self
    }

    pub fn with_input_audio_transcription(mut self, transcription: InputAudioTranscription) -> Self {
        self.session.input_audio_transcription = Some(transcription);
        self
    }

    pub fn with_turn_detection(mut self, turn_detection: TurnDetection) -> Self {
        self.session.turn_detection = Some(turn_detection);
        self
    }

    pub fn build(self) -> Session {
        self.session
    }
}
