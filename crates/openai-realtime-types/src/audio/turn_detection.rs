#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum TurnDetection {
    #[serde(rename = "server_vad")]
    ServerVad(ServerVadTurnDetection),
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct ServerVadTurnDetection {
    /// Activation threshold for VAD (0.0 to 1.0).
    threshold: f32,

    /// Amount of audio to include before speech starts, in milliseconds
    prefix_padding_ms: u32,

    /// Duration of silence to detect speech stop, in milliseconds
    silence_duration_ms: u32,

    /// Whether the server answers automatically once a turn ends
    #[serde(skip_serializing_if = "Option::is_none")]
    create_response: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    interrupt_response: Option<bool>,
}

impl Default for TurnDetection {
    fn default() -> Self {
        Self::ServerVad(ServerVadTurnDetection::default())
    }
}

impl Default for ServerVadTurnDetection {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 200,
            create_response: None,
            interrupt_response: None,
        }
    }
}

impl ServerVadTurnDetection {
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_prefix_padding_ms(mut self, prefix_padding_ms: u32) -> Self {
        self.prefix_padding_ms = prefix_padding_ms;
        self
    }

    pub fn with_silence_duration_ms(mut self, silence_duration_ms: u32) -> Self {
        self.silence_duration_ms = silence_duration_ms;
        self
    }

    pub fn with_create_response(mut self, create_response: bool) -> Self {
        self.create_response = Some(create_response);
        self
    }

    pub fn with_interrupt_response(mut self, interrupt_response: bool) -> Self {
        self.interrupt_response = Some(interrupt_response);
        self
    }
}
