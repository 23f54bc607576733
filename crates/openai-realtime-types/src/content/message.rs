use crate::audio::Base64EncodedAudioBytes;
use crate::content::items::{ItemHeader, ItemStatus};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MessageItem {
    #[serde(flatten)]
    header: ItemHeader,

    role: MessageRole,

    content: Vec<Content>,
}

impl MessageItem {
    pub fn builder() -> MessageItemBuilder {
        MessageItemBuilder::new()
    }

    pub fn id(&self) -> Option<&str> {
        self.header.id.as_deref()
    }

    pub fn status(&self) -> Option<ItemStatus> {
        self.header.status
    }

    pub fn role(&self) -> MessageRole {
        self.role
    }

    pub fn content(&self) -> &[Content] {
        &self.content
    }
}

pub struct MessageItemBuilder {
    item: MessageItem,
}

impl Default for MessageItemBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageItemBuilder {
    pub fn new() -> Self {
        Self {
            item: MessageItem {
                header: ItemHeader::default(),
                role: MessageRole::User,
                content: Vec::new(),
            },
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.item.header.id = Some(id.to_string());
        self
    }

    pub fn with_role(mut self, role: MessageRole) -> Self {
        self.item.role = role;
        self
    }

    pub fn with_input_text(mut self, text: &str) -> Self {
        self.item.content.push(Content::input_text(text));
        self
    }

    pub fn build(self) -> MessageItem {
        self.item
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub enum MessageRole {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "system")]
    System,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Content {
    #[serde(rename = "input_text")]
    InputText(TextContent),
    #[serde(rename = "input_audio")]
    InputAudio(InputAudioContent),
    #[serde(rename = "text")]
    Text(TextContent),
    #[serde(rename = "audio")]
    Audio(AudioContent),
}

impl Content {
    pub fn input_text(text: &str) -> Self {
        Content::InputText(TextContent {
            text: text.to_string(),
        })
    }

    /// Readable text of this part: typed text or a finished audio transcript.
    pub fn text(&self) -> Option<&str> {
        match self {
            Content::InputText(c) | Content::Text(c) => Some(&c.text),
            Content::InputAudio(c) => c.transcript.as_deref(),
            Content::Audio(c) => c.transcript.as_deref(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct TextContent {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct InputAudioContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    audio: Option<Base64EncodedAudioBytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transcript: Option<String>,
}

/// Assistant audio part. The transcript is null until the server finishes it.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct AudioContent {
    #[serde(default)]
    transcript: Option<String>,
}
