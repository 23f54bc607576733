use crate::content::items::ItemStatus;
use crate::content::message::MessageRole;

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SessionResource {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    modalities: Option<Vec<String>>,
}

impl SessionResource {
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn modalities(&self) -> Option<&[String]> {
        self.modalities.as_deref()
    }
}

/// A conversation item as reported by the server.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ItemResource {
    id: String,
    #[serde(rename = "type")]
    item_type: String,
    #[serde(default)]
    status: Option<ItemStatus>,
    #[serde(default)]
    role: Option<MessageRole>,
    #[serde(default)]
    content: Vec<ContentPartResource>,
}

impl ItemResource {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn item_type(&self) -> &str {
        &self.item_type
    }

    pub fn status(&self) -> Option<ItemStatus> {
        self.status
    }

    pub fn role(&self) -> Option<MessageRole> {
        self.role
    }

    pub fn content(&self) -> &[ContentPartResource] {
        &self.content
    }

    /// Concatenated text of all parts that already carry text.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentPartResource::text)
            .collect::<Vec<_>>()
            .join("")
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ContentPartResource {
    #[serde(rename = "type")]
    part_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transcript: Option<String>,
}

impl ContentPartResource {
    pub fn part_type(&self) -> &str {
        &self.part_type
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref().or(self.transcript.as_deref())
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseResource {
    id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    output: Vec<ItemResource>,
    #[serde(default)]
    usage: Option<Usage>,
}

impl ResponseResource {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn output(&self) -> &[ItemResource] {
        &self.output
    }

    pub fn usage(&self) -> Option<&Usage> {
        self.usage.as_ref()
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct Usage {
    #[serde(default)]
    total_tokens: u32,
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

impl Usage {
    pub fn total_tokens(&self) -> u32 {
        self.total_tokens
    }

    pub fn input_tokens(&self) -> u32 {
        self.input_tokens
    }

    pub fn output_tokens(&self) -> u32 {
        self.output_tokens
    }
}
