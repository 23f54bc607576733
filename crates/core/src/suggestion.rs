use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

const CONTEXT_PREVIEW_CHARS: usize = 50;

/// What a suggestion was correlated with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum SuggestionOrigin {
    /// A realtime `response.done`, by response id.
    Response(String),
    /// A transcribed capture of interviewer audio.
    Capture(u64),
}

impl fmt::Display for SuggestionOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuggestionOrigin::Response(id) => write!(f, "{}", id),
            SuggestionOrigin::Capture(id) => write!(f, "capture-{}", id),
        }
    }
}

/// An accepted question waiting for its answer suggestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionRequest {
    pub origin: SuggestionOrigin,
    pub question: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub id: String,
    pub origin: SuggestionOrigin,
    pub question: String,
    pub answer: String,
    pub context: String,
    pub created_at: DateTime<Utc>,
}

impl Suggestion {
    pub fn new(request: SuggestionRequest, answer: String) -> Self {
        let created_at = Utc::now();
        Self {
            id: format!("suggestion-{}-{}", request.origin, created_at.timestamp_millis()),
            context: format!("Suggested answer for: \"{}\"", preview(&request.question)),
            origin: request.origin,
            question: request.question,
            answer,
            created_at,
        }
    }
}

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(CONTEXT_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// Ordered list of delivered suggestions, newest last.
#[derive(Debug, Default)]
pub struct SuggestionBoard {
    suggestions: Vec<Suggestion>,
}

impl SuggestionBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, suggestion: Suggestion) {
        self.suggestions.push(suggestion);
    }

    pub fn latest(&self) -> Option<&Suggestion> {
        self.suggestions.last()
    }

    pub fn len(&self) -> usize {
        self.suggestions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suggestions.is_empty()
    }

    pub fn render(&self) -> String {
        if self.suggestions.is_empty() {
            return "No coaching tips yet".to_string();
        }
        self.suggestions
            .iter()
            .rev()
            .map(|s| format!("{}\n  {}", s.context, s.answer))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
