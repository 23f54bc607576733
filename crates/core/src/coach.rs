use crate::chat::{ChatCompletion, ChatMessage, ChatRequest};
use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;

const SUGGESTION_MAX_TOKENS: u32 = 200;
const SUGGESTION_TEMPERATURE: f32 = 0.7;

/// Produces a suggested answer for an interview question.
///
/// The suggestion trigger only depends on this trait, so tests can swap in a
/// mock and the runtime can use any chat backend.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Suggester: Send + Sync {
    async fn suggest(&self, question: &str) -> Result<String>;
}

/// Suggester backed by a chat-completion model and the candidate's background.
pub struct CoachClient {
    chat: Arc<dyn ChatCompletion>,
    background: String,
}

impl CoachClient {
    pub fn new(chat: Arc<dyn ChatCompletion>, background: &str) -> Self {
        Self {
            chat,
            background: background.to_string(),
        }
    }

    fn request(&self, question: &str) -> ChatRequest {
        let system = format!(
            "You are a helpful assistant providing interview answer suggestions.\n\n\
             Candidate Background: {}\n\n\
             Guidelines:\n\
             - Generate a suggested answer to the interview question\n\
             - Use the candidate's background to provide relevant examples\n\
             - Keep responses concise and professional\n\
             - Respond with just the suggested answer, no explanations",
            self.background
        );
        ChatRequest::new(vec![
            ChatMessage::system(system),
            ChatMessage::user(format!("Interview question: \"{}\"", question)),
        ])
        .with_max_tokens(SUGGESTION_MAX_TOKENS)
        .with_temperature(SUGGESTION_TEMPERATURE)
    }
}

#[async_trait]
impl Suggester for CoachClient {
    async fn suggest(&self, question: &str) -> Result<String> {
        let answer = self.chat.complete(self.request(question)).await?;
        let answer = answer.trim();
        if answer.is_empty() {
            anyhow::bail!("model returned an empty suggestion");
        }
        Ok(answer.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ChatRole, MockChatCompletion};

    #[tokio::test]
    async fn suggestion_prompt_carries_background_and_question() {
        // --- Arrange ---
        let mut chat = MockChatCompletion::new();
        chat.expect_complete()
            .withf(|request| {
                request.messages[0].role == ChatRole::System
                    && request.messages[0].content.contains("Staff Engineer at Acme")
                    && request.messages[1].content == "Interview question: \"Why Acme?\""
                    && request.max_tokens == Some(SUGGESTION_MAX_TOKENS)
            })
            .times(1)
            .returning(|_| Ok("  I wanted to own the platform.  ".to_string()));
        let coach = CoachClient::new(Arc::new(chat), "Staff Engineer at Acme");

        // --- Act ---
        let answer = coach.suggest("Why Acme?").await.unwrap();

        // --- Assert ---
        assert_eq!(answer, "I wanted to own the platform.");
    }

    #[tokio::test]
    async fn blank_answers_are_errors() {
        let mut chat = MockChatCompletion::new();
        chat.expect_complete().returning(|_| Ok("   ".to_string()));
        let coach = CoachClient::new(Arc::new(chat), "");
        assert!(coach.suggest("Why?").await.is_err());
    }
}
