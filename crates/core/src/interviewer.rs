//! Voice interviewer built from a chat model and a speech synthesizer.

use crate::Command;
use crate::chat::{ChatCompletion, ChatMessage, ChatRequest, ChatRole};
use crate::speaking::{FinishReason, SpeakingCoordinator};
use crate::tts::SpeechSynthesizer;
use anyhow::{Context, Result};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

/// Lines this short are shown but not spoken.
const MIN_SPOKEN_CHARS: usize = 10;

const RETRY_NOTICE: &str =
    "I apologize, but I encountered an error. Could you please repeat your response?";
const SPEECH_NOTICE: &str = "I apologize, but I encountered an error generating speech. \
     Please check your ElevenLabs API configuration.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterviewStyle {
    #[default]
    Conversational,
    Technical,
    Behavioral,
}

impl FromStr for InterviewStyle {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "conversational" => Ok(InterviewStyle::Conversational),
            "technical" => Ok(InterviewStyle::Technical),
            "behavioral" | "behavioural" => Ok(InterviewStyle::Behavioral),
            other => anyhow::bail!("unknown interview style '{}'", other),
        }
    }
}

impl fmt::Display for InterviewStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InterviewStyle::Conversational => "conversational",
            InterviewStyle::Technical => "technical",
            InterviewStyle::Behavioral => "behavioral",
        };
        write!(f, "{}", name)
    }
}

/// Local audio output.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Resolves once playback of `audio` has ended.
    async fn play(&self, audio: Vec<u8>) -> Result<()>;

    /// Takes effect immediately, including on audio already playing.
    fn set_muted(&self, muted: bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    Spoken,
    SynthesisFailed,
    PlaybackFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Spoken { line: String, outcome: SpeakOutcome },
    /// Too short to be worth speaking.
    Silent(String),
    Repeated,
    Busy,
}

#[derive(Default)]
struct Conversation {
    history: Vec<ChatMessage>,
    last_input: Option<String>,
    busy: bool,
}

/// Clears the busy flag however `respond_to` exits.
struct BusyGuard<'a> {
    conversation: &'a Mutex<Conversation>,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        lock(self.conversation).busy = false;
    }
}

fn lock(conversation: &Mutex<Conversation>) -> MutexGuard<'_, Conversation> {
    conversation.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct Interviewer {
    chat: Arc<dyn ChatCompletion>,
    voice: Arc<dyn SpeechSynthesizer>,
    sink: Arc<dyn AudioSink>,
    speaking: SpeakingCoordinator,
    commands: mpsc::Sender<Command>,
    style: InterviewStyle,
    conversation: Mutex<Conversation>,
}

impl Interviewer {
    pub fn new(
        chat: Arc<dyn ChatCompletion>,
        voice: Arc<dyn SpeechSynthesizer>,
        sink: Arc<dyn AudioSink>,
        speaking: SpeakingCoordinator,
        commands: mpsc::Sender<Command>,
    ) -> Self {
        Self {
            chat,
            voice,
            sink,
            speaking,
            commands,
            style: InterviewStyle::default(),
            conversation: Mutex::new(Conversation::default()),
        }
    }

    pub fn with_style(mut self, style: InterviewStyle) -> Self {
        self.style = style;
        self
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        lock(&self.conversation).history.clone()
    }

    /// Opens the interview with a fixed welcome line.
    pub async fn start(&self) -> SpeakOutcome {
        let welcome = format!(
            "Hello! I'm your AI interviewer. I'll be conducting a {} interview today. \
             You are the candidate being interviewed. Let's start with a brief introduction. \
             Could you tell me a bit about yourself and your background?",
            self.style
        );
        {
            let mut conversation = lock(&self.conversation);
            conversation.history.clear();
            conversation.history.push(ChatMessage::assistant(welcome.clone()));
        }
        let _ = self.commands.send(Command::InterviewerSaid(welcome.clone())).await;
        self.speak(&welcome).await
    }

    /// Produces and speaks the next interviewer line for the candidate's answer.
    pub async fn respond_to(&self, candidate_text: &str) -> Result<Reply> {
        let input = candidate_text.trim().to_string();
        let history = {
            let mut conversation = lock(&self.conversation);
            if conversation.busy {
                tracing::debug!("interviewer busy, input ignored");
                return Ok(Reply::Busy);
            }
            if conversation.last_input.as_deref() == Some(input.as_str()) {
                tracing::debug!("repeated input ignored");
                return Ok(Reply::Repeated);
            }
            conversation.busy = true;
            conversation.history.clone()
        };
        let _busy = BusyGuard {
            conversation: &self.conversation,
        };

        let request = ChatRequest::new(vec![
            ChatMessage::system(self.system_prompt(&history)),
            ChatMessage::user(input.clone()),
        ]);
        let line = match self.next_line(request).await {
            Ok(line) => line,
            Err(e) => {
                let _ = self.commands.send(Command::Notice(RETRY_NOTICE.to_string())).await;
                return Err(e);
            }
        };

        {
            // Only an answered input counts as said; after a failure the
            // candidate is asked to repeat it.
            let mut conversation = lock(&self.conversation);
            conversation.last_input = Some(input.clone());
            conversation.history.push(ChatMessage::user(input));
            conversation.history.push(ChatMessage::assistant(line.clone()));
        }
        let _ = self.commands.send(Command::InterviewerSaid(line.clone())).await;

        if line.trim().chars().count() <= MIN_SPOKEN_CHARS {
            return Ok(Reply::Silent(line));
        }
        let outcome = self.speak(&line).await;
        Ok(Reply::Spoken { line, outcome })
    }

    async fn next_line(&self, request: ChatRequest) -> Result<String> {
        let stream = self
            .chat
            .complete_stream(request)
            .await
            .context("interviewer completion failed")?;
        let line = stream.collect_text().await?;
        Ok(line.trim().to_string())
    }

    /// Synthesizes and plays `text` inside one speaking turn.
    pub async fn speak(&self, text: &str) -> SpeakOutcome {
        let turn = self.speaking.begin();
        let audio = match self.voice.synthesize(text).await {
            Ok(audio) => audio,
            Err(e) => {
                tracing::warn!(turn = turn.id(), "speech synthesis failed: {:#}", e);
                turn.finish(FinishReason::SynthesisFailed);
                let _ = self.commands.send(Command::Notice(SPEECH_NOTICE.to_string())).await;
                return SpeakOutcome::SynthesisFailed;
            }
        };
        match self.sink.play(audio).await {
            Ok(()) => {
                turn.finish(FinishReason::PlaybackEnded);
                SpeakOutcome::Spoken
            }
            Err(e) => {
                tracing::warn!(turn = turn.id(), "playback failed: {:#}", e);
                // Dropping the turn reports it as cancelled.
                SpeakOutcome::PlaybackFailed
            }
        }
    }

    fn system_prompt(&self, history: &[ChatMessage]) -> String {
        let context = history
            .iter()
            .map(|m| {
                let role = match m.role {
                    ChatRole::System => "system",
                    ChatRole::User => "user",
                    ChatRole::Assistant => "assistant",
                };
                format!("{}: {}", role, m.content)
            })
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "You are an AI interviewer conducting a {style} interview with a human candidate.\n\n\
             Interview Mode: {style}\n\
             - Conversational: Ask follow-up questions, show interest, create a comfortable atmosphere\n\
             - Technical: Ask technical questions, assess problem-solving skills, evaluate technical knowledge\n\
             - Behavioral: Ask about past experiences, use STAR method, assess soft skills\n\n\
             Guidelines:\n\
             - Keep responses concise (1-2 sentences)\n\
             - Ask one clear question at a time\n\
             - Be professional but friendly\n\
             - Adapt to the candidate's responses\n\
             - If this is the first message, introduce yourself and start the interview\n\
             - You are the interviewer, the human is the candidate being interviewed\n\n\
             Current conversation context: {context}\n\n\
             Respond as the interviewer:",
            style = self.style,
            context = context,
        )
    }
}
