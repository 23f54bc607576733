pub mod capture;
pub mod chat;
pub mod classifier;
pub mod coach;
pub mod config;
pub mod connector;
pub mod event_log;
pub mod interviewer;
pub mod listener;
pub mod profile;
pub mod session;
pub mod session_store;
pub mod speaking;
pub mod suggestion;
pub mod transcribe;
pub mod transcript;
pub mod trigger;
pub mod tts;

use suggestion::Suggestion;

/// Commands the core issues to whatever runtime presents the session.
///
/// Keeps the decision-making (when to suggest, what the interviewer said)
/// apart from how it is shown.
#[derive(Debug, Clone)]
pub enum Command {
    /// A suggested answer is ready to display.
    ShowSuggestion(Suggestion),
    /// The voice interviewer produced a line.
    InterviewerSaid(String),
    /// A fallback message for the candidate, e.g. after a speech failure.
    Notice(String),
}
