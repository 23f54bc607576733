//! The candidate's side of the terminal: typed commands in, coaching out.

use interview_core::Command;
use interview_core::suggestion::SuggestionBoard;
use interview_core::trigger::{SkipReason, TriggerReport};
use std::io::Write;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalCommand {
    Mute,
    Unmute,
    Quit,
    /// Anything else is text for the interview.
    Say(String),
}

impl TerminalCommand {
    /// `None` for a blank line.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        match line.to_ascii_lowercase().as_str() {
            "" => None,
            "mute" => Some(TerminalCommand::Mute),
            "unmute" => Some(TerminalCommand::Unmute),
            "quit" | "exit" => Some(TerminalCommand::Quit),
            _ => Some(TerminalCommand::Say(line.to_string())),
        }
    }
}

pub const HELP: &str = "Type an answer and press enter, or: mute | unmute | quit";

/// Renders core commands for the candidate.
pub struct Presenter<W: Write> {
    board: SuggestionBoard,
    out: W,
}

impl Presenter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> Presenter<W> {
    pub fn new(out: W) -> Self {
        Self {
            board: SuggestionBoard::new(),
            out,
        }
    }

    pub fn show(&mut self, command: Command) {
        let written = match command {
            Command::ShowSuggestion(suggestion) => {
                tracing::info!(suggestion_id = %suggestion.id, origin = %suggestion.origin, "suggestion shown");
                let text = format!(
                    "\n--- coaching tip #{} ---\n{}\n  {}\n",
                    self.board.len() + 1,
                    suggestion.context,
                    suggestion.answer
                );
                self.board.push(suggestion);
                writeln!(self.out, "{}", text)
            }
            Command::InterviewerSaid(line) => writeln!(self.out, "Interviewer: {}", line),
            Command::Notice(notice) => writeln!(self.out, "! {}", notice),
        };
        if let Err(e) = written.and_then(|_| self.out.flush()) {
            tracing::warn!("failed to write to terminal: {}", e);
        }
    }

    /// All tips of the session, newest first.
    pub fn summary(&mut self) {
        let rendered = self.board.render();
        if let Err(e) = writeln!(self.out, "\n=== coaching summary ===\n{}", rendered) {
            tracing::warn!("failed to write to terminal: {}", e);
        }
    }
}

pub fn log_report(report: &TriggerReport) {
    tracing::info!(
        fired = report.fired,
        delivered = report.delivered,
        failed = report.failed,
        cancelled = report.cancelled,
        duplicates = report.duplicate_responses,
        no_candidate = report.skipped(SkipReason::NoCandidate),
        already_used = report.skipped(SkipReason::AlreadyUsed),
        too_short = report.skipped(SkipReason::TooShort),
        not_a_question = report.skipped(SkipReason::NotAQuestion),
        cooling_down = report.skipped(SkipReason::CoolingDown),
        "suggestion trigger stopped"
    );
}
