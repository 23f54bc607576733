use std::time::Duration;

/// Timings and thresholds of the coaching pipeline.
///
/// The defaults are the values the practice app has been tuned with.
#[derive(Debug, Clone, PartialEq)]
pub struct CoachingConfig {
    /// Wait after a response completes before reading the transcript.
    pub settle_delay: Duration,
    /// Minimum interval between two fired suggestions.
    pub cooldown: Duration,
    /// Extra wait between accepting a question and requesting its suggestion.
    pub suggestion_delay: Duration,
    /// Longest a single capture may run without an explicit stop.
    pub capture_window: Duration,
    /// Transcriptions must be strictly longer than this (in chars, trimmed).
    pub min_transcript_chars: usize,
    /// Candidate questions must be strictly longer than this.
    pub min_question_chars: usize,
}

impl Default for CoachingConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(2_000),
            cooldown: Duration::from_millis(20_000),
            suggestion_delay: Duration::from_millis(5_000),
            capture_window: Duration::from_millis(6_000),
            min_transcript_chars: 5,
            min_question_chars: 10,
        }
    }
}

impl CoachingConfig {
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_suggestion_delay(mut self, delay: Duration) -> Self {
        self.suggestion_delay = delay;
        self
    }

    pub fn with_capture_window(mut self, window: Duration) -> Self {
        self.capture_window = window;
        self
    }

    pub fn with_min_transcript_chars(mut self, chars: usize) -> Self {
        self.min_transcript_chars = chars;
        self
    }

    pub fn with_min_question_chars(mut self, chars: usize) -> Self {
        self.min_question_chars = chars;
        self
    }
}
