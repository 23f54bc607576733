//! Heuristic for "did the interviewer just ask something".

/// Lead-ins that mark a prompt as a question even without a `?`.
pub const QUESTION_LEAD_INS: &[&str] = &[
    "tell me",
    "describe",
    "explain",
    "what",
    "how",
    "why",
    "can you",
    "could you",
];

/// Which rule accepted the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionRule {
    QuestionMark,
    LeadIn(&'static str),
}

pub fn classify(text: &str) -> Option<QuestionRule> {
    if text.contains('?') {
        return Some(QuestionRule::QuestionMark);
    }
    let lowered = text.trim_start().to_lowercase();
    QUESTION_LEAD_INS
        .iter()
        .copied()
        .find(|lead| starts_with_word(&lowered, lead))
        .map(QuestionRule::LeadIn)
}

pub fn is_question(text: &str) -> bool {
    classify(text).is_some()
}

// "what" must not match "whatever".
fn starts_with_word(text: &str, lead: &str) -> bool {
    text.strip_prefix(lead)
        .is_some_and(|rest| rest.chars().next().is_none_or(|c| !c.is_alphanumeric()))
}
