//! Decides when the interviewer has finished asking a question and fires
//! exactly one suggestion request for it.
//!
//! [`TriggerState`] holds the guards and makes every accept/skip decision
//! synchronously. [`SuggestionTrigger`] wraps it in a single task that owns
//! the settle timers, the queue of accepted requests and the in-flight
//! suggestion calls, and receives its inputs over a channel.

use crate::Command;
use crate::capture::TranscribedText;
use crate::classifier;
use crate::coach::Suggester;
use crate::config::CoachingConfig;
use crate::event_log::{EventLogReader, LoggedEvent, ProcessedEvents};
use crate::suggestion::{Suggestion, SuggestionOrigin, SuggestionRequest};
use crate::transcript::{Role, TranscriptMessage, TranscriptReader};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, sleep_until};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// No finished assistant message to correlate with.
    NoCandidate,
    AlreadyUsed,
    TooShort,
    NotAQuestion,
    CoolingDown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Accept {
        request: SuggestionRequest,
        fire_at: Instant,
    },
    Skip(SkipReason),
}

/// Counters of one trigger lifetime, returned when it stops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerReport {
    pub duplicate_responses: usize,
    pub skipped: HashMap<SkipReason, usize>,
    pub fired: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Settle timers, queued requests and in-flight calls dropped at shutdown.
    pub cancelled: usize,
}

impl TriggerReport {
    pub fn skipped(&self, reason: SkipReason) -> usize {
        self.skipped.get(&reason).copied().unwrap_or(0)
    }
}

pub struct TriggerState {
    config: CoachingConfig,
    processed: ProcessedEvents,
    last_response_id: Option<String>,
    used_questions: HashSet<String>,
    /// Scheduled fire instant of the last accepted request.
    last_fire_at: Option<Instant>,
    report: TriggerReport,
}

impl TriggerState {
    pub fn new(config: CoachingConfig) -> Self {
        Self {
            config,
            processed: ProcessedEvents::new(),
            last_response_id: None,
            used_questions: HashSet::new(),
            last_fire_at: None,
            report: TriggerReport::default(),
        }
    }

    /// Returns the response id to settle on when `event` is a new completion.
    ///
    /// The event is marked processed before anything else looks at it.
    pub fn observe(&mut self, event: &LoggedEvent) -> Option<String> {
        if !self.processed.mark(event.id) {
            return None;
        }
        if !event.is_response_done() {
            return None;
        }
        let Some(response_id) = event.response_id() else {
            tracing::debug!(event_id = %event.id, "response.done without a response id");
            return None;
        };
        if self.last_response_id.as_deref() == Some(response_id) {
            tracing::debug!(event_id = %event.id, response_id, "duplicate completion ignored");
            self.report.duplicate_responses += 1;
            return None;
        }
        self.last_response_id = Some(response_id.to_string());
        Some(response_id.to_string())
    }

    /// Judges the most recent finished assistant message after a completion settled.
    pub fn evaluate_response(
        &mut self,
        response_id: &str,
        candidate: Option<&TranscriptMessage>,
        now: Instant,
    ) -> Decision {
        let Some(message) = candidate else {
            return self.skip(SkipReason::NoCandidate, response_id, "");
        };
        let text = message.content.trim();
        if self.used_questions.contains(text) {
            return self.skip(SkipReason::AlreadyUsed, response_id, text);
        }
        if text.chars().count() <= self.config.min_question_chars {
            return self.skip(SkipReason::TooShort, response_id, text);
        }
        if !classifier::is_question(text) {
            return self.skip(SkipReason::NotAQuestion, response_id, text);
        }
        let fire_at = now + self.config.suggestion_delay;
        self.accept(SuggestionOrigin::Response(response_id.to_string()), text, fire_at)
    }

    /// Judges text transcribed from interviewer audio. Playback has already
    /// ended, so an accepted request fires right away.
    pub fn evaluate_transcription(&mut self, capture: &TranscribedText, now: Instant) -> Decision {
        let text = capture.text.trim();
        let origin = format!("capture-{}", capture.capture_id);
        if text.chars().count() <= self.config.min_transcript_chars {
            return self.skip(SkipReason::TooShort, &origin, text);
        }
        if self.used_questions.contains(text) {
            return self.skip(SkipReason::AlreadyUsed, &origin, text);
        }
        self.accept(SuggestionOrigin::Capture(capture.capture_id), text, now)
    }

    fn accept(&mut self, origin: SuggestionOrigin, text: &str, fire_at: Instant) -> Decision {
        if let Some(last) = self.last_fire_at {
            let gap = fire_at.saturating_duration_since(last);
            if gap < self.config.cooldown {
                let remaining = self.config.cooldown - gap;
                tracing::info!(
                    %origin,
                    remaining_ms = remaining.as_millis() as u64,
                    "too soon since last suggestion, skipping"
                );
                *self.report.skipped.entry(SkipReason::CoolingDown).or_default() += 1;
                return Decision::Skip(SkipReason::CoolingDown);
            }
        }
        self.used_questions.insert(text.to_string());
        self.last_fire_at = Some(fire_at);
        tracing::info!(%origin, question = text, "question accepted");
        Decision::Accept {
            request: SuggestionRequest {
                origin,
                question: text.to_string(),
            },
            fire_at,
        }
    }

    fn skip(&mut self, reason: SkipReason, origin: &str, text: &str) -> Decision {
        tracing::info!(origin, ?reason, text, "no suggestion");
        *self.report.skipped.entry(reason).or_default() += 1;
        Decision::Skip(reason)
    }
}

/// Sleeps until `deadline`, or forever when there is none.
pub(crate) async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

pub enum TriggerInput {
    Transcribed(TranscribedText),
    Shutdown,
}

#[derive(Clone)]
pub struct TriggerHandle {
    tx: mpsc::Sender<TriggerInput>,
}

impl TriggerHandle {
    pub(crate) fn from_sender(tx: mpsc::Sender<TriggerInput>) -> Self {
        Self { tx }
    }

    /// Returns `false` once the trigger has stopped.
    pub async fn submit_transcription(&self, text: TranscribedText) -> bool {
        self.tx.send(TriggerInput::Transcribed(text)).await.is_ok()
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(TriggerInput::Shutdown).await;
    }
}

pub struct SuggestionTrigger {
    state: TriggerState,
    events: EventLogReader,
    cursor: usize,
    transcript: TranscriptReader,
    suggester: Arc<dyn Suggester>,
    commands: mpsc::Sender<Command>,
    inputs: mpsc::Receiver<TriggerInput>,
    settling: VecDeque<(Instant, String)>,
    queued: VecDeque<(Instant, SuggestionRequest)>,
    in_flight: JoinSet<bool>,
}

impl SuggestionTrigger {
    pub fn new(
        config: CoachingConfig,
        events: EventLogReader,
        transcript: TranscriptReader,
        suggester: Arc<dyn Suggester>,
        commands: mpsc::Sender<Command>,
    ) -> (Self, TriggerHandle) {
        let (tx, inputs) = mpsc::channel(32);
        let trigger = Self {
            state: TriggerState::new(config),
            events,
            cursor: 0,
            transcript,
            suggester,
            commands,
            inputs,
            settling: VecDeque::new(),
            queued: VecDeque::new(),
            in_flight: JoinSet::new(),
        };
        (trigger, TriggerHandle::from_sender(tx))
    }

    pub fn spawn(self) -> JoinHandle<TriggerReport> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) -> TriggerReport {
        let mut log_open = true;
        self.scan_new();

        loop {
            let settle_at = self.settling.front().map(|(at, _)| *at);
            let fire_at = self.queued.front().map(|(at, _)| *at);

            tokio::select! {
                biased;
                input = self.inputs.recv() => match input {
                    Some(TriggerInput::Transcribed(text)) => self.on_transcribed(text),
                    Some(TriggerInput::Shutdown) | None => break,
                },
                open = self.events.changed(), if log_open => {
                    log_open = open;
                    self.scan_new();
                }
                _ = sleep_until_deadline(settle_at), if settle_at.is_some() => {
                    self.on_settled();
                }
                _ = sleep_until_deadline(fire_at), if fire_at.is_some() => {
                    self.fire_due();
                }
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    self.record(joined);
                }
            }
        }

        self.stop().await
    }

    fn scan_new(&mut self) {
        let events = self.events.since(self.cursor);
        self.cursor += events.len();
        self.scan(&events);
    }

    /// Arms a settle timer for every new completion in `events`. Safe to call
    /// on overlapping or repeated slices of the log.
    fn scan(&mut self, events: &[Arc<LoggedEvent>]) {
        for event in events {
            if let Some(response_id) = self.state.observe(event) {
                let at = Instant::now() + self.state.config.settle_delay;
                tracing::debug!(response_id, "completion seen, settling");
                self.settling.push_back((at, response_id));
            }
        }
    }

    fn on_settled(&mut self) {
        let Some((_, response_id)) = self.settling.pop_front() else {
            return;
        };
        let candidate = self.transcript.latest_completed(Role::Assistant);
        let decision = self
            .state
            .evaluate_response(&response_id, candidate.as_ref(), Instant::now());
        if let Decision::Accept { request, fire_at } = decision {
            self.queued.push_back((fire_at, request));
        }
    }

    fn on_transcribed(&mut self, text: TranscribedText) {
        if let Decision::Accept { request, .. } =
            self.state.evaluate_transcription(&text, Instant::now())
        {
            self.fire(request);
        }
    }

    fn fire_due(&mut self) {
        let now = Instant::now();
        while self.queued.front().is_some_and(|(at, _)| *at <= now) {
            if let Some((_, request)) = self.queued.pop_front() {
                self.fire(request);
            }
        }
    }

    fn fire(&mut self, request: SuggestionRequest) {
        self.state.report.fired += 1;
        tracing::info!(origin = %request.origin, "requesting suggestion");
        let suggester = self.suggester.clone();
        let commands = self.commands.clone();
        self.in_flight.spawn(async move {
            match suggester.suggest(&request.question).await {
                Ok(answer) => {
                    let suggestion = Suggestion::new(request, answer);
                    commands.send(Command::ShowSuggestion(suggestion)).await.is_ok()
                }
                Err(e) => {
                    tracing::warn!(origin = %request.origin, "suggestion request failed: {:#}", e);
                    false
                }
            }
        });
    }

    fn record(&mut self, joined: Result<bool, tokio::task::JoinError>) {
        match joined {
            Ok(true) => self.state.report.delivered += 1,
            Ok(false) => self.state.report.failed += 1,
            Err(e) => {
                tracing::error!("suggestion task ended abnormally: {}", e);
                self.state.report.failed += 1;
            }
        }
    }

    async fn stop(mut self) -> TriggerReport {
        let cancelled = self.settling.len() + self.queued.len() + self.in_flight.len();
        self.settling.clear();
        self.queued.clear();
        self.in_flight.shutdown().await;
        if cancelled > 0 {
            tracing::info!(cancelled, "suggestion trigger stopped with pending work");
        }
        self.state.report.cancelled = cancelled;
        self.state.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coach::MockSuggester;
    use crate::event_log::{Direction, EventLog};
    use crate::transcript::Transcript;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    #[derive(Default)]
    struct RecordingSuggester {
        questions: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingSuggester {
        fn questions(&self) -> Vec<String> {
            self.questions.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Suggester for RecordingSuggester {
        async fn suggest(&self, question: &str) -> anyhow::Result<String> {
            self.questions.lock().unwrap().push(question.to_string());
            if self.fail {
                anyhow::bail!("upstream unavailable");
            }
            Ok(format!("answer to {}", question))
        }
    }

    struct Harness {
        log: EventLog,
        transcript: Transcript,
        handle: TriggerHandle,
        task: JoinHandle<TriggerReport>,
        commands: mpsc::Receiver<Command>,
    }

    impl Harness {
        fn start(suggester: Arc<dyn Suggester>, prepare: impl FnOnce(&mut EventLog, &mut Transcript)) -> Self {
            let mut log = EventLog::new();
            let mut transcript = Transcript::new();
            prepare(&mut log, &mut transcript);
            let (tx, commands) = mpsc::channel(8);
            let (trigger, handle) = SuggestionTrigger::new(
                CoachingConfig::default(),
                log.reader(),
                transcript.reader(),
                suggester,
                tx,
            );
            Self {
                log,
                transcript,
                handle,
                task: trigger.spawn(),
                commands,
            }
        }

        async fn stop(self) -> TriggerReport {
            self.handle.shutdown().await;
            self.task.await.unwrap()
        }
    }

    fn response_done(log: &mut EventLog, response_id: &str) {
        log.append(
            Direction::Server,
            "response.done",
            json!({ "type": "response.done", "response": { "id": response_id } }),
        );
    }

    fn assistant_says(transcript: &mut Transcript, id: &str, text: &str, at_ms: i64) {
        transcript.add_message_at(id, Role::Assistant, text, false, at_ms);
        transcript.complete(id, None);
    }

    fn suggestion(command: Option<Command>) -> Suggestion {
        match command {
            Some(Command::ShowSuggestion(s)) => s,
            other => panic!("expected a suggestion, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_completion_for_one_response_fires_once() {
        // --- Arrange ---
        let suggester = Arc::new(RecordingSuggester::default());
        let mut harness = Harness::start(suggester.clone(), |log, transcript| {
            assistant_says(transcript, "item_1", "Tell me about a time you led a team.", 1_000);
            response_done(log, "r1");
            response_done(log, "r1");
        });

        // --- Act ---
        let shown = suggestion(timeout(Duration::from_secs(60), harness.commands.recv()).await.unwrap());
        let second = timeout(Duration::from_secs(60), harness.commands.recv()).await;

        // --- Assert ---
        assert_eq!(shown.origin, SuggestionOrigin::Response("r1".to_string()));
        assert_eq!(shown.question, "Tell me about a time you led a team.");
        assert!(second.is_err(), "only one suggestion may fire");
        assert_eq!(suggester.questions().len(), 1);

        let report = harness.stop().await;
        assert_eq!(report.fired, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.duplicate_responses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn suggestion_waits_for_settle_and_playback_delays() {
        let mut suggester = MockSuggester::new();
        suggester
            .expect_suggest()
            .withf(|q| q == "How do you prioritise work?")
            .times(1)
            .returning(|_| Ok("By impact.".to_string()));
        let started = Instant::now();
        let mut harness = Harness::start(Arc::new(suggester), |log, transcript| {
            assistant_says(transcript, "item_1", "How do you prioritise work?", 1_000);
            response_done(log, "r1");
        });

        let shown = suggestion(harness.commands.recv().await);
        let config = CoachingConfig::default();
        assert!(started.elapsed() >= config.settle_delay + config.suggestion_delay);
        assert_eq!(shown.answer, "By impact.");
        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn second_question_inside_cooldown_is_skipped() {
        let suggester = Arc::new(RecordingSuggester::default());
        let mut harness = Harness::start(suggester.clone(), |log, transcript| {
            assistant_says(transcript, "item_1", "Tell me about a time you led a team.", 1_000);
            response_done(log, "r1");
        });

        sleep(Duration::from_secs(3)).await;
        assistant_says(&mut harness.transcript, "item_2", "How do you handle conflict on a team?", 4_000);
        response_done(&mut harness.log, "r2");

        let shown = suggestion(timeout(Duration::from_secs(60), harness.commands.recv()).await.unwrap());
        assert_eq!(shown.origin, SuggestionOrigin::Response("r1".to_string()));
        assert!(timeout(Duration::from_secs(60), harness.commands.recv()).await.is_err());

        let report = harness.stop().await;
        assert_eq!(report.fired, 1);
        assert_eq!(report.skipped(SkipReason::CoolingDown), 1);
        assert_eq!(suggester.questions(), vec!["Tell me about a time you led a team."]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_pending_settle_timer() {
        let suggester = Arc::new(RecordingSuggester::default());
        let mut harness = Harness::start(suggester.clone(), |log, transcript| {
            assistant_says(transcript, "item_1", "What drew you to this role?", 1_000);
            response_done(log, "r1");
        });

        sleep(Duration::from_millis(500)).await;
        harness.handle.shutdown().await;
        let report = (&mut harness.task).await.unwrap();
        sleep(Duration::from_secs(60)).await;

        assert_eq!(report.cancelled, 1);
        assert_eq!(report.fired, 0);
        assert!(harness.commands.try_recv().is_err());
        assert!(suggester.questions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn near_empty_transcription_never_reaches_the_suggester() {
        let suggester = Arc::new(RecordingSuggester::default());
        let mut harness = Harness::start(suggester.clone(), |_, _| {});

        for text in ["", "   ", " okay "] {
            assert!(
                harness
                    .handle
                    .submit_transcription(TranscribedText { capture_id: 1, text: text.to_string() })
                    .await
            );
        }
        sleep(Duration::from_secs(30)).await;

        assert!(harness.commands.try_recv().is_err());
        let report = harness.stop().await;
        assert_eq!(report.skipped(SkipReason::TooShort), 3);
        assert!(suggester.questions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn transcribed_question_fires_without_extra_delay() {
        let suggester = Arc::new(RecordingSuggester::default());
        let mut harness = Harness::start(suggester.clone(), |_, _| {});
        let started = Instant::now();

        harness
            .handle
            .submit_transcription(TranscribedText {
                capture_id: 7,
                text: "Walk me through your last project.".to_string(),
            })
            .await;
        let shown = suggestion(harness.commands.recv().await);

        assert_eq!(shown.origin, SuggestionOrigin::Capture(7));
        assert!(started.elapsed() < Duration::from_secs(1));
        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn statements_and_reused_questions_do_not_fire() {
        let suggester = Arc::new(RecordingSuggester::default());
        let mut harness = Harness::start(suggester.clone(), |log, transcript| {
            assistant_says(transcript, "item_1", "Great, thanks for sharing that with me.", 1_000);
            response_done(log, "r1");
        });
        sleep(Duration::from_secs(30)).await;

        // Same text as an already used capture.
        harness
            .handle
            .submit_transcription(TranscribedText { capture_id: 1, text: "Why this company?".into() })
            .await;
        let _ = suggestion(harness.commands.recv().await);
        sleep(Duration::from_secs(30)).await;
        assistant_says(&mut harness.transcript, "item_2", "Why this company?", 2_000);
        response_done(&mut harness.log, "r2");
        sleep(Duration::from_secs(30)).await;

        let report = harness.stop().await;
        assert_eq!(report.skipped(SkipReason::NotAQuestion), 1);
        assert_eq!(report.skipped(SkipReason::AlreadyUsed), 1);
        assert_eq!(report.fired, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_suggestion_is_dropped_without_retry() {
        let suggester = Arc::new(RecordingSuggester { fail: true, ..Default::default() });
        let mut harness = Harness::start(suggester.clone(), |log, transcript| {
            assistant_says(transcript, "item_1", "Describe your testing strategy.", 1_000);
            response_done(log, "r1");
        });

        sleep(Duration::from_secs(60)).await;

        assert!(harness.commands.try_recv().is_err());
        let report = harness.stop().await;
        assert_eq!(report.fired, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(suggester.questions().len(), 1);
    }

    #[test]
    fn rescanning_the_log_arms_each_completion_once() {
        let mut log = EventLog::new();
        let transcript = Transcript::new();
        response_done(&mut log, "r1");
        log.append(Direction::Server, "response.created", json!({ "response": { "id": "r2" } }));
        response_done(&mut log, "r2");
        let (tx, _rx) = mpsc::channel(1);
        let (mut trigger, _handle) = SuggestionTrigger::new(
            CoachingConfig::default(),
            log.reader(),
            transcript.reader(),
            Arc::new(RecordingSuggester::default()),
            tx,
        );

        let rt = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
        rt.block_on(async {
            let snapshot = log.reader().snapshot();
            for _ in 0..3 {
                trigger.scan(&snapshot);
            }
        });

        let armed: Vec<_> = trigger.settling.iter().map(|(_, id)| id.clone()).collect();
        assert_eq!(armed, vec!["r1", "r2"]);
        assert_eq!(trigger.state.processed.len(), 3);
    }

    #[test]
    fn cooldown_is_measured_between_fire_instants() {
        let mut state = TriggerState::new(CoachingConfig::default());
        let now = Instant::now();
        let capture = |id, text: &str| TranscribedText { capture_id: id, text: text.to_string() };

        assert!(matches!(
            state.evaluate_transcription(&capture(1, "What is your biggest strength?"), now),
            Decision::Accept { .. }
        ));
        assert_eq!(
            state.evaluate_transcription(&capture(2, "What is your biggest weakness?"), now + Duration::from_secs(19)),
            Decision::Skip(SkipReason::CoolingDown)
        );
        assert!(matches!(
            state.evaluate_transcription(&capture(3, "Where do you see yourself in five years?"), now + Duration::from_secs(20)),
            Decision::Accept { .. }
        ));
    }

    #[test]
    fn missing_candidate_is_skipped() {
        let mut state = TriggerState::new(CoachingConfig::default());
        assert_eq!(
            state.evaluate_response("r1", None, Instant::now()),
            Decision::Skip(SkipReason::NoCandidate)
        );
    }
}
