//! Voice mode: a chat model asks the questions and ElevenLabs speaks them.
//!
//! While the interviewer talks, the candidate listener transcribes what it
//! said and the suggestion trigger turns questions into tips. Between
//! questions the candidate's answer is recorded from the microphone (or
//! typed) and handed back to the interviewer.

use crate::capture::CpalAudioSource;
use crate::config::Config;
use crate::playback::CpalPlayback;
use crate::terminal::{self, Presenter, TerminalCommand};
use anyhow::{Context, Result};
use interview_core::Command;
use interview_core::capture::{AudioSource, CaptureAdapter, CaptureSource, Transcriber};
use interview_core::chat::ChatClient;
use interview_core::coach::CoachClient;
use interview_core::event_log::EventLog;
use interview_core::interviewer::{AudioSink, InterviewStyle, Interviewer, Reply};
use interview_core::listener::CandidateListener;
use interview_core::speaking::SpeakingCoordinator;
use interview_core::transcribe::WhisperClient;
use interview_core::transcript::Transcript;
use interview_core::trigger::SuggestionTrigger;
use interview_core::tts::{ElevenLabsClient, SpeechFormat};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};

/// Longest answer recorded before it is sent on without an explicit finish.
const ANSWER_WINDOW: Duration = Duration::from_secs(90);

const NOT_HEARD_NOTICE: &str = "I didn't catch that. Answer again, or type your answer.";

const VOICE_HELP: &str = "Answer out loud and press enter when you are done, \
     or type your answer. Commands: mute | unmute | quit";

pub struct VoiceOptions {
    pub style: InterviewStyle,
    pub voice_id: Option<String>,
    pub capture: CaptureSource,
    pub microphone: Option<String>,
    pub system_device: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Typed(String),
    /// The spoken answer is complete.
    Finished,
}

/// Alternates interviewer turns with the candidate's answers.
pub struct AnswerLoop {
    interviewer: Arc<Interviewer>,
    answers: CaptureAdapter,
    commands: mpsc::Sender<Command>,
}

async fn until_shutdown<F: Future>(
    shutdown: &mut watch::Receiver<bool>,
    work: F,
) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = shutdown.wait_for(|stop| *stop) => None,
        output = work => Some(output),
    }
}

impl AnswerLoop {
    pub fn new(
        interviewer: Arc<Interviewer>,
        answers: CaptureAdapter,
        commands: mpsc::Sender<Command>,
    ) -> Self {
        Self {
            interviewer,
            answers,
            commands,
        }
    }

    pub async fn run(
        mut self,
        mut inputs: mpsc::Receiver<Answer>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let interviewer = self.interviewer.clone();
        if let Some(outcome) = until_shutdown(&mut shutdown, interviewer.start()).await {
            tracing::debug!(?outcome, "interview opened");
            self.converse(&mut inputs, &mut shutdown).await;
        }
        self.answers.cancel().await;
        tracing::debug!("answer loop stopped");
    }

    async fn converse(
        &mut self,
        inputs: &mut mpsc::Receiver<Answer>,
        shutdown: &mut watch::Receiver<bool>,
    ) {
        loop {
            let recording = match self.answers.start_capture() {
                Ok(capture_id) => {
                    tracing::debug!(capture_id, "recording answer");
                    true
                }
                Err(e) => {
                    tracing::warn!("could not record the answer, waiting for typed input: {:#}", e);
                    false
                }
            };

            let deadline = tokio::time::sleep(ANSWER_WINDOW);
            tokio::pin!(deadline);
            let finished = tokio::select! {
                biased;
                _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => return,
                input = inputs.recv() => match input {
                    Some(Answer::Typed(text)) => {
                        self.answers.cancel().await;
                        Some(Some(text))
                    }
                    Some(Answer::Finished) => None,
                    None => return,
                },
                _ = &mut deadline, if recording => {
                    tracing::info!("answer window elapsed");
                    None
                }
            };
            let answer = match finished {
                Some(typed) => typed,
                None => match until_shutdown(shutdown, self.answers.stop_capture()).await {
                    None => return,
                    Some(Ok(heard)) => heard.map(|t| t.text),
                    Some(Err(e)) => {
                        tracing::warn!("answer transcription failed: {:#}", e);
                        None
                    }
                },
            };

            let Some(answer) = answer else {
                let _ = self.commands.send(Command::Notice(NOT_HEARD_NOTICE.to_string())).await;
                continue;
            };
            tracing::info!(answer = %answer, "candidate answered");

            let interviewer = self.interviewer.clone();
            match until_shutdown(shutdown, interviewer.respond_to(&answer)).await {
                None => return,
                Some(Ok(Reply::Spoken { outcome, .. })) => tracing::debug!(?outcome, "question asked"),
                Some(Ok(reply)) => tracing::info!(?reply, "interviewer did not speak"),
                Some(Err(e)) => tracing::warn!("interviewer reply failed: {:#}", e),
            }
        }
    }
}

pub async fn run(
    config: &Config,
    playback: CpalPlayback,
    background: &str,
    options: VoiceOptions,
) -> Result<()> {
    let elevenlabs_key = config
        .elevenlabs_api_key
        .as_deref()
        .context("ELEVENLABS_API_KEY is required in voice mode")?;

    let (command_tx, mut command_rx) = mpsc::channel::<Command>(32);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let speaking = SpeakingCoordinator::new();

    let mut voice = ElevenLabsClient::new(elevenlabs_key).with_format(SpeechFormat::Pcm24k);
    if let Some(voice_id) = &options.voice_id {
        voice = voice.with_voice(voice_id);
    }
    let sink: Arc<dyn AudioSink> = Arc::new(playback.clone());
    let interviewer = Arc::new(
        Interviewer::new(
            Arc::new(ChatClient::new(&config.openai_api_key, &config.chat_model)),
            Arc::new(voice),
            sink,
            speaking.clone(),
            command_tx.clone(),
        )
        .with_style(options.style),
    );

    // No realtime session here: questions reach the trigger as transcriptions only.
    let event_log = EventLog::new();
    let transcript = Transcript::new();
    let suggester = Arc::new(CoachClient::new(
        Arc::new(ChatClient::new(&config.openai_api_key, &config.suggestion_model)),
        background,
    ));
    let (trigger, trigger_handle) = SuggestionTrigger::new(
        config.coaching.clone(),
        event_log.reader(),
        transcript.reader(),
        suggester,
        command_tx.clone(),
    );
    let trigger_task = trigger.spawn();

    let devices: Arc<dyn AudioSource> = Arc::new(CpalAudioSource::new(
        options.microphone,
        options.system_device,
    ));
    let whisper: Arc<dyn Transcriber> = Arc::new(WhisperClient::new(&config.openai_api_key));
    let listener = CandidateListener::new(
        CaptureAdapter::new(devices.clone(), whisper.clone(), &config.coaching)
            .with_source(options.capture),
        speaking,
        trigger_handle.clone(),
        &config.coaching,
    )
    .spawn(shutdown_rx.clone());

    let answers = CaptureAdapter::new(
        devices,
        whisper,
        &config.coaching.clone().with_capture_window(ANSWER_WINDOW),
    )
    .with_source(CaptureSource::Microphone);
    let (answer_tx, answer_rx) = mpsc::channel::<Answer>(8);
    let mut conversation = tokio::spawn(
        AnswerLoop::new(interviewer, answers, command_tx).run(answer_rx, shutdown_rx),
    );
    let mut conversation_done = false;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut presenter = Presenter::stdout();
    println!("{}", VOICE_HELP);

    loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl-C, shutting down...");
                break;
            }
            Some(command) = command_rx.recv() => presenter.show(command),
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    let answer = match TerminalCommand::parse(&line) {
                        Some(TerminalCommand::Quit) => break,
                        Some(TerminalCommand::Mute) => {
                            playback.set_muted(true);
                            tracing::info!("interviewer muted");
                            continue;
                        }
                        Some(TerminalCommand::Unmute) => {
                            playback.set_muted(false);
                            tracing::info!("interviewer unmuted");
                            continue;
                        }
                        Some(TerminalCommand::Say(text)) => Answer::Typed(text),
                        None => Answer::Finished,
                    };
                    if answer_tx.try_send(answer).is_err() {
                        tracing::debug!("interviewer is not waiting for an answer");
                    }
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    tracing::warn!("stdin closed: {}", e);
                    stdin_open = false;
                }
            },
            joined = &mut conversation => {
                conversation_done = true;
                if let Err(e) = joined {
                    tracing::error!("interview ended abnormally: {}", e);
                }
                break;
            }
        }
    }

    tracing::info!("Shutting down...");
    let _ = shutdown_tx.send(true);
    trigger_handle.shutdown().await;
    if !conversation_done {
        if let Err(e) = conversation.await {
            tracing::error!("interview ended abnormally: {}", e);
        }
    }
    if let Err(e) = listener.await {
        tracing::error!("candidate listener ended abnormally: {}", e);
    }
    match trigger_task.await {
        Ok(report) => terminal::log_report(&report),
        Err(e) => tracing::error!("suggestion trigger ended abnormally: {}", e),
    }
    while let Ok(command) = command_rx.try_recv() {
        presenter.show(command);
    }
    presenter.summary();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use interview_core::capture::AudioStream;
    use interview_core::chat::{ChatCompletion, ChatRequest, ChatRole, StreamItem, TokenStream};
    use interview_core::config::CoachingConfig;
    use interview_core::tts::SpeechSynthesizer;
    use std::sync::Mutex;

    const NEXT_QUESTION: &str = "What was the hardest bug you fixed there?";

    #[derive(Default)]
    struct FakeChat {
        answers: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatCompletion for FakeChat {
        async fn complete(&self, _request: ChatRequest) -> Result<String> {
            anyhow::bail!("not used")
        }

        async fn complete_stream(&self, request: ChatRequest) -> Result<TokenStream> {
            if let Some(user) = request.messages.iter().find(|m| m.role == ChatRole::User) {
                self.answers.lock().unwrap().push(user.content.clone());
            }
            let (tx, stream) = TokenStream::channel(4);
            tx.send(StreamItem::Token(NEXT_QUESTION.to_string())).await?;
            tx.send(StreamItem::Done).await?;
            Ok(stream)
        }
    }

    struct SilentVoice;

    #[async_trait]
    impl SpeechSynthesizer for SilentVoice {
        async fn synthesize(&self, _text: &str) -> Result<Vec<u8>> {
            Ok(vec![0; 4])
        }
    }

    struct NullSink;

    #[async_trait]
    impl AudioSink for NullSink {
        async fn play(&self, _audio: Vec<u8>) -> Result<()> {
            Ok(())
        }

        fn set_muted(&self, _muted: bool) {}
    }

    /// One frame per opened stream; the senders are kept so streams stay open.
    #[derive(Default)]
    struct OneFrameMic {
        senders: Mutex<Vec<mpsc::Sender<Vec<f32>>>>,
        fail: bool,
    }

    impl AudioSource for OneFrameMic {
        fn open(&self, _source: CaptureSource) -> Result<AudioStream> {
            if self.fail {
                anyhow::bail!("no microphone");
            }
            let (tx, rx) = mpsc::channel(4);
            tx.try_send(vec![0.2; 160])?;
            self.senders.lock().unwrap().push(tx);
            Ok(AudioStream::new(16_000, rx))
        }
    }

    struct FixedTranscriber(&'static str);

    #[async_trait]
    impl Transcriber for FixedTranscriber {
        async fn transcribe(&self, _wav: Vec<u8>) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Setup {
        chat: Arc<FakeChat>,
        inputs: mpsc::Sender<Answer>,
        commands: mpsc::Receiver<Command>,
        shutdown: watch::Sender<bool>,
        task: tokio::task::JoinHandle<()>,
    }

    fn setup(mic: OneFrameMic, heard: &'static str) -> Setup {
        let chat = Arc::new(FakeChat::default());
        let (command_tx, commands) = mpsc::channel(16);
        let interviewer = Arc::new(Interviewer::new(
            chat.clone(),
            Arc::new(SilentVoice),
            Arc::new(NullSink),
            SpeakingCoordinator::new(),
            command_tx.clone(),
        ));
        let config = CoachingConfig::default().with_capture_window(ANSWER_WINDOW);
        let answers = CaptureAdapter::new(Arc::new(mic), Arc::new(FixedTranscriber(heard)), &config);
        let (inputs, input_rx) = mpsc::channel(4);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(
            AnswerLoop::new(interviewer, answers, command_tx).run(input_rx, shutdown_rx),
        );
        Setup {
            chat,
            inputs,
            commands,
            shutdown,
            task,
        }
    }

    async fn said(commands: &mut mpsc::Receiver<Command>) -> String {
        loop {
            match commands.recv().await {
                Some(Command::InterviewerSaid(line)) => return line,
                Some(_) => continue,
                None => panic!("command channel closed"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn typed_answer_gets_the_next_question() {
        // --- Arrange ---
        let mut s = setup(
            OneFrameMic {
                fail: true,
                ..Default::default()
            },
            "",
        );
        assert!(said(&mut s.commands).await.contains("tell me a bit about yourself"));

        // --- Act ---
        s.inputs
            .send(Answer::Typed("I build payment systems in Rust.".to_string()))
            .await
            .unwrap();

        // --- Assert ---
        assert_eq!(said(&mut s.commands).await, NEXT_QUESTION);
        assert_eq!(
            s.chat.answers.lock().unwrap().as_slice(),
            ["I build payment systems in Rust.".to_string()]
        );
        s.shutdown.send(true).unwrap();
        s.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn spoken_answer_is_transcribed_and_passed_on() {
        let mut s = setup(OneFrameMic::default(), "  I mostly work on distributed systems. ");
        s.inputs.send(Answer::Finished).await.unwrap();

        said(&mut s.commands).await;
        assert_eq!(said(&mut s.commands).await, NEXT_QUESTION);
        assert_eq!(
            s.chat.answers.lock().unwrap().as_slice(),
            ["I mostly work on distributed systems.".to_string()]
        );
        s.shutdown.send(true).unwrap();
        s.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn unheard_answer_asks_again() {
        let mut s = setup(OneFrameMic::default(), "uh");
        s.inputs.send(Answer::Finished).await.unwrap();

        said(&mut s.commands).await;
        match s.commands.recv().await {
            Some(Command::Notice(notice)) => assert_eq!(notice, NOT_HEARD_NOTICE),
            other => panic!("expected a notice, got {:?}", other),
        }
        assert!(s.chat.answers.lock().unwrap().is_empty());
        s.shutdown.send(true).unwrap();
        s.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_a_waiting_loop() {
        let mut s = setup(OneFrameMic::default(), "");
        said(&mut s.commands).await;

        s.shutdown.send(true).unwrap();

        s.task.await.unwrap();
        assert!(s.chat.answers.lock().unwrap().is_empty());
    }
}
