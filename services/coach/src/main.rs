mod capture;
mod config;
mod openai_adapter;
mod playback;
mod prompt_loader;
mod realtime;
mod terminal;
mod voice;

use crate::config::Config;
use crate::playback::CpalPlayback;
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use interview_core::capture::CaptureSource;
use interview_core::interviewer::InterviewStyle;
use interview_native_utils::device;
use openai_realtime::types::audio::Voice;
use std::path::PathBuf;
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// A realtime voice model interviews you.
    Realtime,
    /// A chat model asks the questions, ElevenLabs speaks them.
    Voice,
}

/// Practice job interviews with live coaching tips.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[arg(long, value_enum, default_value_t = Mode::Realtime)]
    mode: Mode,

    /// Audio the coach listens to for interviewer questions: microphone or system.
    #[arg(long, default_value = "microphone")]
    capture: CaptureSource,

    /// Interview style in voice mode: conversational, technical or behavioral.
    #[arg(long, default_value = "conversational")]
    style: InterviewStyle,

    /// ElevenLabs voice id (voice mode) or realtime voice name (realtime mode).
    #[arg(long)]
    voice_id: Option<String>,

    /// Start with interviewer audio muted.
    #[arg(long)]
    no_playback: bool,

    /// Directory with interviewer prompts (`*.md`) and `resume.json`.
    #[arg(long, default_value = "prompts")]
    prompts: PathBuf,

    #[arg(long)]
    input_device: Option<String>,

    /// Loopback device used for `--capture system`.
    #[arg(long)]
    system_device: Option<String>,

    #[arg(long)]
    output_device: Option<String>,

    /// Print the available audio devices and exit.
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Parse Command-Line Arguments ---
    let cli = Cli::parse();
    if cli.list_devices {
        println!("Inputs:\n{}", device::get_available_inputs()?);
        println!("Outputs:\n{}", device::get_available_outputs()?);
        return Ok(());
    }

    // --- 2. Load Configuration ---
    let config = Config::from_env().context("Failed to load application configuration")?;

    // --- 3. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();
    tracing::info!(mode = ?cli.mode, "Configuration loaded successfully. Starting interview coach...");

    // --- 4. Load Prompts and Profile ---
    let prompts = prompt_loader::load_prompts(&cli.prompts).unwrap_or_else(|e| {
        tracing::warn!("No interviewer prompts loaded: {:#}", e);
        Default::default()
    });
    let profile = prompt_loader::load_profile(&cli.prompts).context("Failed to load resume.json")?;
    let background = profile
        .as_ref()
        .map(|p| p.candidate.background())
        .unwrap_or_default();
    tracing::info!(
        prompts = prompts.len(),
        profile = profile.is_some(),
        "interview material loaded"
    );

    // --- 5. Audio Output ---
    // The stream must outlive the session; dropping it stops playback.
    let (playback, _output_stream) = CpalPlayback::open(cli.output_device.as_deref())?;

    // --- 6. Run the Interview ---
    match cli.mode {
        Mode::Realtime => {
            let mut instructions = prompts
                .get("interviewer")
                .cloned()
                .unwrap_or_else(|| openai_adapter::DEFAULT_INSTRUCTIONS.to_string());
            if let Some(profile) = &profile {
                instructions.push_str("\n\n");
                instructions.push_str(&profile.briefing());
            }
            let voice = cli
                .voice_id
                .as_deref()
                .map_or(Voice::Sage, |name| name.parse().unwrap_or(Voice::Sage));
            let options = realtime::RealtimeOptions {
                instructions,
                voice,
                playback: !cli.no_playback,
                microphone: cli.input_device,
            };
            realtime::run(&config, playback, &background, options).await
        }
        Mode::Voice => {
            if cli.no_playback {
                interview_core::interviewer::AudioSink::set_muted(&playback, true);
            }
            let options = voice::VoiceOptions {
                style: cli.style,
                voice_id: cli.voice_id,
                capture: cli.capture,
                microphone: cli.input_device,
                system_device: cli.system_device,
            };
            voice::run(&config, playback, &background, options).await
        }
    }
}
