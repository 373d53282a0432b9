use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use ipguard_voice::audio::{self, AudioInput, CpalInput, CpalOutput, pcm};
use ipguard_voice::config::{self, Config};
use ipguard_voice::{
    CpalDevices, EncodedChunk, Error, GeminiConnector, LiveSession, PlaybackScheduler,
    SessionUpdate,
};

/// ipguard - Live voice consultation with an AI trademark and IP expert
#[derive(Parser)]
#[command(name = "ipguard", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Start a live voice consultation (default)
    Consult,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
        /// Write the captured audio to a WAV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Test speaker output through the playback scheduler
    TestSpeaker,
    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,ipguard_voice=info",
        1 => "info,ipguard_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command.unwrap_or(Command::Consult) {
        Command::Consult => consult().await,
        Command::TestMic { duration, output } => test_mic(duration, output).await,
        Command::TestSpeaker => test_speaker().await,
        Command::Config => show_config(),
    }
}

/// Run a live consultation until Ctrl-C or the service hangs up
#[allow(clippy::future_not_send)]
async fn consult() -> anyhow::Result<()> {
    let config = Config::load();
    let connector = GeminiConnector::from_config(&config.live)?;

    let mut session = LiveSession::new(
        config.live.setup(),
        config.audio.clone(),
        CpalDevices,
        connector,
    );
    let printer = tokio::spawn(print_updates(session.subscribe()));

    let stop = session.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.stop();
        }
    });

    println!("Establishing secure line...");
    match session.start().await {
        Ok(()) => {}
        Err(Error::Cancelled) => {
            println!("Consultation cancelled.");
            return Ok(());
        }
        Err(e) if e.is_device_error() => {
            eprintln!("Microphone access is required for the live consultant.");
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    }

    println!("Expert online. Ask about your trademark classes or regional requirements.");
    println!("Press Ctrl-C to end the session.\n");

    session.run().await?;

    // Dropping the session closes the update channel and ends the printer
    drop(session);
    let _ = printer.await;

    println!("\nSession ended.");
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Speaker {
    User,
    Expert,
}

impl Speaker {
    const fn label(self) -> &'static str {
        match self {
            Self::User => "You",
            Self::Expert => "Expert",
        }
    }
}

async fn print_updates(mut updates: mpsc::UnboundedReceiver<SessionUpdate>) {
    let mut current: Option<Speaker> = None;

    while let Some(update) = updates.recv().await {
        match update {
            SessionUpdate::InputTranscript(text) => print_delta(&mut current, Speaker::User, &text),
            SessionUpdate::OutputTranscript(text) => {
                print_delta(&mut current, Speaker::Expert, &text);
            }
            SessionUpdate::TurnComplete => {
                if current.take().is_some() {
                    println!();
                }
            }
            SessionUpdate::Interrupted => tracing::debug!("expert interrupted"),
            SessionUpdate::RemoteError(message) => eprintln!("\n[service error] {message}"),
            SessionUpdate::State(state) => tracing::debug!(%state, "session state"),
        }
    }
}

fn print_delta(current: &mut Option<Speaker>, who: Speaker, text: &str) {
    if *current != Some(who) {
        if current.is_some() {
            println!();
        }
        print!("{}: ", who.label());
        *current = Some(who);
    }
    print!("{text}");
    let _ = std::io::stdout().flush();
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64, output: Option<PathBuf>) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let config = Config::load();
    let mut capture = CpalInput::open(&config.audio)?;
    let (frames_tx, mut frames) = mpsc::unbounded_channel();
    capture.start(frames_tx)?;

    let sample_rate = capture.sample_rate();
    println!("Sample rate: {sample_rate} Hz, frame size: {}", config.audio.frame_size);
    println!("---");

    let mut recorded = Vec::new();
    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let mut second = Vec::new();
        while let Ok(frame) = frames.try_recv() {
            second.push(frame);
        }

        let samples: Vec<f32> = second
            .iter()
            .flat_map(|f| pcm::int16_frame_to_float(f.samples()))
            .collect();
        let energy = calculate_rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] frames: {:2} | RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            second.len(),
            energy,
            peak,
            meter
        );

        recorded.extend(second);
    }

    capture.stop();

    if let Some(path) = output {
        let wav = audio::frames_to_wav(&recorded, sample_rate)?;
        std::fs::write(&path, wav)?;
        println!("\nWrote {} frames to {}", recorded.len(), path.display());
    }

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If no frames arrived or RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in and allowed for this terminal?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with three tones scheduled back to back
#[allow(clippy::future_not_send)]
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear three rising tones with no gap between them\n");

    let config = Config::load();
    let sample_rate = config.audio.output_sample_rate;
    let output = CpalOutput::open(&config.audio)?;
    let mut scheduler = PlaybackScheduler::new(Box::new(output));

    for frequency in [440.0_f32, 554.37, 659.25] {
        let samples = sine(frequency, sample_rate, 1.0, 0.3);
        let chunk = EncodedChunk::from_pcm(&pcm::float_to_int16_frame(&samples), sample_rate);
        if let Some(unit) = scheduler.enqueue(&chunk)? {
            println!(
                "{frequency:>7.2} Hz scheduled at {:>5} ms for {} ms",
                unit.start.as_millis(),
                unit.duration.as_millis()
            );
        }
    }

    let remaining = scheduler.cursor().saturating_sub(scheduler.now());
    tokio::time::sleep(remaining + Duration::from_millis(200)).await;
    scheduler.reap();
    println!("Units still queued: {}", scheduler.len());
    scheduler.shutdown()?;

    println!("\n---");
    println!("If you heard the tones, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn sine(frequency: f32, sample_rate: u32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (sample_rate as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * amplitude
        })
        .collect()
}

/// Print the effective configuration
fn show_config() -> anyhow::Result<()> {
    let config = Config::load();

    match config::config_file_path() {
        Some(path) if path.exists() => println!("Config file: {}", path.display()),
        Some(path) => println!("Config file: {} (not present)", path.display()),
        None => println!("Config file: unavailable on this platform"),
    }

    println!("Endpoint:    {}", config.live.endpoint);
    println!("Model:       {}", config.live.model);
    println!("Voice:       {}", config.live.voice);
    println!(
        "API key:     {}",
        if config.live.api_key.is_some() {
            "set"
        } else {
            "missing (set IPGUARD_API_KEY or GEMINI_API_KEY)"
        }
    );
    println!(
        "Audio:       in {} Hz, out {} Hz, {} samples per frame",
        config.audio.input_sample_rate, config.audio.output_sample_rate, config.audio.frame_size
    );

    Ok(())
}
