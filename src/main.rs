//! Saathi terminal client

use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};

use saathi_client::{
    AudioPlayback, AudioRef, CapturePipeline, ChatSession, ClientConfig, Content, HttpBackend,
    IdentityStore, MicRecorder, Mode, PersonaType, RoleSelector, Sender, SessionEvent, StopReason,
    SubmitOutcome, TerminalGate, samples_to_wav,
};

#[derive(Parser)]
#[command(name = "saathi", version, about = "Terminal client for the Saathi chat service")]
struct Cli {
    /// Backend origin, e.g. https://chat.example.com
    #[arg(long, env = "SAATHI_BACKEND_URL")]
    backend_url: Option<String>,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a short clip from the default microphone and save it as WAV
    TestMic {
        /// Recording duration in seconds
        #[arg(short, long, default_value = "3")]
        duration: u64,
    },

    /// Play a test tone through the default output device
    TestSpeaker,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn,saathi_client=info",
        1 => "info,saathi_client=debug",
        _ => "debug,saathi_client=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    match cli.command {
        Some(Commands::TestMic { duration }) => test_mic(duration).await,
        Some(Commands::TestSpeaker) => test_speaker(),
        None => run_chat(cli.backend_url).await,
    }
}

async fn run_chat(backend_url: Option<String>) -> Result<()> {
    let mut config = ClientConfig::load().context("failed to load configuration")?;
    if let Some(url) = backend_url {
        config.backend_url = url;
    }

    let mut store =
        IdentityStore::open(&config.state_path()).context("failed to open client state")?;
    check_build_marker(&mut store);

    let backend =
        HttpBackend::new(&config.backend_url).context("invalid backend configuration")?;
    let gate = Arc::new(TerminalGate);

    let (mut session, mut events_rx) = ChatSession::new(store, backend, gate, &config)
        .context("failed to initialize session")?;
    session.start().await;

    println!("Saathi · {} · type /help for commands", session.session_key());
    let mut printed = 0;
    render_new(&mut printed, &mut session).await;

    let mut recorder: Option<CapturePipeline<MicRecorder>> = None;
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    prompt();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("stdin closed unexpectedly")? else {
                    break;
                };

                match line.trim() {
                    "" => {}
                    "/quit" | "/exit" => break,
                    "/help" => print_help(),
                    "/unlock" => {
                        session.unlock();
                        println!("(unlocked)");
                    }
                    "/record" => {
                        record_turn(&mut session, &mut recorder, &mut lines, config.max_record())
                            .await;
                    }
                    input if input.starts_with("/role") => {
                        handle_role_command(&mut session, input).await;
                    }
                    input => {
                        match session.submit_text(input).await {
                            Ok(SubmitOutcome::Suppressed) => report_suppressed(&session),
                            Ok(_) => {}
                            Err(e) => error!(error = %e, "submission failed"),
                        }
                    }
                }

                render_new(&mut printed, &mut session).await;
                prompt();
            }

            Some(event) = events_rx.recv() => {
                debug!(?event, "session event");
                session.handle_event(event);
                if event == SessionEvent::ClearHistory {
                    printed = 0;
                }
                render_new(&mut printed, &mut session).await;
                prompt();
            }

            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    info!("session ended");
    Ok(())
}

/// Detect a new deployment by comparing the persisted build marker
fn check_build_marker(store: &mut IdentityStore) {
    let current = env!("CARGO_PKG_VERSION");
    let cached = store.build_version().map(str::to_string);
    if cached.as_deref() == Some(current) {
        return;
    }

    if let Some(previous) = cached {
        info!(previous = %previous, current, "new build detected");
    }
    if let Err(e) = store.set_build_version(current) {
        warn!(error = %e, "failed to persist build marker");
    }
}

/// Run one push-to-talk voice turn
///
/// Recording stops on the next Enter press or when the cap expires,
/// whichever comes first.
async fn record_turn(
    session: &mut ChatSession<HttpBackend, TerminalGate>,
    recorder: &mut Option<CapturePipeline<MicRecorder>>,
    lines: &mut tokio::io::Lines<BufReader<tokio::io::Stdin>>,
    max_record: Duration,
) {
    if recorder.is_none() {
        match MicRecorder::new() {
            Ok(mic) => {
                *recorder = Some(CapturePipeline::with_max_duration(mic, max_record));
            }
            Err(e) => {
                error!(error = %e, "microphone unavailable");
                println!("(microphone unavailable: {e})");
                return;
            }
        }
    }
    let Some(pipeline) = recorder.as_mut() else {
        return;
    };

    println!("● recording… press Enter to stop ({}s max)", max_record.as_secs());
    let outcome = pipeline
        .capture_until(async {
            let _ = lines.next_line().await;
        })
        .await;

    match outcome {
        Ok(Some((payload, reason))) => {
            if reason == StopReason::TimeoutExpired {
                println!("(time limit reached)");
            }
            session.submit_audio(payload).await;
        }
        Ok(None) => debug!("recording already stopped"),
        Err(e) => error!(error = %e, "could not start recording"),
    }
}

async fn handle_role_command(
    session: &mut ChatSession<HttpBackend, TerminalGate>,
    input: &str,
) {
    let arg = input.strip_prefix("/role").map(str::trim).unwrap_or_default();
    let role = if arg.is_empty() || arg.eq_ignore_ascii_case("stranger") {
        RoleSelector::stranger()
    } else {
        match PersonaType::parse(arg) {
            Some(persona) => RoleSelector::roleplay(persona),
            None => {
                println!("(unknown persona '{arg}': wife, girlfriend, bhabhi, cousin)");
                return;
            }
        }
    };

    match session.request_role_change(role).await {
        Ok(true) => {}
        Ok(false) => println!("(role unchanged)"),
        Err(e) => error!(error = %e, "role switch failed"),
    }
}

/// Print messages appended since the last render; voice replies are also
/// fetched and played
async fn render_new(
    printed: &mut usize,
    session: &mut ChatSession<HttpBackend, TerminalGate>,
) {
    let mut audio_to_play = Vec::new();

    // History can shrink (clear, role switch); re-render from the top then
    let start = if *printed > session.messages().len() {
        0
    } else {
        *printed
    };
    for message in &session.messages()[start..] {
        match (&message.sender, &message.content) {
            (Sender::User, Content::Text(text)) => println!("you: {text}"),
            (Sender::User, Content::Voice(_)) => println!("you: [voice note]"),
            (Sender::Persona, Content::Text(text)) => println!("saathi: {text}"),
            (Sender::Persona, Content::Voice(AudioRef::Remote(url))) => {
                println!("saathi: [voice reply]");
                audio_to_play.push(url.clone());
            }
            (Sender::Persona, Content::Voice(AudioRef::LocalNote)) => {}
        }
    }
    *printed = session.messages().len();
    session.mark_all_seen();

    for url in audio_to_play {
        if let Err(e) = play_remote_audio(&url).await {
            warn!(error = %e, url = %url, "could not play voice reply");
        }
    }

    if let Mode::Paused { until } = session.mode() {
        println!("(she stepped away, back around {})", until.format("%H:%M"));
    }
}

async fn play_remote_audio(url: &str) -> Result<()> {
    let bytes = reqwest::get(url).await?.error_for_status()?.bytes().await?;
    let mut playback = AudioPlayback::new()?;
    playback.play_mp3(&bytes).await?;
    Ok(())
}

fn report_suppressed(session: &ChatSession<HttpBackend, TerminalGate>) {
    match session.mode() {
        Mode::Locked => println!("(locked - /unlock after setting an owner key)"),
        Mode::Paused { until } => {
            println!("(she's away until around {})", until.format("%H:%M"));
        }
        Mode::Active => {}
    }
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

fn print_help() {
    println!("commands:");
    println!("  /record          record a voice note (Enter stops)");
    println!("  /role <persona>  switch persona (wife, girlfriend, bhabhi, cousin)");
    println!("  /stranger        switch back to stranger mode");
    println!("  /clear           clear the conversation");
    println!("  /unlock          clear a premium lock");
    println!("  /quit            exit");
}

async fn test_mic(duration: u64) -> Result<()> {
    use saathi_client::Recorder;

    println!("Recording {duration}s from the default microphone…");
    let mut mic = MicRecorder::new()?;
    mic.begin()?;
    tokio::time::sleep(Duration::from_secs(duration)).await;
    let samples = mic.stop();

    let wav = samples_to_wav(&samples, saathi_client::SAMPLE_RATE)?;
    let path = std::env::temp_dir().join("saathi-mic-test.wav");
    std::fs::write(&path, wav)?;
    println!("Captured {} samples -> {}", samples.len(), path.display());
    Ok(())
}

fn test_speaker() -> Result<()> {
    println!("Playing test tone…");
    let playback = AudioPlayback::new()?;
    playback.play_tone(440.0, Duration::from_secs(2))?;
    println!("Done");
    Ok(())
}
