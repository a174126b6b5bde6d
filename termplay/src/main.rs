mod audio;
mod controls;
mod render;
mod settings;

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::TryRecvError;
use crossterm::{
    cursor::{Hide, Show},
    event::{self, Event},
    execute,
    style::ResetColor,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use tracing_subscriber::EnvFilter;

use media_decode::{FfmpegSource, SourceOptions};
use media_pipeline::{AudioOutput, Pipeline, PipelineEvent, Renderer};
use media_types::BufferPool;

use audio::AudioDevice;
use controls::{Command, map_key};
use render::TerminalRenderer;
use settings::{SeekSteps, Settings};

/// How long the input loop waits for a key before checking pipeline events.
const INPUT_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Parser)]
#[command(name = "termplay", version, about = "Play a media file in the terminal")]
struct Args {
    /// Media file to play
    input: PathBuf,
    /// Settings file (defaults to the user config directory)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Log file (defaults to the user cache directory)
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
    /// Play video only
    #[arg(long)]
    no_audio: bool,
    /// Start position in seconds
    #[arg(long, value_name = "SECONDS")]
    start: Option<f64>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_path = args.log_file.clone().unwrap_or_else(default_log_path);
    init_tracing(&log_path)?;

    let settings = load_settings(args.config.as_deref())?;

    let device = if args.no_audio {
        None
    } else {
        match AudioDevice::open_default() {
            Ok(device) => Some(device),
            Err(e) => {
                tracing::warn!(%e, "audio unavailable, playing video only");
                None
            }
        }
    };

    let available = FfmpegSource::probe(&args.input)
        .with_context(|| format!("failed to open {}", args.input.display()))?;
    let options = stream_selection(available, device.is_some());
    let source = FfmpegSource::open(&args.input, options, BufferPool::new())
        .with_context(|| format!("failed to open {}", args.input.display()))?;
    let output = device
        .as_ref()
        .map(|device| device.output() as Arc<dyn AudioOutput>);

    let terminal = TerminalGuard::enter().context("failed to set up terminal")?;
    let renderer: Box<dyn Renderer> = Box::new(TerminalRenderer::new(io::stdout()));

    let pipeline = Pipeline::start(Box::new(source), output, Some(renderer), &settings.pipeline)
        .context("failed to start playback")?;

    let result = play(&pipeline, &args, &settings);
    let shutdown = pipeline.shutdown();

    drop(terminal);
    drop(device);

    result?;
    shutdown.context("playback failed")
}

/**
    Decode video whenever the file has it, and audio only when there is
    also a device to play it on.
*/
fn stream_selection(available: SourceOptions, have_device: bool) -> SourceOptions {
    SourceOptions {
        audio: available.audio && have_device,
        video: available.video,
    }
}

fn play(pipeline: &Pipeline, args: &Args, settings: &Settings) -> Result<()> {
    if let Some(start) = args.start {
        pipeline.seek_to(start).context("failed to seek to start")?;
    }
    thread::sleep(settings.startup_delay());
    pipeline.play();
    run_input_loop(pipeline, &settings.seek_steps)
}

/**
    Handle keys until the user quits or the pipeline fails.

    Reaching the end of the media does not exit; seeking back resumes
    playback.
*/
fn run_input_loop(pipeline: &Pipeline, steps: &SeekSteps) -> Result<()> {
    loop {
        match pipeline.events().try_recv() {
            Ok(PipelineEvent::Finished) => {
                tracing::info!(stats = ?pipeline.stats(), "playback reached the end");
            }
            Ok(PipelineEvent::Failed(err)) => {
                return Err(err).context("playback failed");
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => return Ok(()),
        }

        if !event::poll(INPUT_POLL)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        match map_key(&key, steps) {
            Some(Command::Seek(offset)) => {
                let target = pipeline.seek_relative(offset).context("seek failed")?;
                tracing::debug!(offset, ?target, "seek requested from keyboard");
            }
            Some(Command::TogglePause) => {
                pipeline.toggle_pause();
            }
            Some(Command::Quit) => return Ok(()),
            None => {}
        }
    }
}

/**
    Load settings from `--config`, or from the default location. A settings
    file with every default is written there on first run.
*/
fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    if let Some(path) = explicit {
        return Settings::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()));
    }
    let Some(path) = Settings::default_path() else {
        return Ok(Settings::default());
    };
    if !path.exists() {
        let settings = Settings::default();
        if let Err(e) = settings.save(&path) {
            tracing::warn!(%e, path = %path.display(), "failed to write default settings");
        }
        return Ok(settings);
    }
    Settings::load(&path).with_context(|| format!("failed to load settings from {}", path.display()))
}

fn default_log_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("termplay")
        .join("termplay.log")
}

/**
    Send logs to a file; the terminal is busy showing video.
*/
fn init_tracing(log_path: &Path) -> Result<()> {
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
    Ok(())
}

/**
    Raw mode on the alternate screen with the cursor hidden, restored on drop.
*/
struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        let guard = Self;
        execute!(io::stdout(), EnterAlternateScreen, Hide)?;
        Ok(guard)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let mut stdout = io::stdout();
        let _ = execute!(stdout, ResetColor, Show, LeaveAlternateScreen);
        let _ = stdout.flush();
        let _ = disable_raw_mode();
    }
}
