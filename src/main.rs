//! Dictare - push-to-talk dictation for Linux
//!
//! Run with `dictare` or `dictare daemon` to start the daemon.
//! Use `dictare setup --download` to check dependencies and fetch models.
//! Use `dictare transcribe <file>` to transcribe an audio file.

use clap::{Parser, Subcommand};
use dictare::config::{self, ActivationMode, OutputMode};
use dictare::model::ModelHost;
use dictare::{setup, Daemon};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dictare")]
#[command(author, version, about = "Push-to-talk dictation for Linux")]
#[command(long_about = "
Dictare is a push-to-talk dictation tool for Linux.
Hold a hotkey to record, release to transcribe; the text is typed into
whatever has focus, or copied to the clipboard as a fallback.

SETUP:
  1. Add yourself to the input group: sudo usermod -aG input $USER
  2. Log out and back in
  3. Run: dictare setup --download (to fetch the whisper model)
  4. Run: dictare (to start the daemon)

USAGE:
  Hold ScrollLock (default) while speaking, release to transcribe.
  In toggle mode, recording also stops by itself after a stretch of
  silence. Press Escape to cancel a recording.
")]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    quiet: bool,

    /// Force clipboard mode (don't try to type)
    #[arg(long)]
    clipboard: bool,

    /// Override whisper model (tiny, base, small, medium, large-v3)
    #[arg(long, value_name = "MODEL")]
    model: Option<String>,

    /// Override hotkey (e.g., SCROLLLOCK, PAUSE, F13)
    #[arg(long, value_name = "KEY")]
    hotkey: Option<String>,

    /// Use toggle mode (press to start/stop) instead of push-to-talk
    #[arg(long)]
    toggle: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run as daemon (default if no command specified)
    Daemon,

    /// Transcribe an audio file (WAV, 16kHz, mono)
    Transcribe {
        /// Path to audio file
        file: PathBuf,
    },

    /// Check setup and optionally download the model
    Setup {
        /// Download the model if missing
        #[arg(long)]
        download: bool,
    },

    /// Show the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("dictare={}", log_level))),
        )
        .init();

    let mut config = config::load_config(cli.config.as_deref())?;

    // CLI overrides (highest priority)
    if cli.clipboard {
        config.output.mode = OutputMode::Clipboard;
    }
    if let Some(model) = cli.model {
        config.model.name = model;
    }
    if let Some(hotkey) = cli.hotkey {
        config.hotkey.key = hotkey;
    }
    if cli.toggle {
        config.hotkey.mode = ActivationMode::Toggle;
    }

    match cli.command.unwrap_or(Commands::Daemon) {
        Commands::Daemon => {
            let mut daemon = Daemon::new(config);
            daemon.run().await?;
        }
        Commands::Transcribe { file } => {
            let samples = read_wav_mono(&file, config.audio.sample_rate)?;
            let host = ModelHost::new(&config.model);
            let text = host.transcribe(samples, None).await?;
            println!("{}", text);
        }
        Commands::Setup { download } => {
            setup::run_setup(&config, download).await?;
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

/// Read a WAV file as mono f32 samples, verifying the sample rate
fn read_wav_mono(path: &PathBuf, expected_rate: u32) -> anyhow::Result<Vec<f32>> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| anyhow::anyhow!("Failed to open {:?}: {}", path, e))?;
    let spec = reader.spec();

    if spec.sample_rate != expected_rate {
        anyhow::bail!(
            "Expected {} Hz audio, got {} Hz (resample with: ffmpeg -i in.wav -ar {} out.wav)",
            expected_rate,
            spec.sample_rate,
            expected_rate
        );
    }

    let channels = spec.channels as usize;
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    // Mix down to mono if needed
    if channels > 1 {
        Ok(samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect())
    } else {
        Ok(samples)
    }
}
