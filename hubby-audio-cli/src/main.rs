mod audio_state;
mod commands;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use hubby_audio_core::{AudioFormatSpec, RecorderConfig};

use audio_state::AudioState;

#[derive(Parser)]
#[command(name = "hubby")]
#[command(about = "Record the microphone to PCM/WAV and play recordings back")]
struct Args {
    /// PCM scratch file (default: hubby_temp.pcm in the user cache directory).
    /// The WAV file is written next to it.
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Capture sample rate in Hz
    #[arg(long, global = true, default_value_t = 44_100)]
    sample_rate: u32,

    /// Channel count (1 or 2)
    #[arg(long, global = true, default_value_t = 2)]
    channels: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record from the default microphone until Ctrl+C
    Record {
        /// Stop automatically after this many seconds
        #[arg(short, long)]
        seconds: Option<f64>,

        /// Write a <name>.metadata.json sidecar next to the WAV file
        #[arg(long)]
        metadata: bool,

        /// End the session after this many consecutive failed device reads
        #[arg(long)]
        max_read_errors: Option<u32>,
    },
    /// Play a PCM or WAV file (default: the last recording)
    Play {
        path: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = RecorderConfig {
        format: AudioFormatSpec::new(args.sample_rate, args.channels, 16),
        ..RecorderConfig::default()
    };
    if let Some(output) = args.output {
        config = config.with_temp_file(output);
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nReceived Ctrl+C, stopping...");
        r.store(false, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    match args.command {
        Command::Record {
            seconds,
            metadata,
            max_read_errors,
        } => {
            config.max_consecutive_read_errors = max_read_errors;
            let state = AudioState::new(config);
            commands::record(&state, seconds, metadata, &running)
        }
        Command::Play { path } => {
            let state = AudioState::new(config);
            commands::play(&state, path, &running)
        }
    }
}
