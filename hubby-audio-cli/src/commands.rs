use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use crossbeam_channel::Receiver;

use hubby_audio_core::storage::metadata::write_metadata;
use hubby_audio_core::{dispatch_queue, AudioFormatSpec, AudioRecorder, RecordingResult};

use crate::audio_state::{format_clock, AudioState, CaptureReporter, ConsoleProgress};

/// How long `record` waits for the capture thread to finalize the files.
const FINALIZE_TIMEOUT: Duration = Duration::from_secs(10);

/// Summary of a finished recording, printed after `record`.
pub struct RecordingInfo {
    pub file_path: String,
    pub size_bytes: u64,
    pub duration_secs: f64,
    pub checksum: String,
    pub created_at: String,
}

impl RecordingInfo {
    fn from_result(result: &RecordingResult) -> Self {
        let size_bytes = fs::metadata(&result.wav_path).map(|m| m.len()).unwrap_or(0);
        Self {
            file_path: result.wav_path.to_string_lossy().to_string(),
            size_bytes,
            duration_secs: result.duration_secs,
            checksum: result.checksum.clone(),
            created_at: result.created_at.to_rfc3339(),
        }
    }

    pub fn print(&self) {
        println!("Saved: {}", self.file_path);
        println!("  Size: {:.2} MB", self.size_bytes as f64 / (1024.0 * 1024.0));
        println!("  Duration: {:.1}s", self.duration_secs);
        println!("  SHA-256: {}", self.checksum);
        println!("  Created: {}", self.created_at);
    }
}

/// Record until `seconds` elapse or `running` clears.
pub fn record(state: &AudioState, seconds: Option<f64>, metadata: bool, running: &AtomicBool) -> Result<()> {
    let format = *state.controller.recorder().format();
    print_format(&format);
    println!("PCM scratch: {}", state.controller.temp_file_path().display());
    println!("Press Ctrl+C to stop\n");

    state.controller.start_record().context("failed to start recording")?;

    let limit = seconds.map(Duration::from_secs_f64);
    let started = Instant::now();
    while running.load(Ordering::SeqCst) && state.controller.is_recording() {
        if limit.is_some_and(|limit| started.elapsed() >= limit) {
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
        let bytes = state.reporter.bytes();
        print!(
            "\rRecording: {} | Frames: {} | Size: {:.2} MB    ",
            format_clock(started.elapsed().as_secs()),
            state.reporter.frames(),
            bytes as f64 / (1024.0 * 1024.0)
        );
        std::io::Write::flush(&mut std::io::stdout()).ok();
    }
    println!();

    state.controller.stop_record();
    let result = collect_recording(
        state.controller.recorder(),
        &state.reporter,
        &state.finished,
        FINALIZE_TIMEOUT,
    )?;

    RecordingInfo::from_result(&result).print();
    if metadata {
        let path = write_metadata(&result.metadata(), &result.wav_path)?;
        println!("  Metadata: {}", path.display());
    }
    Ok(())
}

/// Wait for the capture thread to exit, then surface its failure or its result.
fn collect_recording(
    recorder: &AudioRecorder,
    reporter: &CaptureReporter,
    finished: &Receiver<RecordingResult>,
    timeout: Duration,
) -> Result<RecordingResult> {
    let deadline = Instant::now() + timeout;
    while recorder.is_running() {
        if Instant::now() >= deadline {
            bail!("capture thread did not finalize the recording");
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    recorder.join_worker();

    let errors = reporter.take_errors();
    for error in errors.iter().skip(1) {
        eprintln!("Error: {}", error);
    }
    if let Some(error) = errors.into_iter().next() {
        return Err(error).context("recording failed");
    }
    finished.try_recv().context("capture thread ended without a result")
}

/// Play `path` (or the last recording) and pump progress on this thread.
pub fn play(state: &AudioState, path: Option<PathBuf>, running: &AtomicBool) -> Result<()> {
    let path = path.unwrap_or_else(|| state.controller.wav_file_path().to_path_buf());
    if !path.is_file() {
        bail!("nothing to play: {} does not exist", path.display());
    }
    println!("Playing: {}", path.display());

    let (dispatcher, queue) = dispatch_queue();
    state
        .controller
        .start_play(&path, Some(Arc::new(ConsoleProgress::default())), Some(Arc::new(dispatcher)))
        .with_context(|| format!("failed to play {}", path.display()))?;

    let tracker = state.controller.tracker();
    while tracker.is_running() {
        if !running.load(Ordering::SeqCst) {
            state.controller.stop_play();
        }
        queue.run_one(Duration::from_millis(100));
    }
    queue.run_pending();
    Ok(())
}

fn print_format(format: &AudioFormatSpec) {
    println!("Audio format:");
    println!("  Sample rate: {} Hz", format.sample_rate_hz);
    println!("  Channels: {}", format.channel_count);
    println!("  Bits per sample: {}", format.bits_per_sample);
    println!();
}
