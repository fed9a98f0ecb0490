use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use hubby_audio_core::{AudioController, CaptureError, FrameSink, ProgressSink, RecorderConfig, RecordingResult};
use hubby_audio_cpal::{CpalCaptureFactory, CpalOutputFactory, MicrophoneAccess};

/// The controller wired to the cpal backend, plus the reporter it feeds.
pub struct AudioState {
    pub controller: AudioController,
    pub reporter: Arc<CaptureReporter>,
    pub finished: Receiver<RecordingResult>,
}

impl AudioState {
    pub fn new(config: RecorderConfig) -> Self {
        let (reporter, finished) = CaptureReporter::new();
        let controller = AudioController::new(
            config,
            Arc::new(CpalCaptureFactory::new()),
            Arc::new(CpalOutputFactory::new()),
            Arc::new(MicrophoneAccess),
        )
        .with_frame_sink(reporter.clone());
        Self {
            controller,
            reporter,
            finished,
        }
    }
}

/// FrameSink that tallies captured bytes and forwards the final result.
pub struct CaptureReporter {
    bytes: AtomicU64,
    frames: AtomicU64,
    errors: Mutex<Vec<CaptureError>>,
    finished: Sender<RecordingResult>,
}

impl CaptureReporter {
    pub fn new() -> (Arc<Self>, Receiver<RecordingResult>) {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let reporter = Self {
            bytes: AtomicU64::new(0),
            frames: AtomicU64::new(0),
            errors: Mutex::new(Vec::new()),
            finished: tx,
        };
        (Arc::new(reporter), rx)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn take_errors(&self) -> Vec<CaptureError> {
        std::mem::take(&mut *self.errors.lock())
    }
}

impl FrameSink for CaptureReporter {
    fn on_frame_captured(&self, frame: &[u8]) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(frame.len() as u64, Ordering::Relaxed);
    }

    fn on_capture_finished(&self, result: &RecordingResult) {
        let _ = self.finished.try_send(result.clone());
    }

    fn on_capture_failed(&self, error: &CaptureError) {
        log::error!("capture failed: {}", error);
        self.errors.lock().push(error.clone());
    }
}

/// Prints playback progress on one console line.
///
/// Runs on the main thread: the CLI pumps the dispatch queue there.
#[derive(Default)]
pub struct ConsoleProgress {
    total_secs: AtomicU64,
}

impl ProgressSink for ConsoleProgress {
    fn on_init(&self, total_secs: u32) {
        self.total_secs.store(u64::from(total_secs), Ordering::Relaxed);
        println!("Duration: {}", format_clock(u64::from(total_secs)));
    }

    fn on_play_time(&self, current_secs: u32) {
        if current_secs == 0 {
            println!("\nPlayback finished.");
            return;
        }
        print!(
            "\rPlaying: {} / {}    ",
            format_clock(u64::from(current_secs)),
            format_clock(self.total_secs.load(Ordering::Relaxed))
        );
        std::io::stdout().flush().ok();
    }
}

/// `mm:ss`
pub fn format_clock(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
