//! In-memory devices and sinks for engine tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::models::audio_models::AudioFormatSpec;
use crate::models::error::{CaptureError, DeviceReadError, PlaybackError};
use crate::models::recording_result::RecordingResult;
use crate::traits::capture_device::{CaptureDevice, CaptureDeviceFactory};
use crate::traits::output_device::{DeviceInterrupt, OutputDevice, OutputDeviceFactory, PositionCallback};
use crate::traits::sinks::{FrameSink, ProgressSink};

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_for<F: FnMut() -> bool>(mut cond: F, timeout: Duration) -> bool {
    let started = Instant::now();
    while started.elapsed() < timeout {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

// -- Capture --

#[derive(Default)]
pub struct MockCaptureStats {
    pub opens: AtomicUsize,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub releases: AtomicUsize,
    pub reads: AtomicUsize,
    pub open_threads: Mutex<Vec<ThreadId>>,
}

impl MockCaptureStats {
    pub fn live_handles(&self) -> usize {
        self.opens.load(Ordering::SeqCst) - self.releases.load(Ordering::SeqCst)
    }
}

/// Produces frames filled with a running byte counter.
pub struct MockCaptureFactory {
    pub stats: Arc<MockCaptureStats>,
    pub buffer_size: usize,
    pub read_delay: Duration,
    pub fail_all_reads: Arc<AtomicBool>,
    /// Channel count the opened device reports instead of the requested one.
    pub device_channels: Option<u16>,
    script: Arc<Mutex<VecDeque<Result<usize, DeviceReadError>>>>,
    open_error: Option<CaptureError>,
}

impl MockCaptureFactory {
    pub fn new() -> Self {
        Self {
            stats: Arc::new(MockCaptureStats::default()),
            buffer_size: 64,
            read_delay: Duration::from_millis(1),
            fail_all_reads: Arc::new(AtomicBool::new(false)),
            device_channels: None,
            script: Arc::new(Mutex::new(VecDeque::new())),
            open_error: None,
        }
    }

    /// Queue read outcomes consumed before the default behavior resumes.
    /// `Ok(n)` delivers `n` bytes.
    pub fn script(&self, steps: impl IntoIterator<Item = Result<usize, DeviceReadError>>) {
        self.script.lock().extend(steps);
    }

    pub fn failing_open(mut self, error: CaptureError) -> Self {
        self.open_error = Some(error);
        self
    }
}

impl CaptureDeviceFactory for MockCaptureFactory {
    fn min_buffer_size(&self, _format: &AudioFormatSpec) -> Result<usize, CaptureError> {
        Ok(self.buffer_size)
    }

    fn open(&self, format: &AudioFormatSpec, _buffer_size: usize) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        if let Some(err) = &self.open_error {
            return Err(err.clone());
        }
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        self.stats.open_threads.lock().push(thread::current().id());
        Ok(Box::new(MockCaptureDevice {
            stats: Arc::clone(&self.stats),
            script: Arc::clone(&self.script),
            fail_all_reads: Arc::clone(&self.fail_all_reads),
            read_delay: self.read_delay,
            channels: self.device_channels.unwrap_or(format.channels()),
            recording: false,
            counter: 0,
        }))
    }
}

struct MockCaptureDevice {
    stats: Arc<MockCaptureStats>,
    script: Arc<Mutex<VecDeque<Result<usize, DeviceReadError>>>>,
    fail_all_reads: Arc<AtomicBool>,
    read_delay: Duration,
    channels: u16,
    recording: bool,
    counter: u8,
}

impl CaptureDevice for MockCaptureDevice {
    fn start(&mut self) -> Result<(), CaptureError> {
        self.stats.starts.fetch_add(1, Ordering::SeqCst);
        self.recording = true;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, DeviceReadError> {
        thread::sleep(self.read_delay);
        self.stats.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_all_reads.load(Ordering::SeqCst) {
            return Err(DeviceReadError::DeadObject);
        }
        let len = match self.script.lock().pop_front() {
            Some(Err(e)) => return Err(e),
            Some(Ok(n)) => n.min(buf.len()),
            None => buf.len(),
        };
        for byte in &mut buf[..len] {
            *byte = self.counter;
            self.counter = self.counter.wrapping_add(1);
        }
        Ok(len)
    }

    fn is_recording(&self) -> bool {
        self.recording
    }

    fn channel_count(&self) -> u16 {
        self.channels
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        self.stats.stops.fetch_add(1, Ordering::SeqCst);
        self.recording = false;
        Ok(())
    }

    fn release(self: Box<Self>) {
        self.stats.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Collects everything a capture session reports.
#[derive(Default)]
pub struct CollectingFrameSink {
    pub frames: AtomicUsize,
    pub bytes: AtomicU64,
    pub captured: Mutex<Vec<u8>>,
    pub failures: Mutex<Vec<CaptureError>>,
    finished: Mutex<Option<Sender<RecordingResult>>>,
}

impl CollectingFrameSink {
    pub fn with_results() -> (Arc<Self>, Receiver<RecordingResult>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let sink = Self {
            finished: Mutex::new(Some(tx)),
            ..Self::default()
        };
        (Arc::new(sink), rx)
    }
}

impl FrameSink for CollectingFrameSink {
    fn on_frame_captured(&self, frame: &[u8]) {
        self.frames.fetch_add(1, Ordering::SeqCst);
        self.bytes.fetch_add(frame.len() as u64, Ordering::SeqCst);
        self.captured.lock().extend_from_slice(frame);
    }

    fn on_capture_finished(&self, result: &RecordingResult) {
        if let Some(tx) = self.finished.lock().as_ref() {
            let _ = tx.send(result.clone());
        }
    }

    fn on_capture_failed(&self, error: &CaptureError) {
        self.failures.lock().push(error.clone());
    }
}

// -- Playback --

#[derive(Default)]
pub struct MockOutputStats {
    pub opens: AtomicUsize,
    pub plays: AtomicUsize,
    pub stops: AtomicUsize,
    pub releases: AtomicUsize,
    pub interrupts: AtomicUsize,
    pub written: Mutex<Vec<u8>>,
    pub callback_threads: Mutex<Vec<ThreadId>>,
}

impl MockOutputStats {
    pub fn live_handles(&self) -> usize {
        self.opens.load(Ordering::SeqCst) - self.releases.load(Ordering::SeqCst)
    }
}

/// Accepts writes into memory, advancing the head as if rendered instantly.
pub struct MockOutputFactory {
    pub stats: Arc<MockOutputStats>,
    pub buffer_size: usize,
    pub write_delay: Duration,
    pub fail_writes: Arc<AtomicBool>,
    pub panic_next_write: Arc<AtomicBool>,
}

impl MockOutputFactory {
    pub fn new() -> Self {
        Self {
            stats: Arc::new(MockOutputStats::default()),
            buffer_size: 4096,
            write_delay: Duration::ZERO,
            fail_writes: Arc::new(AtomicBool::new(false)),
            panic_next_write: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl OutputDeviceFactory for MockOutputFactory {
    fn min_buffer_size(&self, _format: &AudioFormatSpec) -> Result<usize, PlaybackError> {
        Ok(self.buffer_size)
    }

    fn open(&self, format: &AudioFormatSpec, _buffer_size: usize) -> Result<Box<dyn OutputDevice>, PlaybackError> {
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockOutputDevice {
            stats: Arc::clone(&self.stats),
            write_delay: self.write_delay,
            fail_writes: Arc::clone(&self.fail_writes),
            panic_next_write: Arc::clone(&self.panic_next_write),
            format: *format,
            interrupted: Arc::new(AtomicBool::new(false)),
            head_frames: 0,
            period: 0,
            callback: None,
        }))
    }
}

struct MockOutputDevice {
    stats: Arc<MockOutputStats>,
    write_delay: Duration,
    fail_writes: Arc<AtomicBool>,
    panic_next_write: Arc<AtomicBool>,
    format: AudioFormatSpec,
    interrupted: Arc<AtomicBool>,
    head_frames: u64,
    period: u32,
    callback: Option<PositionCallback>,
}

impl OutputDevice for MockOutputDevice {
    fn set_position_callback(&mut self, period_frames: u32, callback: PositionCallback) {
        self.period = period_frames;
        self.callback = Some(callback);
    }

    fn interrupt_handle(&self) -> DeviceInterrupt {
        let interrupted = Arc::clone(&self.interrupted);
        let stats = Arc::clone(&self.stats);
        Arc::new(move || {
            stats.interrupts.fetch_add(1, Ordering::SeqCst);
            interrupted.store(true, Ordering::SeqCst);
        })
    }

    fn play(&mut self) -> Result<(), PlaybackError> {
        self.stats.plays.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, PlaybackError> {
        if self.interrupted.load(Ordering::SeqCst) {
            return Ok(0);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PlaybackError::Device("write rejected".into()));
        }
        if self.panic_next_write.swap(false, Ordering::SeqCst) {
            panic!("output device blew up");
        }
        if !self.write_delay.is_zero() {
            thread::sleep(self.write_delay);
        }
        self.stats.written.lock().extend_from_slice(data);

        let before = self.head_frames;
        self.head_frames += data.len() as u64 / self.format.bytes_per_frame() as u64;
        if let Some(callback) = self.callback.as_mut() {
            let period = self.period.max(1) as u64;
            for boundary in (before / period + 1)..=(self.head_frames / period) {
                self.stats.callback_threads.lock().push(thread::current().id());
                callback(boundary * period, self.format.sample_rate_hz);
            }
        }
        Ok(data.len())
    }

    fn playback_head_position(&self) -> u64 {
        self.head_frames
    }

    fn playback_rate(&self) -> u32 {
        self.format.sample_rate_hz
    }

    fn stop(&mut self) {
        self.stats.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn release(self: Box<Self>) {
        self.stats.releases.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Init(u32),
    PlayTime(u32),
}

/// Records progress events along with the thread they arrived on.
#[derive(Default)]
pub struct ProgressLog {
    pub events: Mutex<Vec<(Progress, ThreadId)>>,
}

impl ProgressLog {
    pub fn progress(&self) -> Vec<Progress> {
        self.events.lock().iter().map(|(p, _)| *p).collect()
    }

    pub fn threads(&self) -> Vec<ThreadId> {
        self.events.lock().iter().map(|(_, t)| *t).collect()
    }
}

impl ProgressSink for ProgressLog {
    fn on_init(&self, total_secs: u32) {
        self.events.lock().push((Progress::Init(total_secs), thread::current().id()));
    }

    fn on_play_time(&self, current_secs: u32) {
        self.events.lock().push((Progress::PlayTime(current_secs), thread::current().id()));
    }
}
