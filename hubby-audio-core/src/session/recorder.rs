use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::models::audio_models::{AudioFormatSpec, CAPTURE_CAPABILITIES};
use crate::models::config::{wav_path_for, RecorderConfig};
use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::EngineState;
use crate::session::panic_message;
use crate::storage::capture_writer::{sha256_file, CaptureFileWriter};
use crate::traits::capture_device::{CaptureDevice, CaptureDeviceFactory};
use crate::traits::permission::PermissionChecker;
use crate::traits::sinks::FrameSink;

/// Session shell: created by the first start, reused by every later one.
struct CaptureSession {
    min_buffer_size: usize,
    worker: Option<thread::JoinHandle<()>>,
}

impl CaptureSession {
    fn worker_alive(&self) -> bool {
        self.worker.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Joins the worker; `false` if it panicked.
    fn join_worker(&mut self) -> bool {
        match self.worker.take().map(thread::JoinHandle::join) {
            Some(Err(_)) => {
                log::error!("capture worker panicked");
                false
            }
            _ => true,
        }
    }
}

/// Microphone capture engine.
///
/// Reads fixed-size frames from a [`CaptureDevice`] on a dedicated thread,
/// forwards each one to an optional [`FrameSink`], and persists the stream as
/// a PCM scratch file plus a WAV file whose header is patched on stop:
///
/// ```text
/// [CaptureDevice] → read frame → [FrameSink]
///                              → [<name>.pcm]
///                              → [<name>.wav] (header patched on exit)
/// ```
///
/// At most one capture loop runs at a time. `stop_record` only clears the
/// running flag; the loop finishes its iteration, finalizes the files and
/// releases the device by itself.
pub struct AudioRecorder {
    config: RecorderConfig,
    pcm_path: PathBuf,
    wav_path: PathBuf,
    devices: Arc<dyn CaptureDeviceFactory>,
    permissions: Arc<dyn PermissionChecker>,
    frame_sink: Option<Arc<dyn FrameSink>>,
    is_recording: Arc<AtomicBool>,
    session: Mutex<Option<CaptureSession>>,
}

impl AudioRecorder {
    pub fn new(
        config: RecorderConfig,
        devices: Arc<dyn CaptureDeviceFactory>,
        permissions: Arc<dyn PermissionChecker>,
    ) -> Self {
        let pcm_path = config.resolve_temp_file();
        let wav_path = wav_path_for(&pcm_path);
        Self {
            config,
            pcm_path,
            wav_path,
            devices,
            permissions,
            frame_sink: None,
            is_recording: Arc::new(AtomicBool::new(false)),
            session: Mutex::new(None),
        }
    }

    pub fn with_frame_sink(mut self, sink: Arc<dyn FrameSink>) -> Self {
        self.frame_sink = Some(sink);
        self
    }

    pub fn format(&self) -> &AudioFormatSpec {
        &self.config.format
    }

    /// PCM scratch path, stable across restarts.
    pub fn temp_file_path(&self) -> &Path {
        &self.pcm_path
    }

    pub fn wav_file_path(&self) -> &Path {
        &self.wav_path
    }

    pub fn is_recording(&self) -> bool {
        self.is_recording.load(Ordering::SeqCst)
    }

    /// Whether a capture worker thread is still alive (running or tearing down).
    pub fn is_running(&self) -> bool {
        self.session.lock().as_ref().is_some_and(CaptureSession::worker_alive)
    }

    pub fn state(&self) -> EngineState {
        EngineState::from_flags(self.is_recording(), self.is_running())
    }

    /// Start capturing on a new worker thread.
    ///
    /// Returns `Ok(())` without doing anything if a capture loop is already
    /// running.
    pub fn start_record(&self) -> Result<(), CaptureError> {
        if !self.permissions.is_granted(CAPTURE_CAPABILITIES) {
            return Err(CaptureError::PermissionDenied(format!(
                "required capabilities not granted: {:?}",
                CAPTURE_CAPABILITIES
            )));
        }
        self.config.format.validate_for_capture()?;

        let mut guard = self.session.lock();
        let session = match guard.take() {
            Some(session) => session,
            None => CaptureSession {
                min_buffer_size: self.devices.min_buffer_size(&self.config.format)?,
                worker: None,
            },
        };
        let session = guard.insert(session);

        if self.is_recording.load(Ordering::SeqCst) && session.worker_alive() {
            log::warn!("capture already running, ignoring start");
            return Ok(());
        }

        // The previous loop may still be patching its header; it owns the
        // same files, so it must be gone before a new writer truncates them.
        if session.worker_alive() {
            log::debug!("waiting for previous capture session to finish");
        }
        if !session.join_worker() {
            // A worker that died unwinding may not have cleared its flag.
            self.is_recording.store(false, Ordering::SeqCst);
        }

        if self
            .is_recording
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::warn!("capture already running, ignoring start");
            return Ok(());
        }

        let device = match self.devices.open(&self.config.format, session.min_buffer_size) {
            Ok(device) => device,
            Err(e) => {
                self.is_recording.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let job = CaptureJob {
            session_id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            device,
            is_recording: Arc::clone(&self.is_recording),
            buffer_size: session.min_buffer_size,
            format: self.config.format,
            pcm_path: self.pcm_path.clone(),
            wav_path: self.wav_path.clone(),
            sink: self.frame_sink.clone(),
            max_consecutive_read_errors: self.config.max_consecutive_read_errors,
        };

        let handle = thread::Builder::new()
            .name("hubby-capture".into())
            .spawn(move || job.run())
            .map_err(|e| {
                self.is_recording.store(false, Ordering::SeqCst);
                CaptureError::Unknown(format!("failed to spawn capture thread: {}", e))
            })?;

        session.worker = Some(handle);
        Ok(())
    }

    /// Ask the capture loop to stop. Idempotent and non-blocking.
    pub fn stop_record(&self) {
        if self
            .is_recording
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            log::debug!("capture stop requested");
        }
    }

    /// Block until the current worker, if any, has released its device.
    ///
    /// Does not stop the loop; call [`stop_record`](Self::stop_record) first.
    pub fn join_worker(&self) {
        let handle = self.session.lock().as_mut().and_then(|s| s.worker.take());
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("capture worker panicked");
            }
        }
    }
}

impl Drop for AudioRecorder {
    fn drop(&mut self) {
        self.stop_record();
        self.join_worker();
    }
}

/// Everything the capture thread owns for one session.
struct CaptureJob {
    session_id: String,
    created_at: DateTime<Utc>,
    device: Box<dyn CaptureDevice>,
    is_recording: Arc<AtomicBool>,
    buffer_size: usize,
    format: AudioFormatSpec,
    pcm_path: PathBuf,
    wav_path: PathBuf,
    sink: Option<Arc<dyn FrameSink>>,
    max_consecutive_read_errors: Option<u32>,
}

impl CaptureJob {
    fn run(self) {
        let CaptureJob {
            session_id,
            created_at,
            mut device,
            is_recording,
            buffer_size,
            format,
            pcm_path,
            wav_path,
            sink,
            max_consecutive_read_errors,
        } = self;

        log::debug!("[{}] start record", session_id);
        let mut failure: Option<CaptureError> = None;
        let mut writer: Option<CaptureFileWriter> = None;

        // A panicking device or sink must still reach the exit sequence below.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            if let Err(e) = device.start() {
                log::error!("[{}] failed to start capture device: {}", session_id, e);
                is_recording.store(false, Ordering::SeqCst);
                failure = Some(e);
            }

            writer = match CaptureFileWriter::create(&pcm_path, &wav_path, format) {
                Ok(writer) => Some(writer),
                Err(e) => {
                    log::error!("[{}] create file error: {}", session_id, e);
                    is_recording.store(false, Ordering::SeqCst);
                    failure.get_or_insert(e);
                    None
                }
            };

            let delivered = device.channel_count();
            if failure.is_none() && delivered != format.channels() {
                log::error!(
                    "[{}] device delivers {} channels, expected {}",
                    session_id,
                    delivered,
                    format.channels()
                );
                is_recording.store(false, Ordering::SeqCst);
                failure = Some(CaptureError::InvalidFormat(format!(
                    "device delivers {} channels, expected {}",
                    delivered,
                    format.channels()
                )));
            }

            let mut frame = vec![0u8; buffer_size];
            let mut consecutive_errors = 0u32;

            while is_recording.load(Ordering::SeqCst) {
                let read = match device.read(&mut frame) {
                    Ok(read) => {
                        consecutive_errors = 0;
                        read.min(frame.len())
                    }
                    Err(e) => {
                        consecutive_errors = consecutive_errors.saturating_add(1);
                        log::debug!("[{}] skipping frame: {}", session_id, e);
                        if max_consecutive_read_errors.is_some_and(|limit| consecutive_errors >= limit) {
                            log::error!(
                                "[{}] {} consecutive read failures, ending session",
                                session_id,
                                consecutive_errors
                            );
                            failure.get_or_insert(CaptureError::Device(e.to_string()));
                            is_recording.store(false, Ordering::SeqCst);
                            break;
                        }
                        continue;
                    }
                };
                if read == 0 {
                    continue;
                }

                let bytes = &frame[..read];
                if let Some(sink) = &sink {
                    sink.on_frame_captured(bytes);
                }
                if let Some(w) = writer.as_mut() {
                    if let Err(e) = w.append(bytes) {
                        log::error!("[{}] {}", session_id, e);
                        failure.get_or_insert(e);
                        is_recording.store(false, Ordering::SeqCst);
                        break;
                    }
                }
            }
        }));
        if let Err(payload) = outcome {
            let message = panic_message(&*payload);
            log::error!("[{}] capture loop panicked: {}", session_id, message);
            failure.get_or_insert(CaptureError::Unknown(format!("capture loop panicked: {}", message)));
        }

        let data_bytes = writer.as_ref().map(CaptureFileWriter::pcm_bytes);
        if let Some(w) = writer.take() {
            if let Err(e) = w.finish() {
                log::error!("[{}] write header error: {}", session_id, e);
                failure.get_or_insert(e);
            }
        }

        if device.is_recording() {
            if let Err(e) = device.stop() {
                log::warn!("[{}] failed to stop capture device: {}", session_id, e);
            }
        }
        device.release();
        is_recording.store(false, Ordering::SeqCst);
        log::debug!("[{}] record finish", session_id);

        let Some(sink) = sink else {
            return;
        };
        if let Some(e) = failure {
            sink.on_capture_failed(&e);
            return;
        }
        let Some(data_bytes) = data_bytes else {
            return;
        };
        let checksum = sha256_file(&wav_path).unwrap_or_else(|e| {
            log::warn!("[{}] {}", session_id, e);
            String::new()
        });
        let result = RecordingResult {
            session_id,
            created_at,
            pcm_path,
            wav_path,
            format,
            data_bytes,
            duration_secs: data_bytes as f64 / format.bytes_per_second().max(1) as f64,
            checksum,
        };
        sink.on_capture_finished(&result);
    }
}
