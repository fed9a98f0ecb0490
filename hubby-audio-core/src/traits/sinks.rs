use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingResult;

/// Receives captured audio.
///
/// All methods are called from the capture thread, not the caller's thread.
/// Implementations must not block; marshal to another thread if needed.
pub trait FrameSink: Send + Sync {
    /// One frame of raw interleaved PCM, exactly as read from the device.
    fn on_frame_captured(&self, frame: &[u8]);

    /// Called after the files are finalized and the device is released,
    /// for sessions that ended without a failure.
    fn on_capture_finished(&self, _result: &RecordingResult) {}

    /// Called instead of `on_capture_finished` when a device, I/O or format
    /// failure (or a panic on the capture thread) ended the session. The
    /// files are still finalized and the device released first.
    fn on_capture_failed(&self, _error: &CaptureError) {}
}

/// Receives playback progress, always on the caller's dispatch context.
pub trait ProgressSink: Send + Sync {
    /// Total playable length, sent once before streaming begins.
    fn on_init(&self, total_secs: u32);

    /// Elapsed playback time. A final `0` marks the end of the session.
    fn on_play_time(&self, current_secs: u32);
}
