use crate::models::audio_models::AudioFormatSpec;
use crate::models::error::{CaptureError, DeviceReadError};

/// An opened microphone stream.
///
/// A handle is created fresh for every capture session, used only on the
/// capture thread, and consumed by [`release`](Self::release). Implementations
/// deliver interleaved little-endian PCM in the format they were opened with.
pub trait CaptureDevice: Send {
    /// Begin delivering frames.
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Read up to `buf.len()` bytes, blocking until data is available.
    ///
    /// Errors are per-read: the caller skips the frame and may read again.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, DeviceReadError>;

    /// Whether the stream is currently in its recording state.
    fn is_recording(&self) -> bool;

    /// Channel count of the PCM handed to `read`. A count that differs from
    /// the opened format ends the session with `InvalidFormat`.
    fn channel_count(&self) -> u16;

    /// Stop delivering frames. Only called while [`is_recording`](Self::is_recording).
    fn stop(&mut self) -> Result<(), CaptureError>;

    /// Release every OS resource held by the handle.
    fn release(self: Box<Self>);
}

/// Creates capture handles for a platform audio API.
pub trait CaptureDeviceFactory: Send + Sync {
    /// Smallest frame size, in bytes, the device accepts for `format`.
    fn min_buffer_size(&self, format: &AudioFormatSpec) -> Result<usize, CaptureError>;

    /// Open a new capture handle. Called once per session start.
    fn open(&self, format: &AudioFormatSpec, buffer_size: usize) -> Result<Box<dyn CaptureDevice>, CaptureError>;
}
