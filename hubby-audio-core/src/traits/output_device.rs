use std::sync::Arc;

use crate::models::audio_models::AudioFormatSpec;
use crate::models::error::PlaybackError;

/// Periodic position report from an output device.
///
/// Parameters:
/// - `head_frames`: frames rendered since [`OutputDevice::play`].
/// - `playback_rate`: the device's frame rate in Hz.
///
/// Invoked on the device driver's own notification thread.
pub type PositionCallback = Box<dyn FnMut(u64, u32) + Send + 'static>;

/// Stops an output device from any thread.
///
/// Pending and future [`OutputDevice::write`] calls return promptly once
/// the handle has been triggered.
pub type DeviceInterrupt = Arc<dyn Fn() + Send + Sync + 'static>;

/// An opened output stream.
///
/// Like [`CaptureDevice`](super::capture_device::CaptureDevice), a handle is
/// created per playback session and consumed by [`release`](Self::release).
pub trait OutputDevice: Send {
    /// Register a callback fired every `period_frames` rendered frames.
    /// Must be called before [`play`](Self::play).
    fn set_position_callback(&mut self, period_frames: u32, callback: PositionCallback);

    /// A handle the controller thread can use to stop the device immediately.
    fn interrupt_handle(&self) -> DeviceInterrupt;

    /// Start rendering.
    fn play(&mut self) -> Result<(), PlaybackError>;

    /// Queue PCM bytes, blocking while the device buffer is full.
    /// Returns the number of bytes accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize, PlaybackError>;

    /// Frames rendered since `play`.
    fn playback_head_position(&self) -> u64;

    fn playback_rate(&self) -> u32;

    /// Stop rendering. Idempotent.
    fn stop(&mut self);

    fn release(self: Box<Self>);
}

/// Creates output handles for a platform audio API.
pub trait OutputDeviceFactory: Send + Sync {
    /// Smallest write size, in bytes, the device accepts for `format`.
    fn min_buffer_size(&self, format: &AudioFormatSpec) -> Result<usize, PlaybackError>;

    /// Open a new output handle. Called once per playback start.
    fn open(&self, format: &AudioFormatSpec, buffer_size: usize) -> Result<Box<dyn OutputDevice>, PlaybackError>;
}
