//! # hubby-audio-core
//!
//! Platform-agnostic microphone capture and file playback engines.
//!
//! Provides the capture loop with PCM/WAV persistence, the playback loop with
//! dispatched progress reporting, WAV header synthesis, and the controller
//! facade. Platform backends implement the device traits and plug into the
//! engines unchanged.
//!
//! ## Architecture
//!
//! ```text
//! hubby-audio-core (this crate)
//! ├── traits/       ← CaptureDevice, OutputDevice, FrameSink, ProgressSink, DispatchContext
//! ├── models/       ← CaptureError, PlaybackError, AudioFormatSpec, RecorderConfig, etc.
//! ├── processing/   ← WAV header generation and patching
//! ├── session/      ← AudioRecorder (capture loop), AudioTracker (playback loop)
//! ├── storage/      ← CaptureFileWriter, metadata sidecar
//! └── controller    ← AudioController (one recorder + one tracker)
//! ```

pub mod controller;
pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types at crate root for convenience.
pub use controller::AudioController;
pub use models::audio_models::{AudioFormatSpec, Capability};
pub use models::config::RecorderConfig;
pub use models::error::{CaptureError, DeviceReadError, PlaybackError};
pub use models::recording_result::{RecordingMetadata, RecordingResult};
pub use models::state::EngineState;
pub use processing::wav_format::WavHeader;
pub use session::recorder::AudioRecorder;
pub use session::tracker::AudioTracker;
pub use storage::capture_writer::CaptureFileWriter;
pub use traits::capture_device::{CaptureDevice, CaptureDeviceFactory};
pub use traits::dispatch::{dispatch_queue, DispatchContext, DispatchQueue, QueueDispatcher, Task};
pub use traits::output_device::{DeviceInterrupt, OutputDevice, OutputDeviceFactory, PositionCallback};
pub use traits::permission::{AlwaysGranted, PermissionChecker};
pub use traits::sinks::{FrameSink, ProgressSink};
