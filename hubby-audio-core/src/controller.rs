use std::path::Path;
use std::sync::Arc;

use crate::models::config::RecorderConfig;
use crate::models::error::{CaptureError, PlaybackError};
use crate::session::recorder::AudioRecorder;
use crate::session::tracker::AudioTracker;
use crate::traits::capture_device::CaptureDeviceFactory;
use crate::traits::dispatch::DispatchContext;
use crate::traits::output_device::OutputDeviceFactory;
use crate::traits::permission::PermissionChecker;
use crate::traits::sinks::{FrameSink, ProgressSink};

/// Single entry point for a front-end.
///
/// Owns one [`AudioRecorder`] and one [`AudioTracker`] for its whole lifetime.
/// Capture and playback are independent and may run at the same time.
pub struct AudioController {
    recorder: AudioRecorder,
    tracker: AudioTracker,
}

impl AudioController {
    pub fn new(
        config: RecorderConfig,
        capture_devices: Arc<dyn CaptureDeviceFactory>,
        output_devices: Arc<dyn OutputDeviceFactory>,
        permissions: Arc<dyn PermissionChecker>,
    ) -> Self {
        let tracker = AudioTracker::new(config.format, output_devices);
        let recorder = AudioRecorder::new(config, capture_devices, permissions);
        Self { recorder, tracker }
    }

    pub fn with_frame_sink(mut self, sink: Arc<dyn FrameSink>) -> Self {
        self.recorder = self.recorder.with_frame_sink(sink);
        self
    }

    pub fn recorder(&self) -> &AudioRecorder {
        &self.recorder
    }

    pub fn tracker(&self) -> &AudioTracker {
        &self.tracker
    }

    pub fn start_record(&self) -> Result<(), CaptureError> {
        self.recorder.start_record()
    }

    pub fn stop_record(&self) {
        self.recorder.stop_record()
    }

    pub fn temp_file_path(&self) -> &Path {
        self.recorder.temp_file_path()
    }

    pub fn wav_file_path(&self) -> &Path {
        self.recorder.wav_file_path()
    }

    pub fn start_play(
        &self,
        path: &Path,
        sink: Option<Arc<dyn ProgressSink>>,
        dispatch: Option<Arc<dyn DispatchContext>>,
    ) -> Result<(), PlaybackError> {
        self.tracker.start_play(path, sink, dispatch)
    }

    /// Play back the capture scratch file.
    pub fn play_recording(
        &self,
        sink: Option<Arc<dyn ProgressSink>>,
        dispatch: Option<Arc<dyn DispatchContext>>,
    ) -> Result<(), PlaybackError> {
        self.tracker.start_play(self.recorder.temp_file_path(), sink, dispatch)
    }

    pub fn stop_play(&self) {
        self.tracker.stop()
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    pub fn is_playing(&self) -> bool {
        self.tracker.is_playing()
    }

    /// Stop both engines and wait for their workers to release the devices.
    pub fn shutdown(&self) {
        self.recorder.stop_record();
        self.tracker.stop();
        self.recorder.join_worker();
        self.tracker.join_worker();
    }
}
