use std::path::{Path, PathBuf};

use super::audio_models::AudioFormatSpec;

/// File name of the PCM scratch file when no path is configured.
pub const DEFAULT_TEMP_FILE_NAME: &str = "hubby_temp.pcm";

/// Configuration for an [`AudioRecorder`](crate::AudioRecorder).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderConfig {
    /// Capture format (default: 44.1 kHz stereo 16-bit).
    pub format: AudioFormatSpec,

    /// PCM scratch file. `None` resolves to `<cache dir>/hubby_temp.pcm`.
    pub temp_file: Option<PathBuf>,

    /// End the session after this many consecutive failed device reads.
    /// `None` keeps polling for as long as the session is running.
    pub max_consecutive_read_errors: Option<u32>,
}

impl RecorderConfig {
    pub fn with_temp_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.temp_file = Some(path.into());
        self
    }

    /// The PCM scratch path this configuration resolves to.
    pub fn resolve_temp_file(&self) -> PathBuf {
        match &self.temp_file {
            Some(path) if !path.as_os_str().is_empty() => path.clone(),
            _ => default_temp_file(),
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            format: AudioFormatSpec::CD_STEREO,
            temp_file: None,
            max_consecutive_read_errors: None,
        }
    }
}

/// `<cache dir>/hubby_temp.pcm`, falling back to the system temp directory.
pub fn default_temp_file() -> PathBuf {
    dirs_next::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(DEFAULT_TEMP_FILE_NAME)
}

/// The WAV file written next to a PCM scratch file (`foo.pcm` -> `foo.wav`).
pub fn wav_path_for(pcm_path: &Path) -> PathBuf {
    pcm_path.with_extension("wav")
}
