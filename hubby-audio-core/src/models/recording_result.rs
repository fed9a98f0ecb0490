use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::audio_models::AudioFormatSpec;

/// Outcome of one finished capture session.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    pub session_id: String,
    /// When the session was started.
    pub created_at: DateTime<Utc>,
    pub pcm_path: PathBuf,
    pub wav_path: PathBuf,
    pub format: AudioFormatSpec,
    /// PCM payload bytes (the WAV data-size field).
    pub data_bytes: u64,
    pub duration_secs: f64,
    /// SHA-256 of the finalized WAV file, lowercase hex.
    pub checksum: String,
}

impl RecordingResult {
    pub fn metadata(&self) -> RecordingMetadata {
        RecordingMetadata {
            id: self.session_id.clone(),
            created_at: self.created_at.to_rfc3339(),
            sample_rate_hz: self.format.sample_rate_hz,
            channel_count: self.format.channel_count,
            bits_per_sample: self.format.bits_per_sample,
            data_bytes: self.data_bytes,
            duration_secs: self.duration_secs,
            checksum: self.checksum.clone(),
            pcm_path: self.pcm_path.to_string_lossy().into_owned(),
            wav_path: self.wav_path.to_string_lossy().into_owned(),
        }
    }
}

/// Sidecar description of a recording, serialized as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub created_at: String,
    pub sample_rate_hz: u32,
    pub channel_count: u8,
    pub bits_per_sample: u16,
    pub data_bytes: u64,
    pub duration_secs: f64,
    pub checksum: String,
    pub pcm_path: String,
    pub wav_path: String,
}
