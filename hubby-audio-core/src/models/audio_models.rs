use serde::{Deserialize, Serialize};

use super::error::CaptureError;

/// Minimum capture sample rate accepted by `AudioRecorder::start_record`.
pub const MIN_CAPTURE_SAMPLE_RATE: u32 = 44_100;

/// Highest sample rate any engine accepts.
pub const MAX_SAMPLE_RATE: u32 = 384_000;

/// Fixed PCM format of an engine.
///
/// Samples are interleaved, little-endian, signed for 16-bit and unsigned for
/// 8-bit, as in a canonical WAV payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormatSpec {
    pub sample_rate_hz: u32,
    pub channel_count: u8,
    pub bits_per_sample: u16,
}

impl AudioFormatSpec {
    /// 44.1 kHz, stereo, 16-bit: the format supported end-to-end.
    pub const CD_STEREO: Self = Self {
        sample_rate_hz: 44_100,
        channel_count: 2,
        bits_per_sample: 16,
    };

    pub fn new(sample_rate_hz: u32, channel_count: u8, bits_per_sample: u16) -> Self {
        Self {
            sample_rate_hz,
            channel_count,
            bits_per_sample,
        }
    }

    pub fn channels(&self) -> u16 {
        self.channel_count as u16
    }

    pub fn bytes_per_sample(&self) -> u32 {
        self.bits_per_sample as u32 / 8
    }

    /// Bytes in one frame (one sample for every channel).
    pub fn bytes_per_frame(&self) -> u32 {
        self.channel_count as u32 * self.bytes_per_sample()
    }

    /// Saturates instead of overflowing on formats `validate` would reject.
    pub fn bytes_per_second(&self) -> u32 {
        self.sample_rate_hz.saturating_mul(self.bytes_per_frame())
    }

    /// Whole seconds of audio held by `byte_len` bytes of payload.
    pub fn duration_secs(&self, byte_len: u64) -> u32 {
        let bps = self.bytes_per_second() as u64;
        if bps == 0 {
            return 0;
        }
        u32::try_from(byte_len / bps).unwrap_or(u32::MAX)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate_hz == 0 {
            return Err("sample rate must be positive".into());
        }
        if self.sample_rate_hz > MAX_SAMPLE_RATE {
            return Err(format!(
                "sample rate {} Hz is above {} Hz",
                self.sample_rate_hz, MAX_SAMPLE_RATE
            ));
        }
        if ![1, 2].contains(&self.channel_count) {
            return Err(format!("unsupported channel count: {}", self.channel_count));
        }
        if ![8, 16].contains(&self.bits_per_sample) {
            return Err(format!("unsupported bits per sample: {}", self.bits_per_sample));
        }
        Ok(())
    }

    /// Capture policy on top of [`validate`](Self::validate): at least 44.1 kHz.
    pub fn validate_for_capture(&self) -> Result<(), CaptureError> {
        if self.sample_rate_hz < MIN_CAPTURE_SAMPLE_RATE {
            return Err(CaptureError::InvalidFormat(format!(
                "sample rate {} Hz is below {} Hz",
                self.sample_rate_hz, MIN_CAPTURE_SAMPLE_RATE
            )));
        }
        self.validate().map_err(CaptureError::InvalidFormat)
    }
}

impl Default for AudioFormatSpec {
    fn default() -> Self {
        Self::CD_STEREO
    }
}

/// Capabilities the capture engine asks the permission predicate about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    RecordAudio,
}

/// Everything the capture engine needs before it may open a device.
pub const CAPTURE_CAPABILITIES: &[Capability] = &[Capability::RecordAudio];
