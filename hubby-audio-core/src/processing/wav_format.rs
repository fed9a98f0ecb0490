//! WAV file format utilities.
//!
//! Generates the canonical 44-byte RIFF WAV header and rewrites it in place
//! once the final payload length of a recording is known.

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use crate::models::error::CaptureError;

/// Size of the standard WAV RIFF header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

/// The fields a canonical PCM WAV header is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub data_length: u32,
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl WavHeader {
    pub fn to_bytes(&self) -> Result<[u8; WAV_HEADER_SIZE], CaptureError> {
        generate_wav_header(self.data_length, self.sample_rate, self.channels, self.bits_per_sample)
    }

    /// Parse a canonical 44-byte PCM header.
    ///
    /// Only the layout produced by [`generate_wav_header`] is accepted: no
    /// extra chunks between `fmt ` and `data`.
    pub fn parse(bytes: &[u8]) -> Result<Self, CaptureError> {
        if bytes.len() < WAV_HEADER_SIZE {
            return Err(CaptureError::InvalidFormat(format!(
                "header needs {} bytes, got {}",
                WAV_HEADER_SIZE,
                bytes.len()
            )));
        }
        if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
            return Err(CaptureError::InvalidFormat("missing RIFF/WAVE magic".into()));
        }
        if &bytes[12..16] != b"fmt " || &bytes[36..40] != b"data" {
            return Err(CaptureError::InvalidFormat("not a canonical PCM header".into()));
        }
        if read_u16(bytes, 20) != 1 {
            return Err(CaptureError::InvalidFormat("format tag is not PCM".into()));
        }
        Ok(Self {
            data_length: read_u32(bytes, 40),
            sample_rate: read_u32(bytes, 24),
            channels: read_u16(bytes, 22),
            bits_per_sample: read_u16(bytes, 34),
        })
    }
}

/// Generate a 44-byte WAV RIFF header.
///
/// Format: PCM (format code 1), little-endian.
///
/// Layout:
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    36 + data_length
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  16 (PCM format chunk size)
/// [20-21]  1 (PCM format code)
/// [22-23]  channels
/// [24-27]  sample_rate
/// [28-31]  byte_rate = sample_rate * channels * bits_per_sample / 8
/// [32-33]  block_align = channels * bits_per_sample / 8
/// [34-35]  bits_per_sample
/// [36-39]  "data"
/// [40-43]  data_length
/// ```
pub fn generate_wav_header(
    data_length: u32,
    sample_rate: u32,
    channels: u16,
    bits_per_sample: u16,
) -> Result<[u8; WAV_HEADER_SIZE], CaptureError> {
    if sample_rate == 0 {
        return Err(CaptureError::InvalidFormat("sample rate must be positive".into()));
    }
    if channels == 0 {
        return Err(CaptureError::InvalidFormat("channel count must be positive".into()));
    }
    if ![8, 16].contains(&bits_per_sample) {
        return Err(CaptureError::InvalidFormat(format!(
            "unsupported bits per sample: {}",
            bits_per_sample
        )));
    }

    let bytes_per_sample = (bits_per_sample / 8) as u32;
    let byte_rate = sample_rate
        .checked_mul(channels as u32 * bytes_per_sample)
        .ok_or_else(|| CaptureError::InvalidFormat(format!("sample rate {} Hz overflows the byte rate", sample_rate)))?;
    let block_align = channels
        .checked_mul(bits_per_sample / 8)
        .ok_or_else(|| CaptureError::InvalidFormat(format!("{} channels overflow the block align", channels)))?;
    let chunk_size = data_length.saturating_add(36);

    let mut header = [0u8; WAV_HEADER_SIZE];

    // RIFF chunk descriptor
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&chunk_size.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    // fmt sub-chunk
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes());
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&bits_per_sample.to_le_bytes());

    // data sub-chunk
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_length.to_le_bytes());

    Ok(header)
}

/// Rewrite bytes `[0, 44)` of an already written WAV stream.
///
/// The payload after the header is left untouched and the stream is left
/// positioned at its end so further appends keep working.
pub fn patch_wav_header<F: Write + Seek>(
    file: &mut F,
    data_length: u64,
    sample_rate: u32,
    channels: u16,
    bits_per_sample: u16,
) -> Result<(), CaptureError> {
    let data_length = clamp_data_length(data_length);
    let header = generate_wav_header(data_length, sample_rate, channels, bits_per_sample)?;

    file.seek(SeekFrom::Start(0))
        .map_err(|e| CaptureError::Io(format!("seek to header failed: {}", e)))?;
    file.write_all(&header)
        .map_err(|e| CaptureError::Io(format!("header write failed: {}", e)))?;
    file.flush()
        .map_err(|e| CaptureError::Io(format!("header flush failed: {}", e)))?;
    file.seek(SeekFrom::End(0))
        .map_err(|e| CaptureError::Io(format!("seek to end failed: {}", e)))?;
    Ok(())
}

/// [`patch_wav_header`] for a file on disk. Opens without truncation.
pub fn patch_wav_file(
    path: &Path,
    data_length: u64,
    sample_rate: u32,
    channels: u16,
    bits_per_sample: u16,
) -> Result<(), CaptureError> {
    let mut file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| CaptureError::Io(format!("failed to open {}: {}", path.display(), e)))?;
    patch_wav_header(&mut file, data_length, sample_rate, channels, bits_per_sample)
}

/// The data-size field is 32 bits wide; longer recordings saturate.
fn clamp_data_length(data_length: u64) -> u32 {
    u32::try_from(data_length).unwrap_or_else(|_| {
        log::warn!("wav payload of {} bytes exceeds the 32-bit size field", data_length);
        u32::MAX
    })
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}
