use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::audio_models::AudioFormatSpec;
use crate::models::error::CaptureError;
use crate::processing::wav_format;

/// Streaming writer for one capture session.
///
/// Every frame is appended to two files:
///
/// ```text
/// <name>.pcm   [raw interleaved PCM...]
/// <name>.wav   [44-byte WAV header, data size 0 until finish] [raw PCM...]
/// ```
///
/// [`finish`](Self::finish) patches the WAV header with the PCM byte count.
/// Both handles are closed when the writer is dropped, so an error path that
/// never reaches `finish` still releases them.
pub struct CaptureFileWriter {
    pcm_path: PathBuf,
    wav_path: PathBuf,
    format: AudioFormatSpec,
    pcm: BufWriter<File>,
    wav: BufWriter<File>,
    pcm_bytes: u64,
}

impl CaptureFileWriter {
    /// Create (or truncate) both files and write the provisional WAV header.
    pub fn create(pcm_path: &Path, wav_path: &Path, format: AudioFormatSpec) -> Result<Self, CaptureError> {
        for path in [pcm_path, wav_path] {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .map_err(|e| CaptureError::Io(format!("failed to create directory: {}", e)))?;
            }
        }

        let mut wav = BufWriter::new(
            File::create(wav_path).map_err(|e| CaptureError::Io(format!("failed to create wav file: {}", e)))?,
        );
        let header =
            wav_format::generate_wav_header(0, format.sample_rate_hz, format.channels(), format.bits_per_sample)?;
        wav.write_all(&header)
            .map_err(|e| CaptureError::Io(format!("failed to write wav header: {}", e)))?;
        log::debug!("new wav file: {}", wav_path.display());

        let pcm = BufWriter::new(
            File::create(pcm_path).map_err(|e| CaptureError::Io(format!("failed to create pcm file: {}", e)))?,
        );
        log::debug!("new pcm file: {}", pcm_path.display());

        Ok(Self {
            pcm_path: pcm_path.to_path_buf(),
            wav_path: wav_path.to_path_buf(),
            format,
            pcm,
            wav,
            pcm_bytes: 0,
        })
    }

    /// Append one captured frame to both files.
    pub fn append(&mut self, frame: &[u8]) -> Result<(), CaptureError> {
        self.pcm
            .write_all(frame)
            .map_err(|e| CaptureError::Io(format!("pcm write failed: {}", e)))?;
        self.wav
            .write_all(frame)
            .map_err(|e| CaptureError::Io(format!("wav write failed: {}", e)))?;
        self.pcm_bytes += frame.len() as u64;
        Ok(())
    }

    /// PCM bytes appended so far.
    pub fn pcm_bytes(&self) -> u64 {
        self.pcm_bytes
    }

    pub fn pcm_path(&self) -> &Path {
        &self.pcm_path
    }

    pub fn wav_path(&self) -> &Path {
        &self.wav_path
    }

    /// Flush both files, patch the WAV header and close everything.
    ///
    /// The header is patched even when flushing the PCM file fails, so the
    /// WAV file always describes the bytes it actually holds. Returns the PCM
    /// byte count.
    pub fn finish(self) -> Result<u64, CaptureError> {
        let Self {
            mut pcm,
            wav,
            format,
            pcm_bytes,
            ..
        } = self;

        let pcm_result = pcm
            .flush()
            .map_err(|e| CaptureError::Io(format!("pcm flush failed: {}", e)));
        drop(pcm);

        let mut wav = wav
            .into_inner()
            .map_err(|e| CaptureError::Io(format!("wav flush failed: {}", e.error())))?;
        wav_format::patch_wav_header(
            &mut wav,
            pcm_bytes,
            format.sample_rate_hz,
            format.channels(),
            format.bits_per_sample,
        )?;
        wav.sync_all()
            .map_err(|e| CaptureError::Io(format!("wav sync failed: {}", e)))?;

        pcm_result.map(|_| pcm_bytes)
    }
}

/// Compute SHA-256 hex digest of a file.
pub fn sha256_file(path: &Path) -> Result<String, CaptureError> {
    let data =
        fs::read(path).map_err(|e| CaptureError::Io(format!("failed to read file for checksum: {}", e)))?;
    let digest = Sha256::digest(&data);
    Ok(hex_encode(&digest))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::wav_format::{WavHeader, WAV_HEADER_SIZE};

    #[test]
    fn writes_pcm_and_patched_wav() {
        let dir = tempfile::tempdir().unwrap();
        let pcm_path = dir.path().join("take.pcm");
        let wav_path = dir.path().join("take.wav");

        let mut writer = CaptureFileWriter::create(&pcm_path, &wav_path, AudioFormatSpec::CD_STEREO).unwrap();
        writer.append(&[1, 2, 3, 4]).unwrap();
        writer.append(&[5, 6, 7, 8, 9, 10, 11, 12]).unwrap();
        assert_eq!(writer.pcm_bytes(), 12);

        let written = writer.finish().unwrap();
        assert_eq!(written, 12);

        let pcm = fs::read(&pcm_path).unwrap();
        assert_eq!(pcm, (1..=12).collect::<Vec<u8>>());

        let wav = fs::read(&wav_path).unwrap();
        assert_eq!(wav.len(), WAV_HEADER_SIZE + 12);
        assert_eq!(&wav[WAV_HEADER_SIZE..], &pcm[..]);
        let header = WavHeader::parse(&wav).unwrap();
        assert_eq!(header.data_length, 12);
        assert_eq!(header.sample_rate, 44100);
        assert_eq!(header.channels, 2);
    }

    #[test]
    fn create_truncates_previous_take() {
        let dir = tempfile::tempdir().unwrap();
        let pcm_path = dir.path().join("take.pcm");
        let wav_path = dir.path().join("take.wav");

        let mut first = CaptureFileWriter::create(&pcm_path, &wav_path, AudioFormatSpec::CD_STEREO).unwrap();
        first.append(&[0xAA; 100]).unwrap();
        first.finish().unwrap();

        let mut second = CaptureFileWriter::create(&pcm_path, &wav_path, AudioFormatSpec::CD_STEREO).unwrap();
        second.append(&[0xBB; 8]).unwrap();
        second.finish().unwrap();

        assert_eq!(fs::read(&pcm_path).unwrap(), vec![0xBB; 8]);
        let wav = fs::read(&wav_path).unwrap();
        assert_eq!(wav.len(), WAV_HEADER_SIZE + 8);
        assert_eq!(WavHeader::parse(&wav).unwrap().data_length, 8);
    }

    #[test]
    fn creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let pcm_path = dir.path().join("nested/deeper/take.pcm");
        let wav_path = dir.path().join("nested/deeper/take.wav");

        let writer = CaptureFileWriter::create(&pcm_path, &wav_path, AudioFormatSpec::CD_STEREO).unwrap();
        assert_eq!(writer.finish().unwrap(), 0);
        assert_eq!(fs::metadata(&wav_path).unwrap().len(), WAV_HEADER_SIZE as u64);
    }

    #[test]
    fn checksum_is_hex_sha256() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty");
        fs::write(&path, b"").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
