//! Microphone capture through cpal's default input device.
//!
//! The audio callback converts whatever sample type and channel count the
//! device delivers into the requested PCM layout and hands whole frames to the
//! capture thread over a bounded channel. `read` drains that channel with a timeout so a stalled
//! device surfaces as a skipped frame instead of a hung worker.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;

use hubby_audio_core::{AudioFormatSpec, CaptureDevice, CaptureDeviceFactory, CaptureError, DeviceReadError};

use crate::pcm;
use crate::stream_config;
use crate::stream_holder::StreamHolder;

/// Default upper bound on a single blocking `read`.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Frames per minimum read, in milliseconds of audio.
const MIN_BUFFER_MILLIS: u32 = 20;

/// Callback chunks buffered between the audio thread and the capture thread.
const CHANNEL_DEPTH: usize = 64;

/// Opens the host's default input device.
#[derive(Debug, Clone)]
pub struct CpalCaptureFactory {
    read_timeout: Duration,
}

impl CpalCaptureFactory {
    pub fn new() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

impl Default for CpalCaptureFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureDeviceFactory for CpalCaptureFactory {
    fn min_buffer_size(&self, format: &AudioFormatSpec) -> Result<usize, CaptureError> {
        format.validate().map_err(CaptureError::InvalidFormat)?;
        let frames = (u64::from(format.sample_rate_hz) * u64::from(MIN_BUFFER_MILLIS) / 1000).max(1);
        usize::try_from(frames * u64::from(format.bytes_per_frame()))
            .map_err(|_| CaptureError::InvalidFormat(format!("{} Hz needs too large a buffer", format.sample_rate_hz)))
    }

    fn open(&self, format: &AudioFormatSpec, buffer_size: usize) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| CaptureError::DeviceNotAvailable("no default input device".into()))?;
        let ranges = device
            .supported_input_configs()
            .map_err(|e| CaptureError::DeviceNotAvailable(format!("failed to query input configs: {}", e)))?;
        let supported = stream_config::select_config(ranges, format).ok_or_else(|| {
            CaptureError::InvalidFormat(format!(
                "default input device cannot capture at {} Hz",
                format.sample_rate_hz
            ))
        })?;

        log::debug!(
            "opened input {:?}: {} ch, {:?}, {} Hz, {} byte frames",
            device.name().unwrap_or_default(),
            supported.channels(),
            supported.sample_format(),
            format.sample_rate_hz,
            buffer_size
        );

        Ok(Box::new(CpalCaptureDevice {
            device,
            sample_format: supported.sample_format(),
            config: supported.into(),
            channels: format.channels(),
            bits_per_sample: format.bits_per_sample,
            read_timeout: self.read_timeout,
            stream: None,
            frames: None,
            pending: Vec::new(),
            stream_error: Arc::new(Mutex::new(None)),
            recording: false,
        }))
    }
}

/// One capture session's handle on the default input device.
pub struct CpalCaptureDevice {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: SampleFormat,
    /// Channels written to `read`'s buffer; the device may deliver others.
    channels: u16,
    bits_per_sample: u16,
    read_timeout: Duration,
    stream: Option<StreamHolder>,
    frames: Option<Receiver<Vec<u8>>>,
    pending: Vec<u8>,
    stream_error: Arc<Mutex<Option<String>>>,
    recording: bool,
}

impl CaptureDevice for CpalCaptureDevice {
    fn start(&mut self) -> Result<(), CaptureError> {
        let (tx, rx) = crossbeam_channel::bounded(CHANNEL_DEPTH);
        let sink = CallbackSink {
            tx,
            device_channels: self.config.channels,
            channels: self.channels,
            bits_per_sample: self.bits_per_sample,
            stream_error: Arc::clone(&self.stream_error),
            dropped: Arc::new(AtomicUsize::new(0)),
        };

        let stream = match self.sample_format {
            SampleFormat::I16 => build_capture_stream::<i16>(&self.device, &self.config, sink),
            SampleFormat::U16 => build_capture_stream::<u16>(&self.device, &self.config, sink),
            SampleFormat::I32 => build_capture_stream::<i32>(&self.device, &self.config, sink),
            SampleFormat::U8 => build_capture_stream::<u8>(&self.device, &self.config, sink),
            SampleFormat::F32 => build_capture_stream::<f32>(&self.device, &self.config, sink),
            fmt => Err(CaptureError::InvalidFormat(format!("unsupported sample format: {:?}", fmt))),
        }?;

        stream
            .play()
            .map_err(|e| CaptureError::Device(format!("failed to start input stream: {}", e)))?;

        self.stream = Some(StreamHolder::new(stream));
        self.frames = Some(rx);
        self.recording = true;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, DeviceReadError> {
        let Some(frames) = &self.frames else {
            return Err(DeviceReadError::InvalidOperation);
        };
        if let Some(message) = self.stream_error.lock().take() {
            return Err(DeviceReadError::Error(message));
        }

        let mut filled = 0;
        while filled < buf.len() {
            if self.pending.is_empty() {
                match frames.recv_timeout(self.read_timeout) {
                    Ok(chunk) => self.pending = chunk,
                    Err(RecvTimeoutError::Timeout) if filled > 0 => break,
                    Err(RecvTimeoutError::Timeout) => return Err(DeviceReadError::Timeout),
                    Err(RecvTimeoutError::Disconnected) => return Err(DeviceReadError::DeadObject),
                }
            }
            let n = (buf.len() - filled).min(self.pending.len());
            buf[filled..filled + n].copy_from_slice(&self.pending[..n]);
            self.pending.drain(..n);
            filled += n;
        }
        Ok(filled)
    }

    fn is_recording(&self) -> bool {
        self.recording
    }

    fn channel_count(&self) -> u16 {
        self.channels
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        self.recording = false;
        if let Some(holder) = &self.stream {
            holder
                .stream
                .pause()
                .map_err(|e| CaptureError::Device(format!("failed to pause input stream: {}", e)))?;
        }
        Ok(())
    }

    fn release(self: Box<Self>) {
        log::debug!("releasing input device");
    }
}

/// State moved into the audio callback.
struct CallbackSink {
    tx: Sender<Vec<u8>>,
    device_channels: u16,
    channels: u16,
    bits_per_sample: u16,
    stream_error: Arc<Mutex<Option<String>>>,
    dropped: Arc<AtomicUsize>,
}

impl CallbackSink {
    fn encode(&self, samples: &[f32]) -> Vec<u8> {
        let samples = pcm::remap_channels(samples, self.device_channels, self.channels);
        let mut chunk = Vec::with_capacity(samples.len() * 2);
        pcm::encode_samples(samples, self.bits_per_sample, &mut chunk);
        chunk
    }

    fn push(&self, chunk: Vec<u8>) {
        match self.tx.try_send(chunk) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(_)) => {
                // Capture thread fell behind; report the first drop and every 100th after.
                let count = self.dropped.fetch_add(1, Ordering::Relaxed);
                if count % 100 == 0 {
                    log::warn!("input overrun, {} callback chunks dropped", count + 1);
                }
            }
        }
    }
}

fn build_capture_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sink: CallbackSink,
) -> Result<cpal::Stream, CaptureError>
where
    T: cpal::SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    let stream_error = Arc::clone(&sink.stream_error);
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let samples: Vec<f32> = data.iter().map(|s| f32::from_sample(*s)).collect();
                let chunk = sink.encode(&samples);
                sink.push(chunk);
            },
            move |err| {
                log::error!("input stream error: {}", err);
                *stream_error.lock() = Some(err.to_string());
            },
            None,
        )
        .map_err(|e| CaptureError::Device(format!("failed to build input stream: {}", e)))
}
