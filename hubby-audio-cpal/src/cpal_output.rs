//! Playback through cpal's default output device.
//!
//! `write` decodes PCM bytes into float samples and pushes them onto a
//! bounded queue, blocking while it is full. The output callback drains the
//! queue, counts rendered frames and fires the position callback from the
//! audio thread. An interrupt makes both sides give up immediately.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat};
use crossbeam_channel::{Receiver, SendTimeoutError, Sender};

use hubby_audio_core::{AudioFormatSpec, DeviceInterrupt, OutputDevice, OutputDeviceFactory, PlaybackError, PositionCallback};

use crate::pcm;
use crate::stream_config;
use crate::stream_holder::StreamHolder;

/// Milliseconds of audio per minimum write.
const MIN_BUFFER_MILLIS: u32 = 50;

/// Chunks queued ahead of the output callback.
const QUEUE_DEPTH: usize = 8;

/// How often a blocked `write` re-checks the interrupt flag.
const WRITE_POLL: Duration = Duration::from_millis(20);

/// Longest `stop` waits for queued audio to play out.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Opens the host's default output device.
#[derive(Debug, Clone, Default)]
pub struct CpalOutputFactory;

impl CpalOutputFactory {
    pub fn new() -> Self {
        Self
    }
}

impl OutputDeviceFactory for CpalOutputFactory {
    fn min_buffer_size(&self, format: &AudioFormatSpec) -> Result<usize, PlaybackError> {
        format.validate().map_err(PlaybackError::InvalidArgument)?;
        let frames = (u64::from(format.sample_rate_hz) * u64::from(MIN_BUFFER_MILLIS) / 1000).max(1);
        usize::try_from(frames * u64::from(format.bytes_per_frame()))
            .map_err(|_| PlaybackError::InvalidArgument(format!("{} Hz needs too large a buffer", format.sample_rate_hz)))
    }

    fn open(&self, format: &AudioFormatSpec, buffer_size: usize) -> Result<Box<dyn OutputDevice>, PlaybackError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlaybackError::DeviceNotAvailable("no default output device".into()))?;
        let ranges = device
            .supported_output_configs()
            .map_err(|e| PlaybackError::DeviceNotAvailable(format!("failed to query output configs: {}", e)))?;
        let supported = stream_config::select_config(ranges, format).ok_or_else(|| {
            PlaybackError::DeviceNotAvailable(format!(
                "default output device cannot play {} Hz",
                format.sample_rate_hz
            ))
        })?;

        log::debug!(
            "opened output {:?}: {} ch, {:?}, {} Hz, {} byte writes",
            device.name().unwrap_or_default(),
            supported.channels(),
            supported.sample_format(),
            format.sample_rate_hz,
            buffer_size
        );

        let (tx, rx) = crossbeam_channel::bounded(QUEUE_DEPTH);
        Ok(Box::new(CpalOutputDevice {
            device,
            sample_format: supported.sample_format(),
            config: supported.into(),
            format: *format,
            queue: tx,
            pending_queue: Some(rx),
            head_frames: Arc::new(AtomicU64::new(0)),
            interrupted: Arc::new(AtomicBool::new(false)),
            position: None,
            carry: Vec::new(),
            stream: None,
        }))
    }
}

/// One playback session's handle on the default output device.
pub struct CpalOutputDevice {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: SampleFormat,
    format: AudioFormatSpec,
    queue: Sender<Vec<f32>>,
    pending_queue: Option<Receiver<Vec<f32>>>,
    head_frames: Arc<AtomicU64>,
    interrupted: Arc<AtomicBool>,
    position: Option<(u32, PositionCallback)>,
    /// Bytes of a sample split across two writes.
    carry: Vec<u8>,
    stream: Option<StreamHolder>,
}

impl OutputDevice for CpalOutputDevice {
    fn set_position_callback(&mut self, period_frames: u32, callback: PositionCallback) {
        self.position = Some((period_frames.max(1), callback));
    }

    fn interrupt_handle(&self) -> DeviceInterrupt {
        let interrupted = Arc::clone(&self.interrupted);
        Arc::new(move || interrupted.store(true, Ordering::SeqCst))
    }

    fn play(&mut self) -> Result<(), PlaybackError> {
        let Some(queue) = self.pending_queue.take() else {
            return Err(PlaybackError::Device("output stream already started".into()));
        };
        let render = RenderState {
            queue,
            current: Vec::new(),
            offset: 0,
            channels: self.config.channels.max(1) as u64,
            rate: self.config.sample_rate.0,
            head_frames: Arc::clone(&self.head_frames),
            interrupted: Arc::clone(&self.interrupted),
            next_report: self.position.as_ref().map_or(u64::MAX, |(period, _)| u64::from(*period)),
            position: self.position.take(),
        };

        let stream = match self.sample_format {
            SampleFormat::I16 => build_render_stream::<i16>(&self.device, &self.config, render),
            SampleFormat::U16 => build_render_stream::<u16>(&self.device, &self.config, render),
            SampleFormat::I32 => build_render_stream::<i32>(&self.device, &self.config, render),
            SampleFormat::U8 => build_render_stream::<u8>(&self.device, &self.config, render),
            SampleFormat::F32 => build_render_stream::<f32>(&self.device, &self.config, render),
            fmt => Err(PlaybackError::Device(format!("unsupported sample format: {:?}", fmt))),
        }?;
        stream
            .play()
            .map_err(|e| PlaybackError::Device(format!("failed to start output stream: {}", e)))?;
        self.stream = Some(StreamHolder::new(stream));
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, PlaybackError> {
        if self.interrupted.load(Ordering::SeqCst) {
            return Ok(0);
        }

        let sample_bytes = self.format.bytes_per_sample().max(1) as usize;
        self.carry.extend_from_slice(data);
        let whole = self.carry.len() - self.carry.len() % sample_bytes;
        let samples = pcm::decode_samples(&self.carry[..whole], self.format.bits_per_sample);
        self.carry.drain(..whole);

        let mut chunk = pcm::remap_channels(&samples, self.format.channels(), self.config.channels);
        if chunk.is_empty() {
            return Ok(data.len());
        }
        loop {
            if self.interrupted.load(Ordering::SeqCst) {
                return Ok(0);
            }
            match self.queue.send_timeout(chunk, WRITE_POLL) {
                Ok(()) => return Ok(data.len()),
                Err(SendTimeoutError::Timeout(back)) => chunk = back,
                Err(SendTimeoutError::Disconnected(_)) => {
                    return Err(PlaybackError::Device("output stream closed".into()));
                }
            }
        }
    }

    fn playback_head_position(&self) -> u64 {
        self.head_frames.load(Ordering::SeqCst)
    }

    fn playback_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    fn stop(&mut self) {
        // Queued audio plays out unless the session was interrupted.
        let deadline = Instant::now() + DRAIN_TIMEOUT;
        while self.stream.is_some()
            && !self.interrupted.load(Ordering::SeqCst)
            && !self.queue.is_empty()
            && Instant::now() < deadline
        {
            thread::sleep(Duration::from_millis(5));
        }
        self.interrupted.store(true, Ordering::SeqCst);
        if let Some(holder) = &self.stream {
            if let Err(e) = holder.stream.pause() {
                log::warn!("failed to pause output stream: {}", e);
            }
        }
    }

    fn release(self: Box<Self>) {
        log::debug!("releasing output device");
    }
}

/// State moved into the output callback.
struct RenderState {
    queue: Receiver<Vec<f32>>,
    current: Vec<f32>,
    offset: usize,
    channels: u64,
    rate: u32,
    head_frames: Arc<AtomicU64>,
    interrupted: Arc<AtomicBool>,
    position: Option<(u32, PositionCallback)>,
    next_report: u64,
}

impl RenderState {
    fn next_sample(&mut self) -> Option<f32> {
        if self.interrupted.load(Ordering::Relaxed) {
            return None;
        }
        while self.offset >= self.current.len() {
            self.current = self.queue.try_recv().ok()?;
            self.offset = 0;
        }
        let sample = self.current[self.offset];
        self.offset += 1;
        Some(sample)
    }

    /// Account for `rendered` samples and report position on period boundaries.
    fn advance(&mut self, rendered: u64) {
        if rendered == 0 {
            return;
        }
        let head = self.head_frames.fetch_add(rendered / self.channels, Ordering::SeqCst) + rendered / self.channels;
        if head < self.next_report {
            return;
        }
        if let Some((period, callback)) = self.position.as_mut() {
            let period = u64::from(*period);
            callback(head, self.rate);
            self.next_report = (head / period + 1) * period;
        }
    }
}

fn build_render_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut render: RenderState,
) -> Result<cpal::Stream, PlaybackError>
where
    T: cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let mut rendered = 0u64;
                for out in data.iter_mut() {
                    *out = match render.next_sample() {
                        Some(s) => {
                            rendered += 1;
                            T::from_sample(s)
                        }
                        None => T::EQUILIBRIUM,
                    };
                }
                render.advance(rendered);
            },
            |err| log::error!("output stream error: {}", err),
            None,
        )
        .map_err(|e| PlaybackError::Device(format!("failed to build output stream: {}", e)))
}
