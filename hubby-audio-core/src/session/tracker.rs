use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::models::audio_models::AudioFormatSpec;
use crate::models::error::PlaybackError;
use crate::models::state::EngineState;
use crate::processing::wav_format::{WavHeader, WAV_HEADER_SIZE};
use crate::session::panic_message;
use crate::traits::dispatch::DispatchContext;
use crate::traits::output_device::{DeviceInterrupt, OutputDevice, OutputDeviceFactory};
use crate::traits::sinks::ProgressSink;

struct PlaybackSession {
    min_buffer_size: usize,
    worker: Option<thread::JoinHandle<()>>,
}

impl PlaybackSession {
    fn worker_alive(&self) -> bool {
        self.worker.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Joins the worker; `false` if it panicked.
    fn join_worker(&mut self) -> bool {
        match self.worker.take().map(thread::JoinHandle::join) {
            Some(Err(_)) => {
                log::error!("playback worker panicked");
                false
            }
            _ => true,
        }
    }
}

/// Byte range of a file that holds playable PCM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PlaybackSource {
    offset: u64,
    payload_bytes: u64,
}

impl PlaybackSource {
    /// Skip a leading canonical WAV header if there is one.
    fn probe(path: &Path) -> Result<Self, PlaybackError> {
        let mut file = File::open(path).map_err(|e| PlaybackError::Io(format!("failed to open {}: {}", path.display(), e)))?;
        let len = file
            .metadata()
            .map_err(|e| PlaybackError::Io(format!("failed to stat {}: {}", path.display(), e)))?
            .len();

        let mut head = [0u8; WAV_HEADER_SIZE];
        let has_header = len >= WAV_HEADER_SIZE as u64
            && file.read_exact(&mut head).is_ok()
            && WavHeader::parse(&head).is_ok();

        let offset = if has_header { WAV_HEADER_SIZE as u64 } else { 0 };
        Ok(Self {
            offset,
            payload_bytes: len - offset,
        })
    }
}

/// A progress sink bound to the context its callbacks must run on.
#[derive(Clone)]
struct ProgressDispatch {
    sink: Arc<dyn ProgressSink>,
    dispatch: Arc<dyn DispatchContext>,
}

impl ProgressDispatch {
    fn init(&self, total_secs: u32) {
        let sink = Arc::clone(&self.sink);
        self.dispatch.post(Box::new(move || sink.on_init(total_secs)));
    }

    fn play_time(&self, current_secs: u32) {
        let sink = Arc::clone(&self.sink);
        self.dispatch.post(Box::new(move || sink.on_play_time(current_secs)));
    }
}

/// Streams a PCM or WAV file to an [`OutputDevice`] on a background thread.
///
/// Progress is never delivered on the worker or the device's callback thread;
/// every notification is posted to the [`DispatchContext`] bound at start.
pub struct AudioTracker {
    format: AudioFormatSpec,
    devices: Arc<dyn OutputDeviceFactory>,
    is_playing: Arc<AtomicBool>,
    interrupt: Arc<Mutex<Option<DeviceInterrupt>>>,
    session: Mutex<Option<PlaybackSession>>,
}

impl AudioTracker {
    pub fn new(format: AudioFormatSpec, devices: Arc<dyn OutputDeviceFactory>) -> Self {
        Self {
            format,
            devices,
            is_playing: Arc::new(AtomicBool::new(false)),
            interrupt: Arc::new(Mutex::new(None)),
            session: Mutex::new(None),
        }
    }

    pub fn format(&self) -> &AudioFormatSpec {
        &self.format
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.session.lock().as_ref().is_some_and(PlaybackSession::worker_alive)
    }

    pub fn state(&self) -> EngineState {
        EngineState::from_flags(self.is_playing(), self.is_running())
    }

    /// Play `path` on a new worker thread.
    ///
    /// A `sink` needs a `dispatch` context to deliver to. Returns `Ok(())`
    /// without doing anything if playback is already running.
    pub fn start_play(
        &self,
        path: &Path,
        sink: Option<Arc<dyn ProgressSink>>,
        dispatch: Option<Arc<dyn DispatchContext>>,
    ) -> Result<(), PlaybackError> {
        if !path.is_file() {
            return Err(PlaybackError::FileNotFound(path.to_path_buf()));
        }
        let progress = match (sink, dispatch) {
            (Some(sink), Some(dispatch)) => Some(ProgressDispatch { sink, dispatch }),
            (Some(_), None) => {
                return Err(PlaybackError::InvalidArgument(
                    "a progress sink requires a dispatch context".into(),
                ))
            }
            (None, _) => None,
        };
        self.format.validate().map_err(PlaybackError::InvalidArgument)?;

        let mut guard = self.session.lock();
        let session = match guard.take() {
            Some(session) => session,
            None => PlaybackSession {
                min_buffer_size: self.devices.min_buffer_size(&self.format)?,
                worker: None,
            },
        };
        let session = guard.insert(session);

        if self.is_playing.load(Ordering::SeqCst) && session.worker_alive() {
            log::warn!("playback already running, ignoring start");
            return Ok(());
        }
        if !session.join_worker() {
            self.is_playing.store(false, Ordering::SeqCst);
            self.interrupt.lock().take();
        }

        let source = PlaybackSource::probe(path)?;
        let total_secs = self.format.duration_secs(source.payload_bytes);

        if self
            .is_playing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::warn!("playback already running, ignoring start");
            return Ok(());
        }

        let device = match self.devices.open(&self.format, session.min_buffer_size) {
            Ok(device) => device,
            Err(e) => {
                self.is_playing.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let job = PlaybackJob {
            path: path.to_path_buf(),
            source,
            total_secs,
            device,
            buffer_size: session.min_buffer_size.max(self.format.bytes_per_frame() as usize),
            period_frames: self.format.sample_rate_hz,
            is_playing: Arc::clone(&self.is_playing),
            interrupt: Arc::clone(&self.interrupt),
            progress,
        };

        let handle = thread::Builder::new()
            .name("hubby-playback".into())
            .spawn(move || job.run())
            .map_err(|e| {
                self.is_playing.store(false, Ordering::SeqCst);
                PlaybackError::Device(format!("failed to spawn playback thread: {}", e))
            })?;

        session.worker = Some(handle);
        Ok(())
    }

    /// Stop playback. Idempotent and non-blocking.
    pub fn stop(&self) {
        if self
            .is_playing
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let interrupt = self.interrupt.lock().clone();
        if let Some(interrupt) = interrupt {
            interrupt();
        }
    }

    /// Block until the current worker, if any, has released its device.
    pub fn join_worker(&self) {
        let handle = self.session.lock().as_mut().and_then(|s| s.worker.take());
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("playback worker panicked");
            }
        }
    }
}

impl Drop for AudioTracker {
    fn drop(&mut self) {
        self.stop();
        self.join_worker();
    }
}

struct PlaybackJob {
    path: PathBuf,
    source: PlaybackSource,
    total_secs: u32,
    device: Box<dyn OutputDevice>,
    buffer_size: usize,
    period_frames: u32,
    is_playing: Arc<AtomicBool>,
    interrupt: Arc<Mutex<Option<DeviceInterrupt>>>,
    progress: Option<ProgressDispatch>,
}

impl PlaybackJob {
    fn run(self) {
        let PlaybackJob {
            path,
            source,
            total_secs,
            mut device,
            buffer_size,
            period_frames,
            is_playing,
            interrupt,
            progress,
        } = self;

        log::debug!("play {} ({} s)", path.display(), total_secs);

        // A panicking device must still reach the teardown below.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let file = File::open(&path).and_then(|mut f| f.seek(SeekFrom::Start(source.offset)).map(|_| f));
            if let Some(progress) = &progress {
                progress.init(total_secs);
            }

            match file {
                Ok(file) => {
                    if let Some(progress) = &progress {
                        let progress = progress.clone();
                        device.set_position_callback(
                            period_frames,
                            Box::new(move |head_frames, rate| progress.play_time(rounded_secs(head_frames, rate))),
                        );
                    }
                    *interrupt.lock() = Some(device.interrupt_handle());
                    stream(file, device.as_mut(), buffer_size, &is_playing);
                }
                Err(e) => log::error!("failed to open {}: {}", path.display(), e),
            }
        }));
        if let Err(payload) = outcome {
            log::error!("playback loop panicked: {}", panic_message(&*payload));
        }

        is_playing.store(false, Ordering::SeqCst);
        interrupt.lock().take();
        device.stop();
        device.release();
        log::debug!("playback finished");

        if let Some(progress) = &progress {
            progress.play_time(0);
        }
    }
}

/// Copy `file` into `device` until EOF, an error, or the flag clears.
fn stream(mut file: File, device: &mut dyn OutputDevice, buffer_size: usize, is_playing: &AtomicBool) {
    if let Err(e) = device.play() {
        log::error!("failed to start output device: {}", e);
        return;
    }

    let mut buf = vec![0u8; buffer_size];
    while is_playing.load(Ordering::SeqCst) {
        let read = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                log::error!("playback read failed: {}", e);
                break;
            }
        };

        let mut pending = &buf[..read];
        while !pending.is_empty() {
            match device.write(pending) {
                // Only an interrupted device accepts nothing.
                Ok(0) => return,
                Ok(n) => pending = &pending[n.min(pending.len())..],
                Err(e) => {
                    log::error!("playback write failed: {}", e);
                    return;
                }
            }
        }
    }
}

/// Elapsed whole seconds, rounded to nearest.
fn rounded_secs(head_frames: u64, rate: u32) -> u32 {
    if rate == 0 {
        return 0;
    }
    let rate = u64::from(rate);
    u32::try_from((head_frames + rate / 2) / rate).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;

    use crate::processing::wav_format::generate_wav_header;
    use crate::testing::{wait_for, MockOutputFactory, Progress, ProgressLog};
    use crate::traits::dispatch::{dispatch_queue, DispatchQueue};

    const WAIT: Duration = Duration::from_secs(5);
    const ONE_SECOND: usize = 176_400;

    fn pcm(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn tracker(factory: &Arc<MockOutputFactory>) -> AudioTracker {
        AudioTracker::new(AudioFormatSpec::CD_STEREO, Arc::clone(factory) as Arc<dyn OutputDeviceFactory>)
    }

    fn play_with_log(tracker: &AudioTracker, path: &Path) -> (Arc<ProgressLog>, DispatchQueue) {
        let log = Arc::new(ProgressLog::default());
        let (dispatcher, queue) = dispatch_queue();
        tracker
            .start_play(path, Some(log.clone()), Some(Arc::new(dispatcher)))
            .unwrap();
        (log, queue)
    }

    #[test]
    fn one_second_of_pcm_reports_one_second() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.pcm");
        let data = pcm(ONE_SECOND);
        fs::write(&path, &data).unwrap();

        let factory = Arc::new(MockOutputFactory::new());
        let tracker = tracker(&factory);
        let (log, queue) = play_with_log(&tracker, &path);
        assert!(queue.run_until(|| !tracker.is_running(), WAIT));

        assert_eq!(log.progress(), vec![Progress::Init(1), Progress::PlayTime(1), Progress::PlayTime(0)]);
        assert_eq!(*factory.stats.written.lock(), data);
        assert_eq!(factory.stats.plays.load(Ordering::SeqCst), 1);
        assert_eq!(factory.stats.live_handles(), 0);
        assert!(tracker.state().is_idle());
    }

    #[test]
    fn wav_header_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.wav");
        let payload = pcm(2 * ONE_SECOND + 1000);
        let mut file = generate_wav_header(payload.len() as u32, 44_100, 2, 16).unwrap().to_vec();
        file.extend_from_slice(&payload);
        fs::write(&path, &file).unwrap();

        let factory = Arc::new(MockOutputFactory::new());
        let tracker = tracker(&factory);
        let (log, queue) = play_with_log(&tracker, &path);
        assert!(queue.run_until(|| !tracker.is_running(), WAIT));

        assert_eq!(*factory.stats.written.lock(), payload);
        assert_eq!(
            log.progress(),
            vec![Progress::Init(2), Progress::PlayTime(1), Progress::PlayTime(2), Progress::PlayTime(0)]
        );
    }

    #[test]
    fn progress_runs_on_the_dispatch_thread() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.pcm");
        fs::write(&path, pcm(3 * ONE_SECOND)).unwrap();

        let factory = Arc::new(MockOutputFactory::new());
        let tracker = tracker(&factory);
        let (log, queue) = play_with_log(&tracker, &path);
        assert!(queue.run_until(|| !tracker.is_running(), WAIT));

        let here = thread::current().id();
        assert!(!log.threads().is_empty());
        assert!(log.threads().iter().all(|t| *t == here));
        let device_threads = factory.stats.callback_threads.lock().clone();
        assert_eq!(device_threads.len(), 3);
        assert!(device_threads.iter().all(|t| *t != here));
    }

    #[test]
    fn missing_file_opens_no_device() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(MockOutputFactory::new());
        let tracker = tracker(&factory);

        let missing = dir.path().join("nope.pcm");
        assert_eq!(tracker.start_play(&missing, None, None), Err(PlaybackError::FileNotFound(missing)));
        // A directory is not a playable file either.
        assert!(matches!(
            tracker.start_play(dir.path(), None, None),
            Err(PlaybackError::FileNotFound(_))
        ));
        assert_eq!(factory.stats.opens.load(Ordering::SeqCst), 0);
        assert!(tracker.session.lock().is_none());
    }

    #[test]
    fn sink_without_dispatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.pcm");
        fs::write(&path, pcm(64)).unwrap();
        let factory = Arc::new(MockOutputFactory::new());
        let tracker = tracker(&factory);

        let log: Arc<dyn ProgressSink> = Arc::new(ProgressLog::default());
        assert!(matches!(
            tracker.start_play(&path, Some(log), None),
            Err(PlaybackError::InvalidArgument(_))
        ));
        assert_eq!(factory.stats.opens.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn plays_without_a_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.pcm");
        let data = pcm(10_000);
        fs::write(&path, &data).unwrap();
        let factory = Arc::new(MockOutputFactory::new());
        let tracker = tracker(&factory);

        tracker.start_play(&path, None, None).unwrap();
        tracker.join_worker();
        assert_eq!(*factory.stats.written.lock(), data);
        assert_eq!(factory.stats.live_handles(), 0);
    }

    #[test]
    fn empty_file_reports_zero_then_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.pcm");
        fs::write(&path, b"").unwrap();
        let factory = Arc::new(MockOutputFactory::new());
        let tracker = tracker(&factory);

        let (log, queue) = play_with_log(&tracker, &path);
        assert!(queue.run_until(|| !tracker.is_running(), WAIT));
        assert_eq!(log.progress(), vec![Progress::Init(0), Progress::PlayTime(0)]);
        assert_eq!(factory.stats.live_handles(), 0);
    }

    #[test]
    fn stop_interrupts_the_device() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.pcm");
        fs::write(&path, pcm(10 * ONE_SECOND)).unwrap();
        let mut factory = MockOutputFactory::new();
        factory.write_delay = Duration::from_millis(2);
        let factory = Arc::new(factory);
        let tracker = tracker(&factory);

        let (log, queue) = play_with_log(&tracker, &path);
        assert!(wait_for(|| factory.stats.written.lock().len() >= 8192, WAIT));
        assert!(tracker.is_playing());

        tracker.stop();
        tracker.stop();
        assert!(!tracker.is_playing());
        assert!(queue.run_until(|| !tracker.is_running(), WAIT));

        assert!(factory.stats.written.lock().len() < 10 * ONE_SECOND);
        assert_eq!(factory.stats.interrupts.load(Ordering::SeqCst), 1);
        assert_eq!(factory.stats.live_handles(), 0);
        assert_eq!(log.progress().last(), Some(&Progress::PlayTime(0)));
        assert!(tracker.interrupt.lock().is_none());
    }

    #[test]
    fn start_while_playing_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.pcm");
        fs::write(&path, pcm(10 * ONE_SECOND)).unwrap();
        let mut factory = MockOutputFactory::new();
        factory.write_delay = Duration::from_millis(2);
        let factory = Arc::new(factory);
        let tracker = tracker(&factory);

        tracker.start_play(&path, None, None).unwrap();
        tracker.start_play(&path, None, None).unwrap();
        assert_eq!(factory.stats.opens.load(Ordering::SeqCst), 1);

        tracker.stop();
        tracker.join_worker();
        assert_eq!(factory.stats.live_handles(), 0);
    }

    #[test]
    fn stop_when_idle_is_harmless() {
        let factory = Arc::new(MockOutputFactory::new());
        let tracker = tracker(&factory);
        tracker.stop();
        tracker.stop();
        assert!(tracker.state().is_idle());
        assert_eq!(factory.stats.interrupts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn write_failure_ends_session_and_releases_device() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.pcm");
        fs::write(&path, pcm(ONE_SECOND)).unwrap();
        let factory = Arc::new(MockOutputFactory::new());
        factory.fail_writes.store(true, Ordering::SeqCst);
        let tracker = tracker(&factory);

        let (log, queue) = play_with_log(&tracker, &path);
        assert!(queue.run_until(|| !tracker.is_running(), WAIT));

        assert!(!tracker.is_playing());
        assert!(factory.stats.written.lock().is_empty());
        assert_eq!(factory.stats.stops.load(Ordering::SeqCst), 1);
        assert_eq!(factory.stats.live_handles(), 0);
        assert_eq!(log.progress(), vec![Progress::Init(1), Progress::PlayTime(0)]);
    }

    #[test]
    fn panicking_device_is_still_released_and_replay_works() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.pcm");
        fs::write(&path, pcm(ONE_SECOND)).unwrap();
        let factory = Arc::new(MockOutputFactory::new());
        factory.panic_next_write.store(true, Ordering::SeqCst);
        let tracker = tracker(&factory);

        let (log, queue) = play_with_log(&tracker, &path);
        assert!(queue.run_until(|| !tracker.is_running(), WAIT));

        assert!(!tracker.is_playing());
        assert_eq!(factory.stats.stops.load(Ordering::SeqCst), 1);
        assert_eq!(factory.stats.live_handles(), 0);
        assert!(tracker.interrupt.lock().is_none());
        assert_eq!(log.progress(), vec![Progress::Init(1), Progress::PlayTime(0)]);

        tracker.start_play(&path, None, None).unwrap();
        tracker.join_worker();
        assert_eq!(factory.stats.opens.load(Ordering::SeqCst), 2);
        assert_eq!(factory.stats.live_handles(), 0);
        assert_eq!(factory.stats.written.lock().len(), ONE_SECOND);
    }

    #[test]
    fn format_past_the_rate_ceiling_is_rejected_without_panicking() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.pcm");
        fs::write(&path, pcm(64)).unwrap();
        let factory = Arc::new(MockOutputFactory::new());
        let tracker = AudioTracker::new(
            AudioFormatSpec::new(2_000_000_000, 2, 16),
            Arc::clone(&factory) as Arc<dyn OutputDeviceFactory>,
        );

        assert!(matches!(
            tracker.start_play(&path, None, None),
            Err(PlaybackError::InvalidArgument(_))
        ));
        assert_eq!(factory.stats.opens.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn replay_opens_a_fresh_device() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.pcm");
        fs::write(&path, pcm(4096)).unwrap();
        let factory = Arc::new(MockOutputFactory::new());
        let tracker = tracker(&factory);

        for _ in 0..3 {
            tracker.start_play(&path, None, None).unwrap();
            tracker.join_worker();
        }
        assert_eq!(factory.stats.opens.load(Ordering::SeqCst), 3);
        assert_eq!(factory.stats.live_handles(), 0);
    }

    #[test]
    fn rounding_is_to_nearest_second() {
        assert_eq!(rounded_secs(0, 44_100), 0);
        assert_eq!(rounded_secs(22_049, 44_100), 0);
        assert_eq!(rounded_secs(22_050, 44_100), 1);
        assert_eq!(rounded_secs(88_200, 44_100), 2);
        assert_eq!(rounded_secs(1_000, 0), 0);
    }

    #[test]
    fn probe_detects_wav_header() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("a.wav");
        let mut bytes = generate_wav_header(100, 44_100, 2, 16).unwrap().to_vec();
        bytes.extend_from_slice(&[0; 100]);
        fs::write(&wav, &bytes).unwrap();
        assert_eq!(
            PlaybackSource::probe(&wav).unwrap(),
            PlaybackSource {
                offset: 44,
                payload_bytes: 100
            }
        );

        let raw = dir.path().join("a.pcm");
        fs::write(&raw, [7u8; 60]).unwrap();
        assert_eq!(
            PlaybackSource::probe(&raw).unwrap(),
            PlaybackSource {
                offset: 0,
                payload_bytes: 60
            }
        );
    }
}
