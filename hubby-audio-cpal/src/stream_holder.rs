use std::thread::{self, ThreadId};

/// Makes a `cpal::Stream` storable in a device handle.
///
/// `cpal::Stream` is `!Send`. Device handles are opened on the controller
/// thread but streams are only built, played, paused and dropped on the
/// engine's worker thread, so the wrapper never actually crosses threads.
/// Dropping on another thread logs a warning.
pub(crate) struct StreamHolder {
    pub stream: cpal::Stream,
    creator_thread: ThreadId,
}

// SAFETY: the stream is created and dropped on the same worker thread; see above.
unsafe impl Send for StreamHolder {}

impl StreamHolder {
    pub fn new(stream: cpal::Stream) -> Self {
        Self {
            stream,
            creator_thread: thread::current().id(),
        }
    }
}

impl Drop for StreamHolder {
    fn drop(&mut self) {
        if thread::current().id() != self.creator_thread {
            log::warn!(
                "stream dropped on a different thread than it was built on (built: {:?}, dropping: {:?})",
                self.creator_thread,
                thread::current().id()
            );
        }
    }
}
