//! Public handle to a playback session.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::container::FormatDescriptor;
use crate::engine::control::ControlBlock;
use crate::{PlaybackState, StopReason, StreamStats, StreamingBuilder};

/// Handle to a playback session.
///
/// Returned by [`StreamingBuilder`] once the first buffers are queued and
/// the voice is playing. Playback runs on a background worker thread; every
/// method here only touches the shared control block and never waits for the
/// worker (except the explicit `wait_stopped` / `stopped`).
///
/// The handle is cheap to clone and may be shared across threads. Dropping
/// every handle does **not** stop playback: the worker keeps going until the
/// payload ends (or forever, when looping) and releases its resources itself.
/// Call [`request_stop()`](Self::request_stop) to end a session early.
///
/// # Example
///
/// ```
/// use std::io::Cursor;
/// use std::time::Duration;
/// use stream_wav::backend::{Completion, MockBackend};
/// use stream_wav::container::{write_header, FormatDescriptor};
/// use stream_wav::{PlaybackState, Streaming};
///
/// let mut wav = Vec::new();
/// write_header(&mut wav, &FormatDescriptor::pcm16(1, 8000, 1600)).unwrap();
/// wav.resize(44 + 1600, 0);
///
/// let (backend, _probe) = MockBackend::new(Completion::Manual);
/// let stream = Streaming::builder()
///     .looping(true)
///     .buffer_duration(Duration::from_millis(50))
///     .poll_interval(Duration::from_millis(5))
///     .start_with(Cursor::new(wav), move || Ok(backend))
///     .unwrap();
///
/// stream.set_gain(0.5);
/// stream.request_stop();
/// assert!(!stream.is_playing());
/// assert!(stream.wait_stopped(Duration::from_secs(5)));
/// assert_eq!(stream.state(), PlaybackState::Stopped);
/// ```
#[derive(Clone)]
pub struct Streaming {
    control: Arc<ControlBlock>,
    format: FormatDescriptor,
}

impl Streaming {
    /// Creates a builder for a new session.
    pub fn builder() -> StreamingBuilder {
        StreamingBuilder::new()
    }

    /// Plays a container file on the default output device.
    ///
    /// Shorthand for `Streaming::builder().looping(looping).open(path)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or parsed, or if the
    /// output device cannot be set up.
    #[cfg(feature = "cpal-backend")]
    pub fn open(
        path: impl AsRef<std::path::Path>,
        looping: bool,
    ) -> Result<Self, crate::StreamWavError> {
        Self::builder().looping(looping).open(path)
    }

    pub(crate) fn new(control: Arc<ControlBlock>, format: FormatDescriptor) -> Self {
        Self { control, format }
    }

    /// Sets the linear output gain (1.0 = unity).
    ///
    /// Applied by the worker on its next iteration. Negative values are
    /// clamped to silence; non-finite values are ignored.
    pub fn set_gain(&self, gain: f32) {
        if !gain.is_finite() {
            tracing::warn!(gain, "Ignoring non-finite gain");
            return;
        }
        self.control.set_gain(gain.max(0.0));
    }

    /// Returns the most recently requested gain.
    pub fn gain(&self) -> f32 {
        self.control.gain()
    }

    /// Pauses (`true`) or resumes (`false`) playback.
    ///
    /// Resuming continues exactly where playback paused. Does nothing once a
    /// stop has been requested.
    pub fn request_pause(&self, paused: bool) {
        self.control.request_pause(paused);
    }

    /// Returns `true` if a pause is currently requested.
    pub fn is_pause_requested(&self) -> bool {
        self.control.is_pause_requested()
    }

    /// Asks the worker to stop and release its resources.
    ///
    /// Idempotent and non-blocking: the worker observes the request within
    /// one poll interval. Use [`wait_stopped()`](Self::wait_stopped) or
    /// [`stopped()`](Self::stopped) to wait for it.
    pub fn request_stop(&self) {
        if self.control.request_stop() {
            tracing::debug!("Stop requested");
        }
    }

    /// Returns `true` while the voice is producing audio.
    ///
    /// `false` as soon as a stop has been requested, even before the worker
    /// has observed it, and permanently once the session has stopped.
    pub fn is_playing(&self) -> bool {
        self.control.is_playing()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PlaybackState {
        self.control.state()
    }

    /// Why the session stopped, once it has.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.control.stop_reason()
    }

    /// Returns current session statistics.
    pub fn stats(&self) -> StreamStats {
        self.control.stats()
    }

    /// Format of the container being played.
    pub fn format(&self) -> &FormatDescriptor {
        &self.format
    }

    /// Blocks until the session has stopped or `timeout` elapses.
    ///
    /// Returns `true` if the session has stopped.
    pub fn wait_stopped(&self, timeout: Duration) -> bool {
        self.control.wait_stopped(timeout)
    }

    /// Waits asynchronously until the session has stopped.
    ///
    /// Returns the stop reason.
    pub async fn stopped(&self) -> Option<StopReason> {
        let mut rx = self.control.subscribe();
        // The sender lives in the control block, which `self` keeps alive
        let _ = rx.wait_for(|state| *state == PlaybackState::Stopped).await;
        self.control.stop_reason()
    }

    /// Subscribes to state changes.
    ///
    /// The receiver starts at the current state.
    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.control.subscribe()
    }
}

impl fmt::Debug for Streaming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Streaming")
            .field("format", &self.format)
            .field("state", &self.state())
            .field("is_playing", &self.is_playing())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> Streaming {
        Streaming::new(
            Arc::new(ControlBlock::new(1.0)),
            FormatDescriptor::pcm16(2, 44100, 0),
        )
    }

    #[test]
    fn test_handle_is_send_sync_clone() {
        fn assert_traits<T: Send + Sync + Clone>() {}
        assert_traits::<Streaming>();
    }

    #[test]
    fn test_set_gain_clamps_and_ignores() {
        let stream = handle();
        stream.set_gain(-1.0);
        assert!(stream.gain().abs() < f32::EPSILON);

        stream.set_gain(f32::NAN);
        assert!(stream.gain().abs() < f32::EPSILON);

        stream.set_gain(0.7);
        assert!((stream.gain() - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn test_pause_then_stop() {
        let stream = handle();
        stream.request_pause(true);
        assert!(stream.is_pause_requested());

        stream.request_stop();
        stream.request_stop();
        stream.request_pause(false);
        assert!(stream.is_pause_requested());
        assert!(!stream.is_playing());
    }

    #[test]
    fn test_clones_share_state() {
        let stream = handle();
        let other = stream.clone();
        other.set_gain(0.25);
        assert!((stream.gain() - 0.25).abs() < f32::EPSILON);
    }

    #[test]
    fn test_debug_shows_state() {
        let debug = format!("{:?}", handle());
        assert!(debug.contains("Priming"));
    }
}
