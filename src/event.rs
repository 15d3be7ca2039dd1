//! Runtime events for monitoring playback.
//!
//! Events are non-fatal notifications emitted by the worker thread. Runtime
//! failures never come back to the caller as errors; they show up here and in
//! the session's [`StopReason`].

use std::sync::Arc;

use crate::{PlaybackState, StopReason};

/// Runtime events emitted during playback.
///
/// Delivered on the worker thread, in the order they happen, through the
/// [`EventCallback`] registered with the builder. Keep handlers short: the
/// next refill waits for them.
///
/// # Example
///
/// ```
/// use stream_wav::StreamEvent;
///
/// fn handle_event(event: StreamEvent) {
///     match event {
///         StreamEvent::StateChanged { previous, current } => {
///             eprintln!("{previous:?} -> {current:?}");
///         }
///         StreamEvent::Looped { passes } => {
///             eprintln!("Looped, {passes} passes completed");
///         }
///         StreamEvent::Underrun { recovered } => {
///             eprintln!("Device ran dry (recovered: {recovered})");
///         }
///         StreamEvent::ReadFailed { error } => {
///             eprintln!("Read failed, draining: {error}");
///         }
///         StreamEvent::BackendFault { operation, error } => {
///             eprintln!("Backend {operation} failed: {error}");
///         }
///         StreamEvent::Finished { reason } => {
///             eprintln!("Finished: {reason:?}");
///         }
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// The session moved to a new state.
    StateChanged {
        /// State before the transition.
        previous: PlaybackState,
        /// State after the transition.
        current: PlaybackState,
    },

    /// The reader wrapped to the start of the payload.
    Looped {
        /// Total passes completed so far.
        passes: u64,
    },

    /// The device played out every queued buffer before a refill arrived.
    ///
    /// Usually means the poll interval is too coarse for the ring shape.
    /// See [`StreamConfig::recommended_poll_interval`](crate::StreamConfig::recommended_poll_interval).
    Underrun {
        /// Whether restarting the voice succeeded.
        recovered: bool,
    },

    /// Reading the payload failed.
    ///
    /// The failed buffer is discarded and the session drains what is
    /// already queued, then stops with [`StopReason::ReadError`].
    ReadFailed {
        /// Description of the error.
        error: String,
    },

    /// A backend call failed while playing.
    ///
    /// The session stops with [`StopReason::BackendError`].
    BackendFault {
        /// The backend operation that failed.
        operation: &'static str,
        /// Description of the error.
        error: String,
    },

    /// The session reached [`PlaybackState::Stopped`] and released its
    /// hardware resources. Always the last event.
    Finished {
        /// Why the session ended.
        reason: StopReason,
    },
}

/// Callback type for receiving runtime events.
///
/// Register an event callback via [`StreamingBuilder::on_event()`] to
/// receive state transitions, loop notifications, and runtime failures.
///
/// [`StreamingBuilder::on_event()`]: crate::StreamingBuilder::on_event
///
/// # Example
///
/// ```ignore
/// use stream_wav::Streaming;
///
/// let stream = Streaming::builder()
///     .looping(true)
///     .on_event(|event| {
///         tracing::info!(?event, "stream event");
///     })
///     .open("music.wav")?;
/// ```
pub type EventCallback = Arc<dyn Fn(StreamEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// This is a convenience function for creating event callbacks without
/// manually wrapping in `Arc`.
///
/// # Example
///
/// ```
/// use stream_wav::{event_callback, StreamEvent};
///
/// let callback = event_callback(|event| {
///     println!("Got event: {:?}", event);
/// });
/// callback(StreamEvent::Looped { passes: 1 });
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(StreamEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}
