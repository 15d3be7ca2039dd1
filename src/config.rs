//! Configuration types for playback sessions.

use std::time::Duration;

use crate::container::FormatDescriptor;
use crate::StreamWavError;

/// Most buffers a ring may hold.
pub const MAX_BUFFER_COUNT: usize = 64;

/// Longest audio a single buffer may hold.
pub const MAX_BUFFER_DURATION: Duration = Duration::from_secs(60);

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Configuration for a streaming session.
///
/// Use [`StreamConfig::default()`] for sensible defaults, or customize as needed.
///
/// # Example
///
/// ```
/// use stream_wav::StreamConfig;
/// use std::time::Duration;
///
/// let config = StreamConfig {
///     buffer_count: 3,
///     poll_interval: Duration::from_millis(100),
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// Number of hardware buffers cycled through the voice queue.
    ///
    /// At least 2, so one buffer can be refilled while another plays.
    /// Default: 2
    pub buffer_count: usize,

    /// Audio held by each buffer.
    ///
    /// Larger buffers tolerate a slower poll interval at the cost of memory
    /// and stop latency on the device side.
    /// Default: 1 second
    pub buffer_duration: Duration,

    /// How long the worker sleeps between iterations.
    ///
    /// Bounds how quickly stop and pause requests are observed. Keep it well
    /// below `buffer_duration / buffer_count` to avoid underruns.
    /// Default: 250ms
    pub poll_interval: Duration,

    /// Restart from the beginning of the payload when it runs out.
    ///
    /// Default: false
    pub looping: bool,

    /// Linear gain applied when playback starts (1.0 = unity).
    ///
    /// Default: 1.0
    pub initial_gain: f32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_count: 2,
            buffer_duration: Duration::from_secs(1),
            poll_interval: Duration::from_millis(250),
            looping: false,
            initial_gain: 1.0,
        }
    }
}

impl StreamConfig {
    /// Checks the configuration before a session starts.
    ///
    /// Logs a warning (but accepts the config) when the poll interval is too
    /// coarse for the ring to stay ahead of playback.
    ///
    /// # Errors
    ///
    /// Returns [`StreamWavError::InvalidConfig`] for a buffer count outside
    /// `2..=MAX_BUFFER_COUNT`, a buffer duration that is zero or above
    /// [`MAX_BUFFER_DURATION`], a zero poll interval, or a gain that is
    /// negative or not finite.
    pub fn validate(&self) -> Result<(), StreamWavError> {
        if !(2..=MAX_BUFFER_COUNT).contains(&self.buffer_count) {
            return Err(StreamWavError::invalid_config(format!(
                "buffer_count must be in 2..={MAX_BUFFER_COUNT}, got {}",
                self.buffer_count
            )));
        }
        if self.buffer_duration.is_zero() {
            return Err(StreamWavError::invalid_config("buffer_duration must be non-zero"));
        }
        if self.buffer_duration > MAX_BUFFER_DURATION {
            return Err(StreamWavError::invalid_config(format!(
                "buffer_duration must be at most {MAX_BUFFER_DURATION:?}, got {:?}",
                self.buffer_duration
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(StreamWavError::invalid_config("poll_interval must be non-zero"));
        }
        if !self.initial_gain.is_finite() || self.initial_gain < 0.0 {
            return Err(StreamWavError::invalid_config(format!(
                "initial_gain must be finite and non-negative, got {}",
                self.initial_gain
            )));
        }

        let count = u32::try_from(self.buffer_count).map_err(|_| {
            StreamWavError::invalid_config(format!("buffer_count {} too large", self.buffer_count))
        })?;
        let budget = self.buffer_duration / count;
        if self.poll_interval > budget {
            tracing::warn!(
                poll_ms = self.poll_interval.as_millis() as u64,
                budget_ms = budget.as_millis() as u64,
                "Poll interval exceeds buffer_duration / buffer_count, playback may underrun"
            );
        }

        Ok(())
    }

    /// Size in bytes of one buffer for `format`.
    ///
    /// Always a whole number of frames, and at least one frame.
    ///
    /// # Errors
    ///
    /// Returns [`StreamWavError::InvalidConfig`] if the size does not fit in
    /// memory addresses.
    pub fn buffer_bytes(&self, format: &FormatDescriptor) -> Result<usize, StreamWavError> {
        let nanos = u128::from(format.sample_rate) * self.buffer_duration.as_nanos();
        let frames = ((nanos + NANOS_PER_SEC / 2) / NANOS_PER_SEC).max(1);
        usize::try_from(frames)
            .ok()
            .and_then(|frames| frames.checked_mul(usize::from(format.block_align().max(1))))
            .ok_or_else(|| {
                StreamWavError::invalid_config(format!(
                    "{:?} buffers at {}Hz are too large",
                    self.buffer_duration, format.sample_rate
                ))
            })
    }

    /// A poll interval with a 2x margin for the current ring shape.
    pub fn recommended_poll_interval(&self) -> Duration {
        let divisor = u32::try_from(self.buffer_count.saturating_mul(2))
            .unwrap_or(u32::MAX)
            .max(1);
        self.buffer_duration / divisor
    }
}
