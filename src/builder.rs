//! Builder pattern for `Streaming`.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use std::time::Duration;

use crate::backend::AudioBackend;
use crate::reader::ChunkedReader;
use crate::{
    engine, event_callback, BackendError, EventCallback, StreamConfig, StreamEvent,
    StreamWavError, Streaming,
};

/// Builder for configuring and starting a playback session.
///
/// Use [`Streaming::builder()`] to create a new builder.
///
/// # Example
///
/// ```ignore
/// use stream_wav::Streaming;
/// use std::time::Duration;
///
/// let stream = Streaming::builder()
///     .looping(true)
///     .gain(0.8)
///     .buffer_count(3)
///     .poll_interval(Duration::from_millis(100))
///     .on_event(|e| tracing::info!(?e, "stream event"))
///     .open("ambience.wav")?;
/// ```
#[must_use]
pub struct StreamingBuilder {
    config: StreamConfig,
    event_callback: Option<EventCallback>,
    #[cfg(feature = "cpal-backend")]
    output_device: Option<String>,
}

impl Default for StreamingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: StreamConfig::default(),
            event_callback: None,
            #[cfg(feature = "cpal-backend")]
            output_device: None,
        }
    }

    /// Restart from the beginning of the payload when it runs out.
    pub fn looping(mut self, looping: bool) -> Self {
        self.config.looping = looping;
        self
    }

    /// Set the gain applied when playback starts (1.0 = unity).
    pub fn gain(mut self, gain: f32) -> Self {
        self.config.initial_gain = gain;
        self
    }

    /// Set the number of hardware buffers in the ring (at least 2).
    pub fn buffer_count(mut self, count: usize) -> Self {
        self.config.buffer_count = count;
        self
    }

    /// Set how much audio each buffer holds.
    pub fn buffer_duration(mut self, duration: Duration) -> Self {
        self.config.buffer_duration = duration;
        self
    }

    /// Set how long the worker sleeps between iterations.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set a callback for runtime events.
    ///
    /// The callback runs on the worker thread.
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(StreamEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(event_callback(callback));
        self
    }

    /// Set custom stream configuration.
    pub fn with_config(mut self, config: StreamConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the configuration the session will start with.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Starts playing `source` through a backend built by `backend`.
    ///
    /// The header is parsed and validated here, on the calling thread, so
    /// format errors are returned before any worker exists. `backend` then
    /// runs on the new worker thread; this call returns once the first
    /// buffers are queued and the voice is playing.
    ///
    /// # Errors
    ///
    /// - [`StreamWavError::InvalidConfig`] for a bad configuration
    /// - Container errors such as [`StreamWavError::MissingChunk`]
    /// - [`StreamWavError::Backend`] if the backend cannot be created or the
    ///   voice and buffers cannot be allocated; nothing is left running
    pub fn start_with<R, B, F>(self, source: R, backend: F) -> Result<Streaming, StreamWavError>
    where
        R: Read + Seek + Send + 'static,
        B: AudioBackend,
        F: FnOnce() -> Result<B, BackendError> + Send + 'static,
    {
        self.config.validate()?;

        let mut reader = ChunkedReader::open(source)?;
        reader.set_looping(self.config.looping);
        let format = *reader.format();

        tracing::info!(
            channels = format.channels,
            sample_rate = format.sample_rate,
            payload_bytes = format.payload_size,
            duration_ms = format.duration().as_millis() as u64,
            looping = self.config.looping,
            buffers = self.config.buffer_count,
            "Starting stream"
        );

        let control = engine::spawn(reader, self.config, backend, self.event_callback)?;
        Ok(Streaming::new(control, format))
    }

    /// Opens a container file and starts playing it through `backend`.
    ///
    /// # Errors
    ///
    /// Returns [`StreamWavError::Open`] if the file cannot be opened, and
    /// otherwise the same errors as [`start_with()`](Self::start_with).
    pub fn open_with<B, F>(
        self,
        path: impl AsRef<Path>,
        backend: F,
    ) -> Result<Streaming, StreamWavError>
    where
        B: AudioBackend,
        F: FnOnce() -> Result<B, BackendError> + Send + 'static,
    {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| StreamWavError::open(path, e))?;
        tracing::debug!(path = %path.display(), "Opened container");
        self.start_with(BufReader::new(file), backend)
    }
}

#[cfg(feature = "cpal-backend")]
impl StreamingBuilder {
    /// Play through a specific output device by name instead of the default.
    pub fn output_device(mut self, name: impl Into<String>) -> Self {
        self.output_device = Some(name.into());
        self
    }

    /// Starts playing `source` on the selected output device.
    ///
    /// # Errors
    ///
    /// Same as [`start_with()`](Self::start_with); a missing device is
    /// reported as [`BackendError::DeviceUnavailable`].
    pub fn start<R>(mut self, source: R) -> Result<Streaming, StreamWavError>
    where
        R: Read + Seek + Send + 'static,
    {
        let device = self.output_device.take();
        self.start_with(source, move || cpal_backend(device))
    }

    /// Opens a container file and plays it on the selected output device.
    ///
    /// # Errors
    ///
    /// Same as [`open_with()`](Self::open_with).
    pub fn open(mut self, path: impl AsRef<Path>) -> Result<Streaming, StreamWavError> {
        let device = self.output_device.take();
        self.open_with(path, move || cpal_backend(device))
    }
}

#[cfg(feature = "cpal-backend")]
fn cpal_backend(device: Option<String>) -> Result<crate::backend::CpalBackend, BackendError> {
    match device {
        Some(name) => crate::backend::CpalBackend::open_by_name(&name),
        None => crate::backend::CpalBackend::default_output(),
    }
}
