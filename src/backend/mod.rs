//! Hardware queue adapter.
//!
//! An [`AudioBackend`] is a thin synchronous facade over a platform audio
//! API built around *voices* that play a FIFO queue of *buffers*. The
//! streaming worker uploads PCM into a buffer, queues it on a voice, and
//! later asks the voice which buffers have finished playing so they can be
//! refilled.
//!
//! The crate provides two backends:
//!
//! - [`MockBackend`]: Deterministic in-memory backend for tests and CI
//! - `CpalBackend`: Real output through CPAL (`cpal-backend` feature)
//!
//! Backends are only ever called from the worker thread that owns them, so
//! they need not be `Send`; the worker receives a `Send` factory instead.

#[cfg(feature = "cpal-backend")]
mod cpal_output;
mod mock;

#[cfg(feature = "cpal-backend")]
pub use cpal_output::CpalBackend;
pub use mock::{Completion, MockBackend, MockProbe, Upload, VoiceStatus};

use crate::BackendError;

/// Backend handle for an allocated buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

/// Backend handle for an allocated voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(pub u32);

/// What a voice will be asked to play.
///
/// Backends that feed a fixed-size device queue use this to size it;
/// queue-of-buffers APIs may ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceSpec {
    /// Channels of the PCM that will be uploaded.
    pub channels: u16,
    /// Sample rate of the PCM that will be uploaded.
    pub sample_rate: u32,
    /// Most frames that will ever be queued at once.
    pub max_queued_frames: usize,
}

/// Synchronous voice/buffer-queue audio API.
///
/// Every call is expected to return within a small, driver-bound time.
///
/// # Contract
///
/// - A buffer may only be uploaded to or released while it is not queued.
/// - Queued buffers finish in the order they were queued.
/// - `stop` marks every queued buffer as processed.
/// - `is_playing` becomes `false` once a voice runs out of queued audio.
pub trait AudioBackend {
    /// Allocates a voice, initially stopped with gain 1.0.
    fn create_voice(&mut self, spec: &VoiceSpec) -> Result<VoiceId, BackendError>;

    /// Releases a voice. Any buffers still queued on it are detached.
    fn release_voice(&mut self, voice: VoiceId) -> Result<(), BackendError>;

    /// Allocates an empty buffer.
    fn create_buffer(&mut self) -> Result<BufferId, BackendError>;

    /// Releases a buffer that is not queued.
    fn release_buffer(&mut self, buffer: BufferId) -> Result<(), BackendError>;

    /// Replaces the contents of `buffer` with little-endian 16-bit PCM.
    fn upload(
        &mut self,
        buffer: BufferId,
        stereo: bool,
        pcm: &[u8],
        sample_rate: u32,
    ) -> Result<(), BackendError>;

    /// Appends `buffer` to the voice's play queue.
    fn enqueue(&mut self, voice: VoiceId, buffer: BufferId) -> Result<(), BackendError>;

    /// Number of queued buffers that have finished playing.
    fn processed_count(&mut self, voice: VoiceId) -> Result<usize, BackendError>;

    /// Removes the oldest finished buffer from the voice's queue.
    fn dequeue_processed(&mut self, voice: VoiceId) -> Result<BufferId, BackendError>;

    /// Starts or resumes playback.
    fn play(&mut self, voice: VoiceId) -> Result<(), BackendError>;

    /// Stops playback and marks every queued buffer processed.
    fn stop(&mut self, voice: VoiceId) -> Result<(), BackendError>;

    /// Pauses playback, keeping the queue and position.
    fn pause(&mut self, voice: VoiceId) -> Result<(), BackendError>;

    /// Sets the linear output gain (1.0 = unity).
    fn set_gain(&mut self, voice: VoiceId, gain: f32) -> Result<(), BackendError>;

    /// Returns whether the voice is currently producing audio.
    fn is_playing(&mut self, voice: VoiceId) -> Result<bool, BackendError>;
}

impl<B: AudioBackend + ?Sized> AudioBackend for Box<B> {
    fn create_voice(&mut self, spec: &VoiceSpec) -> Result<VoiceId, BackendError> {
        (**self).create_voice(spec)
    }

    fn release_voice(&mut self, voice: VoiceId) -> Result<(), BackendError> {
        (**self).release_voice(voice)
    }

    fn create_buffer(&mut self) -> Result<BufferId, BackendError> {
        (**self).create_buffer()
    }

    fn release_buffer(&mut self, buffer: BufferId) -> Result<(), BackendError> {
        (**self).release_buffer(buffer)
    }

    fn upload(
        &mut self,
        buffer: BufferId,
        stereo: bool,
        pcm: &[u8],
        sample_rate: u32,
    ) -> Result<(), BackendError> {
        (**self).upload(buffer, stereo, pcm, sample_rate)
    }

    fn enqueue(&mut self, voice: VoiceId, buffer: BufferId) -> Result<(), BackendError> {
        (**self).enqueue(voice, buffer)
    }

    fn processed_count(&mut self, voice: VoiceId) -> Result<usize, BackendError> {
        (**self).processed_count(voice)
    }

    fn dequeue_processed(&mut self, voice: VoiceId) -> Result<BufferId, BackendError> {
        (**self).dequeue_processed(voice)
    }

    fn play(&mut self, voice: VoiceId) -> Result<(), BackendError> {
        (**self).play(voice)
    }

    fn stop(&mut self, voice: VoiceId) -> Result<(), BackendError> {
        (**self).stop(voice)
    }

    fn pause(&mut self, voice: VoiceId) -> Result<(), BackendError> {
        (**self).pause(voice)
    }

    fn set_gain(&mut self, voice: VoiceId, gain: f32) -> Result<(), BackendError> {
        (**self).set_gain(voice, gain)
    }

    fn is_playing(&mut self, voice: VoiceId) -> Result<bool, BackendError> {
        (**self).is_playing(voice)
    }
}
