//! Error types for stream-wav.
//!
//! Errors are split into two categories:
//! - **Fatal errors** ([`StreamWavError`]): Prevent a playback session from starting
//! - **Backend errors** ([`BackendError`]): Returned by [`AudioBackend`](crate::AudioBackend)
//!   calls. During session start they are wrapped in [`StreamWavError::Backend`];
//!   once the worker is running they surface as [`StreamEvent`](crate::StreamEvent)s
//!   and a [`StopReason`](crate::StopReason) instead.

use std::path::PathBuf;

use crate::backend::BufferId;

/// Fatal errors that prevent a playback session from starting.
///
/// These are returned from [`StreamingBuilder::start_with()`] and friends,
/// before or during priming. Nothing here is retried automatically.
///
/// [`StreamingBuilder::start_with()`]: crate::StreamingBuilder::start_with
#[derive(Debug, thiserror::Error)]
pub enum StreamWavError {
    /// The container file could not be opened.
    #[error("failed to open {path}: {source}")]
    Open {
        /// Path that was being opened.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Reading or seeking the byte source failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The source does not start with a `RIFF`/`WAVE` header.
    #[error("not a RIFF/WAVE container (found {magic:?})")]
    UnrecognizedContainer {
        /// The magic bytes that were found, lossily decoded.
        magic: String,
    },

    /// A required chunk was not found before the end of the source.
    #[error("required chunk '{tag}' missing")]
    MissingChunk {
        /// Tag of the missing chunk.
        tag: &'static str,
    },

    /// A chunk was present but its contents are unusable.
    #[error("malformed '{tag}' chunk: {reason}")]
    MalformedChunk {
        /// Tag of the malformed chunk.
        tag: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// The encoding is not 16-bit linear PCM.
    #[error("unsupported format: tag {format_tag}, {bits_per_sample} bits per sample (need tag 1, 16 bits)")]
    UnsupportedFormat {
        /// Format tag from the `fmt ` chunk.
        format_tag: u16,
        /// Bit depth from the `fmt ` chunk.
        bits_per_sample: u16,
    },

    /// The channel layout or sample rate cannot be played.
    #[error("unsupported layout: {channels} channel(s) at {sample_rate}Hz")]
    UnsupportedLayout {
        /// Channel count from the `fmt ` chunk.
        channels: u16,
        /// Sample rate from the `fmt ` chunk.
        sample_rate: u32,
    },

    /// The stream configuration is invalid.
    #[error("invalid stream config: {reason}")]
    InvalidConfig {
        /// Why the configuration was rejected.
        reason: String,
    },

    /// The audio backend failed while the session was being set up.
    #[error("audio backend error: {0}")]
    Backend(#[from] BackendError),

    /// The worker thread could not be spawned.
    #[error("failed to spawn stream worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    /// The worker exited before reporting whether priming succeeded.
    #[error("stream worker exited during startup")]
    WorkerLost,
}

impl StreamWavError {
    /// Creates an invalid-config error with the given reason.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Creates an open error for the given path.
    pub fn open(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Open {
            path: path.into(),
            source,
        }
    }
}

/// Errors reported by an [`AudioBackend`](crate::AudioBackend).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// No output device is available.
    #[error("no output device available")]
    DeviceUnavailable,

    /// The voice handle is not known to the backend.
    #[error("unknown voice")]
    UnknownVoice,

    /// The buffer handle is not known to the backend.
    #[error("unknown buffer {0:?}")]
    UnknownBuffer(BufferId),

    /// The buffer is queued on a voice and cannot be modified or released.
    #[error("buffer {0:?} is still queued")]
    BufferInFlight(BufferId),

    /// The voice queue has no room for the buffer.
    #[error("voice queue is full")]
    QueueFull,

    /// A processed buffer was requested but none has finished playing.
    #[error("no processed buffer to dequeue")]
    NothingProcessed,

    /// A voice or buffer could not be allocated.
    #[error("allocation failed: {0}")]
    Allocation(String),

    /// The backend returned buffers in a different order than they were queued.
    #[error("buffer {actual:?} finished before {expected:?}")]
    OutOfOrder {
        /// The buffer that was submitted first.
        expected: BufferId,
        /// The buffer the backend reported.
        actual: BufferId,
    },

    /// An error from the underlying audio library.
    #[error("audio stream error: {0}")]
    Stream(String),
}

impl BackendError {
    /// Creates an allocation error with the given reason.
    pub fn allocation(reason: impl Into<String>) -> Self {
        Self::Allocation(reason.into())
    }

    /// Creates a stream error from anything displayable.
    pub fn stream(err: impl std::fmt::Display) -> Self {
        Self::Stream(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_chunk_display() {
        let err = StreamWavError::MissingChunk { tag: "data" };
        assert_eq!(err.to_string(), "required chunk 'data' missing");
    }

    #[test]
    fn test_unsupported_format_display() {
        let err = StreamWavError::UnsupportedFormat {
            format_tag: 3,
            bits_per_sample: 32,
        };
        assert!(err.to_string().contains("tag 3"));
        assert!(err.to_string().contains("32 bits"));
    }

    #[test]
    fn test_open_error_includes_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = StreamWavError::open("/tmp/missing.wav", io_err);
        assert!(err.to_string().contains("/tmp/missing.wav"));
    }

    #[test]
    fn test_backend_error_converts() {
        let err: StreamWavError = BackendError::allocation("out of buffers").into();
        assert_eq!(
            err.to_string(),
            "audio backend error: allocation failed: out of buffers"
        );
    }

    #[test]
    fn test_invalid_config_helper() {
        let err = StreamWavError::invalid_config("buffer_count must be at least 2");
        assert_eq!(
            err.to_string(),
            "invalid stream config: buffer_count must be at least 2"
        );
    }
}
