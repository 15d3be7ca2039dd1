//! # stream-wav
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Streamed playback of PCM WAV files through a small ring of queued buffers.
//!
//! `stream-wav` plays arbitrarily large 16-bit PCM containers without loading
//! them into memory: a background worker keeps N hardware buffers (about one
//! second each) cycling through a voice queue, refilling each one only after
//! the device reports it finished. Playback can loop, pause, change gain, and
//! be stopped from any thread.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stream_wav::{Streaming, StreamEvent};
//!
//! let stream = Streaming::builder()
//!     .looping(true)
//!     .gain(0.8)
//!     .on_event(|e| tracing::info!(?e, "stream event"))
//!     .open("soundtrack.wav")?;
//!
//! // Playback runs in the background...
//! stream.request_pause(true);
//! stream.request_pause(false);
//!
//! stream.request_stop();
//! stream.stopped().await;
//! ```
//!
//! ## Architecture
//!
//! - **Container** ([`container`]): parses the `RIFF`/`WAVE` header on the
//!   caller's thread, so format errors are returned before anything starts
//! - **Reader** ([`ChunkedReader`]): streams the payload, wrapping
//!   transparently when looping
//! - **Worker**: one thread per session that owns the voice and buffers,
//!   polling on a fixed interval: stop, then pause, then refill
//! - **Backend** ([`backend`]): a voice/buffer-queue audio API; CPAL output
//!   or the in-memory [`MockBackend`](backend::MockBackend)
//!
//! The worker and its handles share exactly one mutex-guarded control block.
//! Runtime failures end the session and surface as [`StreamEvent`]s and a
//! [`StopReason`], never as errors on the handle.

#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

pub mod backend;
mod builder;
mod config;
pub mod container;
mod engine;
mod error;
mod event;
pub mod format;
mod reader;
mod streaming;

pub use backend::{AudioBackend, BufferId, VoiceId, VoiceSpec};
pub use builder::StreamingBuilder;
pub use config::{StreamConfig, MAX_BUFFER_COUNT, MAX_BUFFER_DURATION};
pub use container::{FormatDescriptor, WavHeader};
pub use engine::{PlaybackState, StopReason, StreamStats};
pub use error::{BackendError, StreamWavError};
pub use event::{event_callback, EventCallback, StreamEvent};
pub use reader::{ChunkedReader, StreamCursor};
pub use streaming::Streaming;

#[cfg(feature = "cpal-backend")]
pub use backend::CpalBackend;
