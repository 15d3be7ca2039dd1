//! Streaming engine: one background worker per playback session.
//!
//! The worker owns the voice, the buffer ring, and the reader. Handles talk to
//! it only through the shared [`ControlBlock`](control::ControlBlock):
//!
//! ```text
//! Priming ─► Playing ⇄ Paused
//!               │        │
//!               ▼        ▼
//!            Draining ◄──┘ ─► Stopped
//! ```
//!
//! `Stopped` is reachable from every state and terminal. Each iteration checks
//! stop, then pause, then does refill work, and then sleeps for the poll
//! interval.

pub(crate) mod control;
mod ring;
mod worker;

use std::io::{Read, Seek};
use std::sync::mpsc;
use std::sync::Arc;

pub use control::StreamStats;

use crate::backend::AudioBackend;
use crate::reader::ChunkedReader;
use crate::{BackendError, EventCallback, StreamConfig, StreamWavError};
use control::ControlBlock;
use worker::Worker;

/// Name given to worker threads.
const WORKER_THREAD_NAME: &str = "stream-wav-worker";

/// Lifecycle state of a playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaybackState {
    /// Allocating hardware resources and queueing the first buffers.
    Priming,
    /// Refilling buffers as the voice finishes them.
    Playing,
    /// Voice paused; the queue is kept.
    Paused,
    /// Payload exhausted; waiting for the queued buffers to play out.
    Draining,
    /// Resources released. Terminal.
    Stopped,
}

/// Why a session reached [`PlaybackState::Stopped`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// A handle called `request_stop`.
    Requested,
    /// The payload played to the end.
    Finished,
    /// Reading the payload failed; what was already queued played out.
    ReadError,
    /// A backend call failed.
    BackendError,
}

/// Starts a worker for `reader` and waits until it has primed.
///
/// The backend is built by `factory` on the worker thread, so it never has
/// to be `Send`. Returns once the first buffers are queued and the voice is
/// playing, or with the priming error after everything has been released.
pub(crate) fn spawn<R, B, F>(
    reader: ChunkedReader<R>,
    config: StreamConfig,
    factory: F,
    on_event: Option<EventCallback>,
) -> Result<Arc<ControlBlock>, StreamWavError>
where
    R: Read + Seek + Send + 'static,
    B: AudioBackend,
    F: FnOnce() -> Result<B, BackendError> + Send + 'static,
{
    let control = Arc::new(ControlBlock::new(config.initial_gain));
    let worker_control = Arc::clone(&control);
    let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), StreamWavError>>(1);

    std::thread::Builder::new()
        .name(WORKER_THREAD_NAME.to_string())
        .spawn(move || {
            let primed = factory()
                .map_err(StreamWavError::from)
                .and_then(|backend| {
                    Worker::prime(
                        backend,
                        reader,
                        &config,
                        Arc::clone(&worker_control),
                        on_event,
                    )
                });

            match primed {
                Ok(worker) => {
                    let _ = ready_tx.send(Ok(()));
                    worker.run();
                }
                Err(e) => {
                    tracing::error!(error = %e, "Stream failed to start");
                    worker_control.finish(StopReason::BackendError);
                    let _ = ready_tx.send(Err(e));
                }
            }
        })
        .map_err(StreamWavError::WorkerSpawn)?;

    ready_rx.recv().map_err(|_| StreamWavError::WorkerLost)??;
    Ok(control)
}
