//! Control Block shared between the handle and the worker.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::watch;

use super::{PlaybackState, StopReason};

/// Statistics about a playback session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Refill attempts, including ones that found the payload exhausted.
    pub fills: u64,
    /// Buffers uploaded and queued on the voice.
    pub buffers_submitted: u64,
    /// Payload bytes queued for playback.
    pub bytes_streamed: u64,
    /// Times the reader wrapped to the payload start.
    pub loops_completed: u64,
    /// Times the voice ran dry with buffers still queued.
    pub underruns: u64,
    /// Most buffers queued at once.
    pub max_in_flight: usize,
}

#[derive(Debug)]
struct ControlState {
    stop_requested: bool,
    pause_requested: bool,
    gain: f32,
    gain_dirty: bool,
    playback: PlaybackState,
    voice_playing: bool,
    stop_reason: Option<StopReason>,
    stats: StreamStats,
}

/// Requests the worker has to act on this iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Requests {
    pub stop: bool,
    pub pause: bool,
    /// New gain, present only if it changed since the last poll.
    pub gain: Option<f32>,
}

/// Flags, gain, and observed state behind one mutex.
///
/// Every read and write happens under `state`'s lock, including the
/// `watch` publication. The lock is never held across a backend or I/O call
/// and no other lock is taken while it is held.
pub(crate) struct ControlBlock {
    state: Mutex<ControlState>,
    changed: Condvar,
    state_tx: watch::Sender<PlaybackState>,
}

impl ControlBlock {
    pub fn new(initial_gain: f32) -> Self {
        let (state_tx, _) = watch::channel(PlaybackState::Priming);
        Self {
            state: Mutex::new(ControlState {
                stop_requested: false,
                pause_requested: false,
                gain: initial_gain,
                gain_dirty: false,
                playback: PlaybackState::Priming,
                voice_playing: false,
                stop_reason: None,
                stats: StreamStats::default(),
            }),
            changed: Condvar::new(),
            state_tx,
        }
    }

    // Handle side

    pub fn set_gain(&self, gain: f32) {
        let mut state = self.state.lock();
        state.gain = gain;
        state.gain_dirty = true;
    }

    pub fn gain(&self) -> f32 {
        self.state.lock().gain
    }

    pub fn request_pause(&self, paused: bool) {
        let mut state = self.state.lock();
        if state.stop_requested {
            return;
        }
        state.pause_requested = paused;
    }

    pub fn is_pause_requested(&self) -> bool {
        self.state.lock().pause_requested
    }

    /// Returns `true` if this call set the flag.
    pub fn request_stop(&self) -> bool {
        let mut state = self.state.lock();
        let first = !state.stop_requested;
        state.stop_requested = true;
        first
    }

    pub fn is_playing(&self) -> bool {
        let state = self.state.lock();
        !state.stop_requested && state.playback != PlaybackState::Stopped && state.voice_playing
    }

    pub fn state(&self) -> PlaybackState {
        self.state.lock().playback
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.state.lock().stop_reason
    }

    pub fn stats(&self) -> StreamStats {
        self.state.lock().stats
    }

    /// Blocks until the session is stopped or `timeout` elapses.
    ///
    /// Returns `true` if the session is stopped.
    pub fn wait_stopped(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.playback != PlaybackState::Stopped {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return state.playback == PlaybackState::Stopped;
            }
        }
        true
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        let _state = self.state.lock();
        self.state_tx.subscribe()
    }

    // Worker side

    pub fn poll(&self) -> Requests {
        let mut state = self.state.lock();
        let gain = if state.gain_dirty {
            state.gain_dirty = false;
            Some(state.gain)
        } else {
            None
        };
        Requests {
            stop: state.stop_requested,
            pause: state.pause_requested,
            gain,
        }
    }

    /// Takes the current gain and clears any pending change.
    pub fn take_gain(&self) -> f32 {
        let mut state = self.state.lock();
        state.gain_dirty = false;
        state.gain
    }

    /// Moves to `next`, returning the previous state.
    pub fn transition(&self, next: PlaybackState) -> PlaybackState {
        let mut state = self.state.lock();
        let previous = state.playback;
        state.playback = next;
        self.state_tx.send_replace(next);
        self.changed.notify_all();
        previous
    }

    pub fn set_voice_playing(&self, playing: bool) {
        self.state.lock().voice_playing = playing;
    }

    pub fn update_stats(&self, update: impl FnOnce(&mut StreamStats)) {
        update(&mut self.state.lock().stats);
    }

    /// Enters the terminal state, returning the previous state.
    pub fn finish(&self, reason: StopReason) -> PlaybackState {
        let mut state = self.state.lock();
        let previous = state.playback;
        state.playback = PlaybackState::Stopped;
        state.voice_playing = false;
        state.stop_reason = Some(reason);
        self.state_tx.send_replace(PlaybackState::Stopped);
        self.changed.notify_all();
        previous
    }
}
