//! The per-session worker loop.

use std::io::{Read, Seek};
use std::sync::Arc;
use std::time::Duration;

use super::control::{ControlBlock, Requests};
use super::ring::BufferRing;
use super::{PlaybackState, StopReason};
use crate::backend::{AudioBackend, VoiceId, VoiceSpec};
use crate::container::FormatDescriptor;
use crate::reader::ChunkedReader;
use crate::{BackendError, EventCallback, StreamConfig, StreamEvent, StreamWavError};

/// A failed backend call and the operation it belonged to.
#[derive(Debug)]
struct Fault {
    operation: &'static str,
    error: BackendError,
}

trait During<T> {
    fn during(self, operation: &'static str) -> Result<T, Fault>;
}

impl<T> During<T> for Result<T, BackendError> {
    fn during(self, operation: &'static str) -> Result<T, Fault> {
        self.map_err(|error| Fault { operation, error })
    }
}

/// Outcome of one refill attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fill {
    /// A buffer was uploaded and queued.
    Submitted,
    /// The payload had nothing left.
    Empty,
    /// The read failed; the slot stays free.
    Failed,
}

/// What the loop does after a step.
enum Step {
    Continue,
    Done,
}

/// Owns the Playback Session: voice, buffer ring, and reader.
///
/// Only the worker thread touches the backend. The [`ControlBlock`] is the
/// single point of contact with handles.
pub(crate) struct Worker<R, B> {
    backend: B,
    voice: VoiceId,
    ring: BufferRing,
    reader: ChunkedReader<R>,
    format: FormatDescriptor,
    control: Arc<ControlBlock>,
    on_event: Option<EventCallback>,
    poll_interval: Duration,
    playback: PlaybackState,
    source_failed: bool,
}

impl<R, B> Worker<R, B>
where
    R: Read + Seek,
    B: AudioBackend,
{
    /// Allocates the voice and ring, queues the first N buffers, and starts
    /// the voice.
    ///
    /// On error every resource allocated so far has been released.
    pub fn prime(
        mut backend: B,
        reader: ChunkedReader<R>,
        config: &StreamConfig,
        control: Arc<ControlBlock>,
        on_event: Option<EventCallback>,
    ) -> Result<Self, StreamWavError> {
        let format = *reader.format();
        let buffer_bytes = config.buffer_bytes(&format)?;
        let frames_per_buffer = buffer_bytes / usize::from(format.block_align().max(1));
        let spec = VoiceSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            max_queued_frames: frames_per_buffer.saturating_mul(config.buffer_count),
        };

        let voice = backend.create_voice(&spec)?;
        let ring = match BufferRing::allocate(&mut backend, config.buffer_count, buffer_bytes) {
            Ok(ring) => ring,
            Err(e) => {
                if let Err(release) = backend.release_voice(voice) {
                    tracing::warn!(error = %release, "Failed to release voice");
                }
                return Err(e.into());
            }
        };

        let mut worker = Self {
            backend,
            voice,
            ring,
            reader,
            format,
            control,
            on_event,
            poll_interval: config.poll_interval,
            playback: PlaybackState::Priming,
            source_failed: false,
        };

        if let Err(fault) = worker.fill_ring() {
            worker.release_resources();
            return Err(fault.error.into());
        }

        tracing::debug!(
            buffers = worker.ring.len(),
            buffer_bytes,
            queued = worker.ring.in_flight(),
            "Ring primed"
        );
        Ok(worker)
    }

    /// Fills every slot in order, then applies the gain and starts the voice.
    fn fill_ring(&mut self) -> Result<(), Fault> {
        for slot in 0..self.ring.len() {
            if !matches!(self.fill_slot(slot)?, Fill::Submitted) {
                break;
            }
        }

        let gain = self.control.take_gain();
        self.backend.set_gain(self.voice, gain).during("set_gain")?;
        self.backend.play(self.voice).during("play")?;
        self.publish_voice_state()
    }

    /// Runs until the session stops, then releases everything.
    pub fn run(mut self) {
        self.enter(PlaybackState::Playing);

        let reason = loop {
            let requests = self.control.poll();
            if requests.stop {
                break StopReason::Requested;
            }

            match self.step(requests) {
                Ok(Step::Continue) => {}
                Ok(Step::Done) if self.source_failed => break StopReason::ReadError,
                Ok(Step::Done) => break StopReason::Finished,
                Err(fault) => {
                    tracing::error!(
                        operation = fault.operation,
                        error = %fault.error,
                        "Backend call failed, stopping"
                    );
                    self.emit(StreamEvent::BackendFault {
                        operation: fault.operation,
                        error: fault.error.to_string(),
                    });
                    break StopReason::BackendError;
                }
            }

            std::thread::sleep(self.poll_interval);
        };

        self.finish(reason);
    }

    fn step(&mut self, requests: Requests) -> Result<Step, Fault> {
        if let Some(gain) = requests.gain {
            self.backend.set_gain(self.voice, gain).during("set_gain")?;
            tracing::debug!(gain, "Gain applied");
        }

        let step = match self.playback {
            PlaybackState::Playing => self.step_playing(requests.pause)?,
            PlaybackState::Paused => self.step_paused(requests.pause)?,
            PlaybackState::Draining => self.step_draining(requests.pause)?,
            PlaybackState::Priming | PlaybackState::Stopped => Step::Done,
        };

        self.publish_voice_state()?;
        Ok(step)
    }

    fn step_playing(&mut self, pause: bool) -> Result<Step, Fault> {
        if pause {
            self.pause_voice()?;
            return Ok(Step::Continue);
        }

        let processed = self
            .backend
            .processed_count(self.voice)
            .during("processed_count")?;
        for _ in 0..processed {
            let slot = self.retire_one()?;
            if !self.source_done() {
                self.fill_slot(slot)?;
            }
        }

        if self.source_done() {
            self.enter(PlaybackState::Draining);
        } else {
            self.recover_underrun()?;
        }
        Ok(Step::Continue)
    }

    fn step_paused(&mut self, pause: bool) -> Result<Step, Fault> {
        if pause {
            return Ok(Step::Continue);
        }

        self.backend.play(self.voice).during("play")?;
        if self.source_done() {
            self.enter(PlaybackState::Draining);
        } else {
            self.enter(PlaybackState::Playing);
        }
        Ok(Step::Continue)
    }

    fn step_draining(&mut self, pause: bool) -> Result<Step, Fault> {
        if pause {
            self.pause_voice()?;
            return Ok(Step::Continue);
        }

        let processed = self
            .backend
            .processed_count(self.voice)
            .during("processed_count")?;
        for _ in 0..processed {
            self.retire_one()?;
        }

        if self.ring.is_idle() {
            return Ok(Step::Done);
        }
        self.recover_underrun()?;
        Ok(Step::Continue)
    }

    fn pause_voice(&mut self) -> Result<(), Fault> {
        if self.backend.is_playing(self.voice).during("is_playing")? {
            self.backend.pause(self.voice).during("pause")?;
        }
        self.enter(PlaybackState::Paused);
        Ok(())
    }

    fn retire_one(&mut self) -> Result<usize, Fault> {
        let buffer = self
            .backend
            .dequeue_processed(self.voice)
            .during("dequeue_processed")?;
        self.ring.retire(buffer).during("dequeue_processed")
    }

    /// Restarts a voice that played out its queue while buffers remain.
    fn recover_underrun(&mut self) -> Result<(), Fault> {
        if self.ring.is_idle() || self.backend.is_playing(self.voice).during("is_playing")? {
            return Ok(());
        }

        tracing::warn!(
            queued = self.ring.in_flight(),
            poll_ms = self.poll_interval.as_millis() as u64,
            "Voice ran dry with buffers queued, restarting"
        );
        self.backend.play(self.voice).during("play")?;
        let recovered = self.backend.is_playing(self.voice).during("is_playing")?;
        self.control.update_stats(|s| s.underruns += 1);
        self.emit(StreamEvent::Underrun { recovered });
        Ok(())
    }

    /// Reads the next piece of payload into `slot` and queues it.
    fn fill_slot(&mut self, slot: usize) -> Result<Fill, Fault> {
        self.control.update_stats(|s| s.fills += 1);
        let loops_before = self.reader.loops_completed();

        let bytes = match self.reader.read(self.ring.scratch_mut()) {
            Ok(0) => return Ok(Fill::Empty),
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    position = self.reader.position(),
                    "Payload read failed, draining"
                );
                self.source_failed = true;
                self.emit(StreamEvent::ReadFailed {
                    error: e.to_string(),
                });
                return Ok(Fill::Failed);
            }
        };

        let buffer = self.ring.buffer(slot);
        self.backend
            .upload(
                buffer,
                self.format.is_stereo(),
                &self.ring.scratch()[..bytes],
                self.format.sample_rate,
            )
            .during("upload")?;
        self.backend.enqueue(self.voice, buffer).during("enqueue")?;
        self.ring.submitted(slot);

        let loops = self.reader.loops_completed();
        let in_flight = self.ring.in_flight();
        self.control.update_stats(|s| {
            s.buffers_submitted += 1;
            s.bytes_streamed += bytes as u64;
            s.loops_completed = loops;
            s.max_in_flight = s.max_in_flight.max(in_flight);
        });
        tracing::trace!(slot, bytes, in_flight, "Buffer queued");

        if loops > loops_before {
            tracing::debug!(passes = loops, "Payload wrapped");
            self.emit(StreamEvent::Looped { passes: loops });
        }
        Ok(Fill::Submitted)
    }

    fn source_done(&self) -> bool {
        self.source_failed || self.reader.is_exhausted()
    }

    fn publish_voice_state(&mut self) -> Result<(), Fault> {
        let playing = self.backend.is_playing(self.voice).during("is_playing")?;
        self.control.set_voice_playing(playing);
        Ok(())
    }

    fn enter(&mut self, next: PlaybackState) {
        if self.playback == next {
            return;
        }
        self.playback = next;
        let previous = self.control.transition(next);
        tracing::debug!(?previous, current = ?next, "State changed");
        self.emit(StreamEvent::StateChanged {
            previous,
            current: next,
        });
    }

    fn emit(&self, event: StreamEvent) {
        if let Some(callback) = &self.on_event {
            callback(event);
        }
    }

    /// Stops the voice and releases the ring and the voice.
    fn release_resources(&mut self) {
        if let Err(e) = self.backend.stop(self.voice) {
            tracing::warn!(error = %e, "Failed to stop voice");
        }

        // Detach everything the stop marked processed
        for _ in 0..self.ring.len() {
            match self.backend.processed_count(self.voice) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if let Err(e) = self.backend.dequeue_processed(self.voice) {
                        tracing::warn!(error = %e, "Failed to dequeue buffer");
                        break;
                    }
                }
            }
        }

        self.ring.release_all(&mut self.backend);
        if let Err(e) = self.backend.release_voice(self.voice) {
            tracing::warn!(error = %e, "Failed to release voice");
        }
    }

    fn finish(mut self, reason: StopReason) {
        self.release_resources();

        let previous = self.control.finish(reason);
        self.playback = PlaybackState::Stopped;
        let stats = self.control.stats();
        tracing::info!(
            ?reason,
            buffers = stats.buffers_submitted,
            bytes = stats.bytes_streamed,
            loops = stats.loops_completed,
            underruns = stats.underruns,
            "Stream stopped"
        );

        self.emit(StreamEvent::StateChanged {
            previous,
            current: PlaybackState::Stopped,
        });
        self.emit(StreamEvent::Finished { reason });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Completion, MockBackend, MockProbe};
    use crate::container::write_header;
    use parking_lot::Mutex;
    use std::io::Cursor;

    fn reader(payload: &[u8], looping: bool) -> ChunkedReader<Cursor<Vec<u8>>> {
        let mut bytes = Vec::new();
        write_header(
            &mut bytes,
            &FormatDescriptor::pcm16(1, 8000, payload.len() as u64),
        )
        .unwrap();
        bytes.extend_from_slice(payload);
        let mut reader = ChunkedReader::open(Cursor::new(bytes)).unwrap();
        reader.set_looping(looping);
        reader
    }

    /// 10ms buffers of 80 mono frames = 160 bytes.
    fn config() -> StreamConfig {
        StreamConfig {
            buffer_duration: Duration::from_millis(10),
            poll_interval: Duration::from_millis(1),
            ..Default::default()
        }
    }

    fn recorder() -> (EventCallback, Arc<Mutex<Vec<StreamEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let callback: EventCallback = Arc::new(move |event| sink.lock().push(event));
        (callback, events)
    }

    fn primed(
        payload: &[u8],
        looping: bool,
        completion: Completion,
    ) -> (
        Worker<Cursor<Vec<u8>>, MockBackend>,
        MockProbe,
        Arc<ControlBlock>,
        Arc<Mutex<Vec<StreamEvent>>>,
    ) {
        let (backend, probe) = MockBackend::new(completion);
        let control = Arc::new(ControlBlock::new(1.0));
        let (callback, events) = recorder();
        let worker = Worker::prime(
            backend,
            reader(payload, looping),
            &config(),
            Arc::clone(&control),
            Some(callback),
        )
        .unwrap();
        (worker, probe, control, events)
    }

    #[test]
    fn test_prime_queues_every_slot() {
        let payload: Vec<u8> = (0..=255).cycle().take(1000).collect();
        let (worker, probe, control, _events) = primed(&payload, false, Completion::Manual);

        assert_eq!(worker.ring.in_flight(), 2);
        assert_eq!(probe.uploads().len(), 2);
        assert_eq!(probe.uploaded_bytes(), payload[..320].to_vec());
        assert_eq!(probe.gains(), vec![1.0]);
        assert_eq!(probe.play_calls(), 1);
        assert!(control.is_playing());
    }

    #[test]
    fn test_prime_short_payload_stops_filling() {
        let (worker, probe, control, _events) = primed(&[1, 2, 3, 4], false, Completion::Manual);

        assert_eq!(worker.ring.in_flight(), 1);
        assert_eq!(probe.uploads().len(), 1);
        let stats = control.stats();
        assert_eq!(stats.fills, 2);
        assert_eq!(stats.buffers_submitted, 1);
    }

    #[test]
    fn test_run_plays_payload_once() {
        let payload: Vec<u8> = (0..=255).cycle().take(1000).collect();
        let (worker, probe, control, events) = primed(&payload, false, Completion::Immediate);
        worker.run();

        assert_eq!(probe.played_bytes(), payload);
        assert_eq!(control.state(), PlaybackState::Stopped);
        assert_eq!(control.stop_reason(), Some(StopReason::Finished));
        assert_eq!(probe.live_buffers(), 0);
        assert_eq!(probe.live_voices(), 0);
        assert!(probe.violations().is_empty());

        let events = events.lock();
        assert_eq!(
            events.last(),
            Some(&StreamEvent::Finished {
                reason: StopReason::Finished
            })
        );
        assert!(events.contains(&StreamEvent::StateChanged {
            previous: PlaybackState::Playing,
            current: PlaybackState::Draining,
        }));
    }

    #[test]
    fn test_stop_before_run_releases_everything() {
        let (worker, probe, control, _events) = primed(&[0; 1000], true, Completion::Manual);
        control.request_stop();
        worker.run();

        assert_eq!(control.stop_reason(), Some(StopReason::Requested));
        assert_eq!(probe.stop_calls(), 1);
        assert_eq!(probe.live_buffers(), 0);
        assert_eq!(probe.live_voices(), 0);
        assert!(probe.violations().is_empty());
    }

    #[test]
    fn test_gain_change_applied_on_next_step() {
        let (mut worker, probe, control, _events) = primed(&[0; 1000], true, Completion::Manual);
        worker.enter(PlaybackState::Playing);
        control.set_gain(0.25);

        let requests = control.poll();
        assert!(matches!(worker.step(requests), Ok(Step::Continue)));
        assert_eq!(probe.voice_gain(), Some(0.25));
    }

    #[test]
    fn test_underrun_restarts_voice() {
        let (mut worker, probe, control, events) = primed(&[0; 1000], true, Completion::Manual);
        worker.enter(PlaybackState::Playing);

        // Everything plays out before the worker looks
        probe.starve();
        let requests = control.poll();
        worker.step(requests).unwrap();

        // Both slots were refilled; the voice was restarted once
        assert_eq!(control.stats().underruns, 1);
        assert!(events
            .lock()
            .contains(&StreamEvent::Underrun { recovered: true }));
        assert!(probe.max_in_flight() <= 2);
    }

    #[test]
    fn test_out_of_order_completion_is_a_fault() {
        let (mut worker, _probe, _control, _events) = primed(&[0; 1000], false, Completion::Manual);
        let second = worker.ring.buffer(1);
        let fault = worker.ring.retire(second).during("dequeue_processed").unwrap_err();
        assert!(matches!(fault.error, BackendError::OutOfOrder { .. }));
    }
}
