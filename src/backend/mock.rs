//! Mock audio backend for testing without hardware.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{AudioBackend, BufferId, VoiceId, VoiceSpec};
use crate::BackendError;

/// When queued buffers count as finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Completion {
    /// Every `processed_count` query on a playing voice finishes its oldest
    /// queued buffer. Sessions run as fast as the worker polls.
    #[default]
    Immediate,
    /// Buffers finish only when the test calls [`MockProbe::complete`].
    Manual,
}

/// Transport state of a mock voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceStatus {
    /// Created, never played.
    Initial,
    /// Playing queued audio.
    Playing,
    /// Paused with the queue intact.
    Paused,
    /// Stopped explicitly or ran out of queued audio.
    Stopped,
}

/// One recorded `upload` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    /// Target buffer.
    pub buffer: BufferId,
    /// Whether the PCM was declared stereo.
    pub stereo: bool,
    /// Declared sample rate.
    pub sample_rate: u32,
    /// The uploaded bytes.
    pub bytes: Vec<u8>,
}

struct MockBuffer {
    data: Vec<u8>,
    /// Attached to a voice queue (pending or processed but not dequeued).
    attached: bool,
}

struct MockVoice {
    pending: VecDeque<BufferId>,
    processed: VecDeque<BufferId>,
    status: VoiceStatus,
    gain: f32,
}

#[derive(Default)]
struct MockState {
    completion: Completion,
    next_id: u32,
    voices: HashMap<VoiceId, MockVoice>,
    buffers: HashMap<BufferId, MockBuffer>,
    uploads: Vec<Upload>,
    played: Vec<u8>,
    max_in_flight: usize,
    violations: Vec<String>,
    fail_voice: bool,
    buffer_limit: Option<usize>,
    gains: Vec<f32>,
    play_calls: usize,
    pause_calls: usize,
    stop_calls: usize,
}

impl MockState {
    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn voice(&mut self, voice: VoiceId) -> Result<&mut MockVoice, BackendError> {
        self.voices.get_mut(&voice).ok_or(BackendError::UnknownVoice)
    }

    fn attached(&self, buffer: BufferId) -> Result<bool, BackendError> {
        self.buffers
            .get(&buffer)
            .map(|b| b.attached)
            .ok_or(BackendError::UnknownBuffer(buffer))
    }

    fn violation(&mut self, message: String) {
        tracing::error!("mock backend protocol violation: {}", message);
        self.violations.push(message);
    }

    /// Finishes the oldest pending buffer of a playing voice.
    fn finish_one(&mut self, voice: VoiceId) -> bool {
        let Some(v) = self.voices.get_mut(&voice) else {
            return false;
        };
        if v.status != VoiceStatus::Playing {
            return false;
        }
        let Some(buffer) = v.pending.pop_front() else {
            v.status = VoiceStatus::Stopped;
            return false;
        };
        v.processed.push_back(buffer);
        if v.pending.is_empty() {
            // Out of queued audio
            v.status = VoiceStatus::Stopped;
        }
        if let Some(b) = self.buffers.get(&buffer) {
            self.played.extend_from_slice(&b.data);
        }
        true
    }
}

/// A deterministic in-memory [`AudioBackend`].
///
/// Records every upload and the bytes that "played", enforces the queue
/// contract (uploading to or releasing a queued buffer is a recorded
/// violation), and can inject allocation failures. Inspect it through the
/// [`MockProbe`] returned alongside it; the backend itself moves into the
/// worker thread.
///
/// # Example
///
/// ```
/// use stream_wav::backend::{AudioBackend, Completion, MockBackend, VoiceSpec};
///
/// let (mut backend, probe) = MockBackend::new(Completion::Manual);
/// let spec = VoiceSpec { channels: 1, sample_rate: 8000, max_queued_frames: 16 };
/// let voice = backend.create_voice(&spec).unwrap();
/// let buffer = backend.create_buffer().unwrap();
///
/// backend.upload(buffer, false, &[1, 0, 2, 0], 8000).unwrap();
/// backend.enqueue(voice, buffer).unwrap();
/// backend.play(voice).unwrap();
///
/// assert_eq!(probe.complete(1), 1);
/// assert_eq!(backend.processed_count(voice).unwrap(), 1);
/// assert_eq!(probe.played_bytes(), vec![1, 0, 2, 0]);
/// ```
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

/// Test-side view of a [`MockBackend`].
#[derive(Clone)]
pub struct MockProbe {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    /// Creates a backend and a probe onto its state.
    pub fn new(completion: Completion) -> (Self, MockProbe) {
        let state = Arc::new(Mutex::new(MockState {
            completion,
            ..MockState::default()
        }));
        (
            Self {
                state: Arc::clone(&state),
            },
            MockProbe { state },
        )
    }

    /// Returns another probe onto this backend.
    pub fn probe(&self) -> MockProbe {
        MockProbe {
            state: Arc::clone(&self.state),
        }
    }
}

impl AudioBackend for MockBackend {
    fn create_voice(&mut self, _spec: &VoiceSpec) -> Result<VoiceId, BackendError> {
        let mut state = self.state.lock();
        if state.fail_voice {
            return Err(BackendError::allocation("mock voice allocation disabled"));
        }
        let id = VoiceId(state.next_id());
        state.voices.insert(
            id,
            MockVoice {
                pending: VecDeque::new(),
                processed: VecDeque::new(),
                status: VoiceStatus::Initial,
                gain: 1.0,
            },
        );
        Ok(id)
    }

    fn release_voice(&mut self, voice: VoiceId) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        let v = state.voices.remove(&voice).ok_or(BackendError::UnknownVoice)?;
        for buffer in v.pending.iter().chain(v.processed.iter()) {
            if let Some(b) = state.buffers.get_mut(buffer) {
                b.attached = false;
            }
        }
        Ok(())
    }

    fn create_buffer(&mut self) -> Result<BufferId, BackendError> {
        let mut state = self.state.lock();
        if let Some(limit) = state.buffer_limit {
            if state.buffers.len() >= limit {
                return Err(BackendError::allocation(format!(
                    "mock buffer limit of {limit} reached"
                )));
            }
        }
        let id = BufferId(state.next_id());
        state.buffers.insert(
            id,
            MockBuffer {
                data: Vec::new(),
                attached: false,
            },
        );
        Ok(id)
    }

    fn release_buffer(&mut self, buffer: BufferId) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        let attached = state.attached(buffer)?;
        if attached {
            state.violation(format!("released queued buffer {buffer:?}"));
            return Err(BackendError::BufferInFlight(buffer));
        }
        state.buffers.remove(&buffer);
        Ok(())
    }

    fn upload(
        &mut self,
        buffer: BufferId,
        stereo: bool,
        pcm: &[u8],
        sample_rate: u32,
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        if state.attached(buffer)? {
            state.violation(format!("uploaded into queued buffer {buffer:?}"));
            return Err(BackendError::BufferInFlight(buffer));
        }
        if let Some(b) = state.buffers.get_mut(&buffer) {
            b.data.clear();
            b.data.extend_from_slice(pcm);
        }
        state.uploads.push(Upload {
            buffer,
            stereo,
            sample_rate,
            bytes: pcm.to_vec(),
        });
        Ok(())
    }

    fn enqueue(&mut self, voice: VoiceId, buffer: BufferId) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        if !state.voices.contains_key(&voice) {
            return Err(BackendError::UnknownVoice);
        }
        if state.attached(buffer)? {
            state.violation(format!("queued buffer {buffer:?} twice"));
            return Err(BackendError::BufferInFlight(buffer));
        }
        if let Some(b) = state.buffers.get_mut(&buffer) {
            b.attached = true;
        }
        let v = state.voice(voice)?;
        v.pending.push_back(buffer);
        let in_flight = v.pending.len();
        state.max_in_flight = state.max_in_flight.max(in_flight);
        Ok(())
    }

    fn processed_count(&mut self, voice: VoiceId) -> Result<usize, BackendError> {
        let mut state = self.state.lock();
        state.voice(voice)?;
        if state.completion == Completion::Immediate {
            state.finish_one(voice);
        }
        Ok(state.voice(voice)?.processed.len())
    }

    fn dequeue_processed(&mut self, voice: VoiceId) -> Result<BufferId, BackendError> {
        let mut state = self.state.lock();
        let buffer = state
            .voice(voice)?
            .processed
            .pop_front()
            .ok_or(BackendError::NothingProcessed)?;
        if let Some(b) = state.buffers.get_mut(&buffer) {
            b.attached = false;
        }
        Ok(buffer)
    }

    fn play(&mut self, voice: VoiceId) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.play_calls += 1;
        state.voice(voice)?.status = VoiceStatus::Playing;
        Ok(())
    }

    fn stop(&mut self, voice: VoiceId) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.stop_calls += 1;
        let v = state.voice(voice)?;
        v.status = VoiceStatus::Stopped;
        let pending: Vec<BufferId> = v.pending.drain(..).collect();
        v.processed.extend(pending);
        Ok(())
    }

    fn pause(&mut self, voice: VoiceId) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.pause_calls += 1;
        let v = state.voice(voice)?;
        if v.status == VoiceStatus::Playing {
            v.status = VoiceStatus::Paused;
        }
        Ok(())
    }

    fn set_gain(&mut self, voice: VoiceId, gain: f32) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.voice(voice)?.gain = gain;
        state.gains.push(gain);
        Ok(())
    }

    fn is_playing(&mut self, voice: VoiceId) -> Result<bool, BackendError> {
        let mut state = self.state.lock();
        Ok(state.voice(voice)?.status == VoiceStatus::Playing)
    }
}

impl MockProbe {
    /// Finishes up to `count` pending buffers on playing voices, oldest first.
    ///
    /// Returns how many finished.
    pub fn complete(&self, count: usize) -> usize {
        let mut state = self.state.lock();
        let mut voices: Vec<VoiceId> = state.voices.keys().copied().collect();
        voices.sort();

        let mut finished = 0;
        for voice in voices {
            while finished < count && state.finish_one(voice) {
                finished += 1;
            }
        }
        finished
    }

    /// Every upload, in call order.
    pub fn uploads(&self) -> Vec<Upload> {
        self.state.lock().uploads.clone()
    }

    /// All uploaded bytes concatenated in call order.
    pub fn uploaded_bytes(&self) -> Vec<u8> {
        self.state
            .lock()
            .uploads
            .iter()
            .flat_map(|u| u.bytes.iter().copied())
            .collect()
    }

    /// Bytes of every buffer that finished playing, in playback order.
    pub fn played_bytes(&self) -> Vec<u8> {
        self.state.lock().played.clone()
    }

    /// Largest number of buffers ever pending on one voice.
    pub fn max_in_flight(&self) -> usize {
        self.state.lock().max_in_flight
    }

    /// Buffers currently pending across all voices.
    pub fn pending(&self) -> usize {
        self.state
            .lock()
            .voices
            .values()
            .map(|v| v.pending.len())
            .sum()
    }

    /// Queue contract violations observed so far.
    pub fn violations(&self) -> Vec<String> {
        self.state.lock().violations.clone()
    }

    /// Number of voices not yet released.
    pub fn live_voices(&self) -> usize {
        self.state.lock().voices.len()
    }

    /// Number of buffers not yet released.
    pub fn live_buffers(&self) -> usize {
        self.state.lock().buffers.len()
    }

    /// Status of the first live voice, if any.
    pub fn voice_status(&self) -> Option<VoiceStatus> {
        let state = self.state.lock();
        state
            .voices
            .iter()
            .min_by_key(|(id, _)| **id)
            .map(|(_, v)| v.status)
    }

    /// Current gain of the first live voice, if any.
    pub fn voice_gain(&self) -> Option<f32> {
        let state = self.state.lock();
        state
            .voices
            .iter()
            .min_by_key(|(id, _)| **id)
            .map(|(_, v)| v.gain)
    }

    /// Every gain value set, in call order.
    pub fn gains(&self) -> Vec<f32> {
        self.state.lock().gains.clone()
    }

    /// Number of `play` calls.
    pub fn play_calls(&self) -> usize {
        self.state.lock().play_calls
    }

    /// Number of `pause` calls.
    pub fn pause_calls(&self) -> usize {
        self.state.lock().pause_calls
    }

    /// Number of `stop` calls.
    pub fn stop_calls(&self) -> usize {
        self.state.lock().stop_calls
    }

    /// Makes every later `create_voice` fail.
    pub fn fail_voice_allocation(&self) {
        self.state.lock().fail_voice = true;
    }

    /// Makes `create_buffer` fail once `limit` buffers are live.
    pub fn limit_buffers(&self, limit: usize) {
        self.state.lock().buffer_limit = Some(limit);
    }

    /// Simulates the device draining its queue early, as after a long stall.
    ///
    /// Every pending buffer finishes and playing voices stop.
    pub fn starve(&self) {
        let mut state = self.state.lock();
        let mut voices: Vec<VoiceId> = state.voices.keys().copied().collect();
        voices.sort();
        for voice in voices {
            while state.finish_one(voice) {}
        }
    }
}
