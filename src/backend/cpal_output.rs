//! CPAL output backend.
//!
//! Each voice owns one output stream fed from a lock-free ring buffer.
//! Queued buffers are converted to the device layout and pushed into the
//! ring on `enqueue`; a buffer counts as processed once the device callback
//! has consumed every sample pushed for it.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SampleRate, SizedSample, Stream};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use super::{AudioBackend, BufferId, VoiceId, VoiceSpec};
use crate::format::{i16_to_f32, map_channels, pcm_bytes_to_i16, Resampler};
use crate::BackendError;

/// Extra device frames of ring capacity beyond the largest queued amount.
const RING_SLACK_FRAMES: usize = 4096;

/// Samples the output callback converts per pass.
const CALLBACK_SCRATCH: usize = 4096;

/// State shared between a voice and its device callback.
struct VoiceShared {
    /// Samples taken out of the ring by the callback, including flushed ones.
    consumed: AtomicU64,
    playing: AtomicBool,
    /// Linear gain as `f32` bits.
    gain: AtomicU32,
    /// The callback discards samples until `consumed` reaches this.
    flush_until: AtomicU64,
}

struct StagedBuffer {
    samples: Vec<i16>,
    stereo: bool,
    sample_rate: u32,
    attached: bool,
}

struct CpalVoice {
    _stream: Stream,
    producer: HeapProd<i16>,
    shared: Arc<VoiceShared>,
    device_channels: u16,
    device_rate: u32,
    /// Samples pushed into the ring so far.
    pushed: u64,
    /// Queued buffers with the `pushed` total at their last sample.
    pending: VecDeque<(BufferId, u64)>,
    processed: VecDeque<BufferId>,
    /// Carries interpolation state from one queued buffer to the next.
    resampler: Option<Resampler>,
}

impl CpalVoice {
    fn collect_processed(&mut self) {
        let consumed = self.shared.consumed.load(Ordering::Acquire);
        while let Some(&(buffer, end)) = self.pending.front() {
            if end > consumed {
                break;
            }
            self.pending.pop_front();
            self.processed.push_back(buffer);
        }
    }
}

/// Plays voices through a CPAL output device.
///
/// Holds CPAL streams, so it is not `Send`: construct it on the thread that
/// will drive it (the builder's `start`/`open` do this for you).
#[must_use]
pub struct CpalBackend {
    device: Device,
    next_id: u32,
    voices: HashMap<VoiceId, CpalVoice>,
    buffers: HashMap<BufferId, StagedBuffer>,
}

impl CpalBackend {
    /// Opens the default output device.
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` if no default output device is configured.
    pub fn default_output() -> Result<Self, BackendError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(BackendError::DeviceUnavailable)?;
        Ok(Self::with_device(device))
    }

    /// Opens a specific output device by name.
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` if no device with the given name exists.
    pub fn open_by_name(name: &str) -> Result<Self, BackendError> {
        let host = cpal::default_host();
        let devices = host.output_devices().map_err(BackendError::stream)?;

        for device in devices {
            if let Ok(device_name) = device.name() {
                if device_name == name {
                    return Ok(Self::with_device(device));
                }
            }
        }

        Err(BackendError::DeviceUnavailable)
    }

    /// Wraps an already selected device.
    pub fn with_device(device: Device) -> Self {
        Self {
            device,
            next_id: 0,
            voices: HashMap::new(),
            buffers: HashMap::new(),
        }
    }

    /// Returns the device name.
    pub fn name(&self) -> String {
        self.device.name().unwrap_or_else(|_| "unknown".to_string())
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn voice(&mut self, voice: VoiceId) -> Result<&mut CpalVoice, BackendError> {
        self.voices.get_mut(&voice).ok_or(BackendError::UnknownVoice)
    }

    fn staged(&mut self, buffer: BufferId) -> Result<&mut StagedBuffer, BackendError> {
        self.buffers
            .get_mut(&buffer)
            .ok_or(BackendError::UnknownBuffer(buffer))
    }
}

/// Picks a device configuration, preferring the stream's own layout.
fn output_config(
    device: &Device,
    spec: &VoiceSpec,
) -> Result<cpal::SupportedStreamConfig, BackendError> {
    let wanted = SampleRate(spec.sample_rate);
    if let Ok(ranges) = device.supported_output_configs() {
        for range in ranges {
            let usable = matches!(
                range.sample_format(),
                SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16
            );
            if usable
                && range.channels() == spec.channels
                && range.min_sample_rate() <= wanted
                && wanted <= range.max_sample_rate()
            {
                return Ok(range.with_sample_rate(wanted));
            }
        }
    }

    device
        .default_output_config()
        .map_err(BackendError::stream)
}

/// Fills one device period from the ring.
///
/// Works through `data` in `scratch`-sized slices, so the callback never
/// allocates whatever period size the device asks for.
fn render<T, C>(data: &mut [T], consumer: &mut C, scratch: &mut [i16], shared: &VoiceShared)
where
    T: SizedSample + FromSample<f32>,
    C: Consumer<Item = i16>,
{
    let flush_until = shared.flush_until.load(Ordering::Acquire);
    let consumed = shared.consumed.load(Ordering::Acquire);
    if consumed < flush_until {
        let wanted = usize::try_from(flush_until - consumed).unwrap_or(usize::MAX);
        let skipped = consumer.skip(wanted);
        shared.consumed.fetch_add(skipped as u64, Ordering::AcqRel);
    }

    if !shared.playing.load(Ordering::Acquire) || scratch.is_empty() {
        data.fill(T::EQUILIBRIUM);
        return;
    }

    let gain = f32::from_bits(shared.gain.load(Ordering::Relaxed));
    let mut total = 0usize;
    for chunk in data.chunks_mut(scratch.len()) {
        let popped = consumer.pop_slice(&mut scratch[..chunk.len()]);
        for (out, &sample) in chunk.iter_mut().zip(&scratch[..popped]) {
            *out = T::from_sample(i16_to_f32(sample) * gain);
        }
        chunk[popped..].fill(T::EQUILIBRIUM);
        total += popped;
    }
    shared.consumed.fetch_add(total as u64, Ordering::AcqRel);
}

fn build_stream<T>(
    device: &Device,
    config: &cpal::StreamConfig,
    mut consumer: HeapCons<i16>,
    shared: Arc<VoiceShared>,
) -> Result<Stream, BackendError>
where
    T: SizedSample + FromSample<f32>,
{
    let mut scratch = vec![0i16; CALLBACK_SCRATCH];
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                render(data, &mut consumer, &mut scratch, &shared);
            },
            |err| {
                tracing::error!("Audio output stream error: {}", err);
            },
            None,
        )
        .map_err(BackendError::stream)
}

impl AudioBackend for CpalBackend {
    fn create_voice(&mut self, spec: &VoiceSpec) -> Result<VoiceId, BackendError> {
        let supported = output_config(&self.device, spec)?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let device_rate = config.sample_rate.0;
        let device_channels = config.channels;

        // Capacity in device samples for everything the worker may queue
        let source_rate = u64::from(spec.sample_rate.max(1));
        let device_frames = (spec.max_queued_frames as u64 * u64::from(device_rate))
            .div_ceil(source_rate);
        let capacity = (usize::try_from(device_frames).unwrap_or(usize::MAX / 4)
            + RING_SLACK_FRAMES)
            .saturating_mul(usize::from(device_channels));

        let (producer, consumer) = HeapRb::<i16>::new(capacity).split();
        let shared = Arc::new(VoiceShared {
            consumed: AtomicU64::new(0),
            playing: AtomicBool::new(false),
            gain: AtomicU32::new(1.0f32.to_bits()),
            flush_until: AtomicU64::new(0),
        });

        let stream = match sample_format {
            SampleFormat::F32 => {
                build_stream::<f32>(&self.device, &config, consumer, Arc::clone(&shared))?
            }
            SampleFormat::I16 => {
                build_stream::<i16>(&self.device, &config, consumer, Arc::clone(&shared))?
            }
            SampleFormat::U16 => {
                build_stream::<u16>(&self.device, &config, consumer, Arc::clone(&shared))?
            }
            format => {
                return Err(BackendError::stream(format!(
                    "unsupported device sample format {format:?}"
                )));
            }
        };
        stream.play().map_err(BackendError::stream)?;

        tracing::debug!(
            device_rate,
            device_channels,
            capacity,
            source_rate = spec.sample_rate,
            source_channels = spec.channels,
            "Output voice created"
        );

        let id = VoiceId(self.next_id());
        self.voices.insert(
            id,
            CpalVoice {
                _stream: stream,
                producer,
                shared,
                device_channels,
                device_rate,
                pushed: 0,
                pending: VecDeque::new(),
                processed: VecDeque::new(),
                resampler: None,
            },
        );
        Ok(id)
    }

    fn release_voice(&mut self, voice: VoiceId) -> Result<(), BackendError> {
        let v = self.voices.remove(&voice).ok_or(BackendError::UnknownVoice)?;
        v.shared.playing.store(false, Ordering::Release);
        let attached = v.pending.iter().map(|(b, _)| b).chain(v.processed.iter());
        for buffer in attached {
            if let Some(staged) = self.buffers.get_mut(buffer) {
                staged.attached = false;
            }
        }
        // Dropping the stream stops the device callback
        Ok(())
    }

    fn create_buffer(&mut self) -> Result<BufferId, BackendError> {
        let id = BufferId(self.next_id());
        self.buffers.insert(
            id,
            StagedBuffer {
                samples: Vec::new(),
                stereo: false,
                sample_rate: 0,
                attached: false,
            },
        );
        Ok(id)
    }

    fn release_buffer(&mut self, buffer: BufferId) -> Result<(), BackendError> {
        if self.staged(buffer)?.attached {
            return Err(BackendError::BufferInFlight(buffer));
        }
        self.buffers.remove(&buffer);
        Ok(())
    }

    fn upload(
        &mut self,
        buffer: BufferId,
        stereo: bool,
        pcm: &[u8],
        sample_rate: u32,
    ) -> Result<(), BackendError> {
        let staged = self.staged(buffer)?;
        if staged.attached {
            return Err(BackendError::BufferInFlight(buffer));
        }
        staged.samples = pcm_bytes_to_i16(pcm);
        staged.stereo = stereo;
        staged.sample_rate = sample_rate;
        Ok(())
    }

    fn enqueue(&mut self, voice: VoiceId, buffer: BufferId) -> Result<(), BackendError> {
        let staged = self
            .buffers
            .get(&buffer)
            .ok_or(BackendError::UnknownBuffer(buffer))?;
        if staged.attached {
            return Err(BackendError::BufferInFlight(buffer));
        }
        let v = self.voices.get_mut(&voice).ok_or(BackendError::UnknownVoice)?;

        let channels = if staged.stereo { 2 } else { 1 };
        let (source_rate, device_rate) = (staged.sample_rate, v.device_rate);
        let resampler = match v.resampler.take() {
            Some(r) if r.matches(channels, source_rate, device_rate) => r,
            _ => Resampler::new(channels, source_rate, device_rate),
        };
        let resampler = v.resampler.insert(resampler);
        let resampled = resampler.process(&staged.samples);
        let samples = map_channels(&resampled, channels, v.device_channels);

        if v.producer.vacant_len() < samples.len() {
            return Err(BackendError::QueueFull);
        }
        let pushed = v.producer.push_slice(&samples);
        v.pushed += pushed as u64;
        v.pending.push_back((buffer, v.pushed));

        if let Some(staged) = self.buffers.get_mut(&buffer) {
            staged.attached = true;
        }
        Ok(())
    }

    fn processed_count(&mut self, voice: VoiceId) -> Result<usize, BackendError> {
        let v = self.voice(voice)?;
        v.collect_processed();
        Ok(v.processed.len())
    }

    fn dequeue_processed(&mut self, voice: VoiceId) -> Result<BufferId, BackendError> {
        let v = self.voice(voice)?;
        v.collect_processed();
        let buffer = v
            .processed
            .pop_front()
            .ok_or(BackendError::NothingProcessed)?;
        if let Some(staged) = self.buffers.get_mut(&buffer) {
            staged.attached = false;
        }
        Ok(buffer)
    }

    fn play(&mut self, voice: VoiceId) -> Result<(), BackendError> {
        self.voice(voice)?
            .shared
            .playing
            .store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&mut self, voice: VoiceId) -> Result<(), BackendError> {
        let v = self.voice(voice)?;
        v.shared.playing.store(false, Ordering::Release);
        v.shared.flush_until.store(v.pushed, Ordering::Release);
        if let Some(resampler) = v.resampler.as_mut() {
            resampler.reset();
        }
        let pending: Vec<BufferId> = v.pending.drain(..).map(|(b, _)| b).collect();
        v.processed.extend(pending);
        Ok(())
    }

    fn pause(&mut self, voice: VoiceId) -> Result<(), BackendError> {
        self.voice(voice)?
            .shared
            .playing
            .store(false, Ordering::Release);
        Ok(())
    }

    fn set_gain(&mut self, voice: VoiceId, gain: f32) -> Result<(), BackendError> {
        self.voice(voice)?
            .shared
            .gain
            .store(gain.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    fn is_playing(&mut self, voice: VoiceId) -> Result<bool, BackendError> {
        let v = self.voice(voice)?;
        let consumed = v.shared.consumed.load(Ordering::Acquire);
        Ok(v.shared.playing.load(Ordering::Acquire) && consumed < v.pushed)
    }
}
