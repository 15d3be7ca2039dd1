//! Integration tests for stream-wav.
//!
//! Sessions run against `MockBackend`, so no audio hardware is needed.

use std::io::{Cursor, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use stream_wav::backend::{Completion, MockBackend, MockProbe};
use stream_wav::container::{write_header, FormatDescriptor};
use stream_wav::{
    BackendError, PlaybackState, StopReason, StreamEvent, StreamWavError, Streaming,
    StreamingBuilder,
};

const TIMEOUT: Duration = Duration::from_secs(10);

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn wav_bytes(channels: u16, sample_rate: u32, payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::new();
    write_header(
        &mut bytes,
        &FormatDescriptor::pcm16(channels, sample_rate, payload.len() as u64),
    )
    .unwrap();
    bytes.extend_from_slice(payload);
    bytes
}

/// 8 kHz mono with 10ms buffers: 160 bytes per buffer.
fn mono_wav(payload: &[u8]) -> Cursor<Vec<u8>> {
    Cursor::new(wav_bytes(1, 8000, payload))
}

fn fast() -> StreamingBuilder {
    Streaming::builder()
        .buffer_duration(Duration::from_millis(10))
        .poll_interval(Duration::from_millis(1))
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

type Events = Arc<Mutex<Vec<StreamEvent>>>;

fn recording(builder: StreamingBuilder) -> (StreamingBuilder, Events) {
    let events: Events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let builder = builder.on_event(move |event| sink.lock().unwrap().push(event));
    (builder, events)
}

fn assert_released(probe: &MockProbe) {
    assert_eq!(probe.live_voices(), 0, "voice not released");
    assert_eq!(probe.live_buffers(), 0, "buffers not released");
    assert!(probe.violations().is_empty(), "{:?}", probe.violations());
}

#[test]
fn test_non_looping_plays_payload_exactly_once() {
    let data = payload(5000);
    let (backend, probe) = MockBackend::new(Completion::Immediate);

    let stream = fast()
        .start_with(mono_wav(&data), move || Ok(backend))
        .unwrap();

    assert!(stream.wait_stopped(TIMEOUT));
    assert_eq!(stream.stop_reason(), Some(StopReason::Finished));
    assert_eq!(probe.played_bytes(), data);
    assert_eq!(stream.stats().bytes_streamed, 5000);
    assert!(!stream.is_playing());
    assert_released(&probe);
}

#[test]
fn test_looping_wraps_to_payload_start() {
    let data = payload(300);
    let (backend, probe) = MockBackend::new(Completion::Immediate);
    let (builder, events) = recording(fast().looping(true));

    let stream = builder
        .start_with(mono_wav(&data), move || Ok(backend))
        .unwrap();

    assert!(wait_until(TIMEOUT, || stream.stats().loops_completed >= 3));
    stream.request_stop();
    assert!(stream.wait_stopped(TIMEOUT));
    assert_eq!(stream.stop_reason(), Some(StopReason::Requested));

    let played = probe.played_bytes();
    assert!(played.len() > data.len());
    for (i, byte) in played.iter().enumerate() {
        assert_eq!(*byte, data[i % data.len()], "mismatch at byte {i}");
    }
    assert!(events
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, StreamEvent::Looped { .. })));
    assert_released(&probe);
}

#[test]
fn test_in_flight_never_exceeds_ring_size() {
    let (backend, probe) = MockBackend::new(Completion::Immediate);
    let stream = fast()
        .looping(true)
        .buffer_count(3)
        .start_with(mono_wav(&payload(1000)), move || Ok(backend))
        .unwrap();

    assert!(wait_until(TIMEOUT, || stream.stats().buffers_submitted >= 30));
    stream.request_stop();
    assert!(stream.wait_stopped(TIMEOUT));

    assert!(probe.max_in_flight() <= 3);
    assert!(stream.stats().max_in_flight <= 3);
    assert_eq!(stream.stats().max_in_flight, 3);
    assert_released(&probe);
}

#[test]
fn test_request_stop_reaches_stopped_and_stays_stopped() {
    let (backend, probe) = MockBackend::new(Completion::Manual);
    let stream = Streaming::builder()
        .looping(true)
        .buffer_duration(Duration::from_millis(100))
        .poll_interval(Duration::from_millis(20))
        .start_with(mono_wav(&payload(4000)), move || Ok(backend))
        .unwrap();
    assert!(stream.is_playing());

    let started = Instant::now();
    stream.request_stop();
    assert!(!stream.is_playing());
    assert!(stream.wait_stopped(TIMEOUT));
    assert!(started.elapsed() < Duration::from_secs(2));

    stream.request_stop();
    stream.request_pause(false);
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(stream.state(), PlaybackState::Stopped);
    assert!(!stream.is_playing());
    assert_eq!(probe.stop_calls(), 1);
    assert_released(&probe);
}

#[test]
fn test_pause_resume_keeps_payload_contiguous() {
    let data = payload(2000);
    let (backend, probe) = MockBackend::new(Completion::Manual);
    let stream = fast()
        .start_with(mono_wav(&data), move || Ok(backend))
        .unwrap();

    assert_eq!(probe.complete(1), 1);
    assert!(wait_until(TIMEOUT, || probe.uploads().len() >= 3));

    stream.request_pause(true);
    assert!(wait_until(TIMEOUT, || stream.state() == PlaybackState::Paused));
    assert!(wait_until(TIMEOUT, || !stream.is_playing()));
    assert_eq!(probe.pause_calls(), 1);
    // Nothing plays while paused
    assert_eq!(probe.complete(5), 0);

    stream.request_pause(false);
    assert!(wait_until(TIMEOUT, || stream.state() == PlaybackState::Playing));

    assert!(wait_until(TIMEOUT, || {
        probe.complete(1);
        stream.state() == PlaybackState::Stopped
    }));
    assert_eq!(stream.stop_reason(), Some(StopReason::Finished));
    assert_eq!(probe.played_bytes(), data);
    assert_released(&probe);
}

#[test]
fn test_one_second_mono_file_fills_twice_then_drains() {
    let data = payload(88_200);
    let (backend, probe) = MockBackend::new(Completion::Immediate);
    let (builder, events) = recording(
        Streaming::builder().poll_interval(Duration::from_millis(5)),
    );

    let stream = builder
        .start_with(Cursor::new(wav_bytes(1, 44100, &data)), move || Ok(backend))
        .unwrap();
    assert!(stream.wait_stopped(TIMEOUT));
    // Events are delivered after the state flips
    assert!(wait_until(TIMEOUT, || events
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, StreamEvent::Finished { .. }))));

    let stats = stream.stats();
    assert_eq!(stats.fills, 2);
    assert_eq!(stats.buffers_submitted, 1);
    assert_eq!(stream.stop_reason(), Some(StopReason::Finished));
    assert_eq!(probe.played_bytes(), data);

    let events = events.lock().unwrap();
    assert!(!events
        .iter()
        .any(|e| matches!(e, StreamEvent::ReadFailed { .. })));
    let draining = events.iter().position(|e| {
        *e == StreamEvent::StateChanged {
            previous: PlaybackState::Playing,
            current: PlaybackState::Draining,
        }
    });
    let stopped = events.iter().position(|e| {
        *e == StreamEvent::StateChanged {
            previous: PlaybackState::Draining,
            current: PlaybackState::Stopped,
        }
    });
    assert!(draining.is_some());
    assert!(draining < stopped);
    assert_eq!(
        events.last(),
        Some(&StreamEvent::Finished {
            reason: StopReason::Finished
        })
    );
    assert_released(&probe);
}

#[test]
fn test_missing_data_chunk_starts_no_worker() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&28u32.to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&8000u32.to_le_bytes());
    bytes.extend_from_slice(&16000u32.to_le_bytes());
    bytes.extend_from_slice(&2u16.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());

    let built = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&built);
    let result = fast().start_with(Cursor::new(bytes), move || {
        flag.store(true, Ordering::SeqCst);
        Ok(MockBackend::new(Completion::Immediate).0)
    });

    assert!(matches!(
        result,
        Err(StreamWavError::MissingChunk { tag: "data" })
    ));
    assert!(!built.load(Ordering::SeqCst));
}

#[test]
fn test_unsupported_bit_depth_rejected() {
    let mut format = FormatDescriptor::pcm16(1, 8000, 4);
    format.bits_per_sample = 8;
    let mut bytes = Vec::new();
    write_header(&mut bytes, &format).unwrap();
    bytes.extend_from_slice(&[0; 4]);

    let (backend, probe) = MockBackend::new(Completion::Immediate);
    let result = fast().start_with(Cursor::new(bytes), move || Ok(backend));

    assert!(matches!(
        result,
        Err(StreamWavError::UnsupportedFormat {
            bits_per_sample: 8,
            ..
        })
    ));
    assert_eq!(probe.live_voices(), 0);
}

#[test]
fn test_huge_sample_rate_rejected_before_worker() {
    // 52-byte stereo container whose header claims u32::MAX frames per second
    let mut bytes = wav_bytes(2, 8000, &[0; 8]);
    bytes[24..28].copy_from_slice(&u32::MAX.to_le_bytes());

    let built = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&built);
    let (backend, probe) = MockBackend::new(Completion::Immediate);
    let result = fast().start_with(Cursor::new(bytes), move || {
        flag.store(true, Ordering::SeqCst);
        Ok(backend)
    });

    assert!(matches!(
        result,
        Err(StreamWavError::UnsupportedLayout {
            channels: 2,
            sample_rate: u32::MAX
        })
    ));
    assert!(!built.load(Ordering::SeqCst));
    assert_eq!(probe.live_voices(), 0);
}

#[test]
fn test_oversized_buffer_duration_rejected() {
    let (backend, probe) = MockBackend::new(Completion::Immediate);
    let result = Streaming::builder()
        .buffer_duration(Duration::MAX)
        .start_with(mono_wav(&payload(100)), move || Ok(backend));

    assert!(matches!(result, Err(StreamWavError::InvalidConfig { .. })));
    assert_eq!(probe.live_voices(), 0);
}

#[test]
fn test_buffer_allocation_failure_releases_everything() {
    let (backend, probe) = MockBackend::new(Completion::Immediate);
    probe.limit_buffers(1);

    let result = fast().start_with(mono_wav(&payload(1000)), move || Ok(backend));

    assert!(matches!(
        result,
        Err(StreamWavError::Backend(BackendError::Allocation(_)))
    ));
    assert_released(&probe);
}

#[test]
fn test_voice_allocation_failure_is_reported() {
    let (backend, probe) = MockBackend::new(Completion::Immediate);
    probe.fail_voice_allocation();

    let result = fast().start_with(mono_wav(&payload(1000)), move || Ok(backend));

    assert!(matches!(
        result,
        Err(StreamWavError::Backend(BackendError::Allocation(_)))
    ));
    assert_released(&probe);
}

/// Fails every read at or beyond `fail_at`.
struct FailingSource {
    inner: Cursor<Vec<u8>>,
    fail_at: u64,
}

impl Read for FailingSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.inner.position() >= self.fail_at {
            return Err(std::io::Error::other("device removed"));
        }
        let allowed = (self.fail_at - self.inner.position()) as usize;
        let len = buf.len().min(allowed);
        self.inner.read(&mut buf[..len])
    }
}

impl Seek for FailingSource {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}

#[test]
fn test_read_error_drains_then_stops() {
    let data = payload(2000);
    let source = FailingSource {
        inner: Cursor::new(wav_bytes(1, 8000, &data)),
        fail_at: 44 + 480,
    };
    let (backend, probe) = MockBackend::new(Completion::Immediate);
    let (builder, events) = recording(fast());

    let stream = builder.start_with(source, move || Ok(backend)).unwrap();
    assert!(stream.wait_stopped(TIMEOUT));

    assert_eq!(stream.stop_reason(), Some(StopReason::ReadError));
    // Only whole buffers read before the failure are played
    assert_eq!(probe.played_bytes(), data[..480].to_vec());
    assert!(events
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, StreamEvent::ReadFailed { .. })));
    assert_released(&probe);
}

#[test]
fn test_gain_applied_at_start_and_on_change() {
    let (backend, probe) = MockBackend::new(Completion::Manual);
    let stream = fast()
        .looping(true)
        .gain(0.4)
        .start_with(mono_wav(&payload(1000)), move || Ok(backend))
        .unwrap();

    assert_eq!(probe.gains().first().copied(), Some(0.4));

    stream.set_gain(0.9);
    assert!(wait_until(TIMEOUT, || probe.voice_gain() == Some(0.9)));

    stream.request_stop();
    assert!(stream.wait_stopped(TIMEOUT));
}

#[test]
fn test_dropping_handle_does_not_stop_playback() {
    let data = payload(3000);
    let (backend, probe) = MockBackend::new(Completion::Immediate);
    let stream = fast()
        .start_with(mono_wav(&data), move || Ok(backend))
        .unwrap();
    drop(stream);

    assert!(wait_until(TIMEOUT, || probe.live_voices() == 0));
    assert_eq!(probe.played_bytes(), data);
    assert_released(&probe);
}

#[test]
fn test_stereo_uploads_carry_format() {
    let data = payload(4 * 500);
    let (backend, probe) = MockBackend::new(Completion::Immediate);
    let stream = fast()
        .start_with(Cursor::new(wav_bytes(2, 22050, &data)), move || Ok(backend))
        .unwrap();
    assert!(stream.wait_stopped(TIMEOUT));

    assert!(stream.format().is_stereo());
    let uploads = probe.uploads();
    assert!(!uploads.is_empty());
    for upload in &uploads {
        assert!(upload.stereo);
        assert_eq!(upload.sample_rate, 22050);
        assert_eq!(upload.bytes.len() % 4, 0);
    }
    assert_eq!(probe.played_bytes(), data);
}

#[test]
fn test_empty_payload_finishes_without_uploads() {
    let (backend, probe) = MockBackend::new(Completion::Immediate);
    let stream = fast()
        .looping(true)
        .start_with(mono_wav(&[]), move || Ok(backend))
        .unwrap();

    assert!(stream.wait_stopped(TIMEOUT));
    assert_eq!(stream.stop_reason(), Some(StopReason::Finished));
    assert!(probe.uploads().is_empty());
    assert_released(&probe);
}

#[test]
fn test_open_with_reads_file_from_disk() {
    use tempfile::tempdir;

    let dir = tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    let data = payload(1200);
    std::fs::write(&path, wav_bytes(1, 8000, &data)).unwrap();

    let (backend, probe) = MockBackend::new(Completion::Immediate);
    let stream = fast().open_with(&path, move || Ok(backend)).unwrap();

    assert!(stream.wait_stopped(TIMEOUT));
    assert_eq!(stream.format().payload_size, 1200);
    assert_eq!(probe.played_bytes(), data);
}

#[tokio::test]
async fn test_stopped_future_resolves_after_stop() {
    let (backend, probe) = MockBackend::new(Completion::Manual);
    let stream = fast()
        .looping(true)
        .start_with(mono_wav(&payload(1000)), move || Ok(backend))
        .unwrap();

    let mut states = stream.subscribe();
    stream.request_stop();

    let reason = tokio::time::timeout(TIMEOUT, stream.stopped())
        .await
        .unwrap();
    assert_eq!(reason, Some(StopReason::Requested));
    assert_eq!(*states.borrow_and_update(), PlaybackState::Stopped);
    assert_released(&probe);
}

#[cfg(feature = "cpal-backend")]
#[test]
#[ignore = "requires audio hardware"]
fn test_real_playback() {
    let data = vec![0u8; 44100 * 2];
    let stream = Streaming::builder()
        .start(Cursor::new(wav_bytes(1, 44100, &data)))
        .unwrap();
    assert!(stream.wait_stopped(Duration::from_secs(5)));
}
