//! RIFF/WAVE container handling.
//!
//! The container is a 12-byte `RIFF`/`WAVE` header followed by tagged chunks,
//! each with a 4-byte tag and a 4-byte little-endian size. Playback needs the
//! `fmt ` chunk (encoding metadata) and the `data` chunk (raw PCM payload);
//! everything else is skipped.

mod parse;
mod write;

pub use parse::parse_header;
pub use write::write_header;

use std::time::Duration;

/// Size of the `RIFF` + size + `WAVE` preamble. Chunks start here.
pub const RIFF_HEADER_SIZE: u64 = 12;

/// Size of a chunk header (tag + little-endian size).
pub const CHUNK_HEADER_SIZE: u64 = 8;

/// Size of a canonical PCM header written by [`write_header`].
pub const CANONICAL_HEADER_SIZE: usize = 44;

/// Format tag for linear PCM.
pub const FORMAT_PCM: u16 = 1;

/// The only supported bit depth.
pub const SUPPORTED_BITS_PER_SAMPLE: u16 = 16;

/// Highest sample rate accepted from a container.
pub const MAX_SAMPLE_RATE: u32 = 384_000;

/// Encoding metadata recovered from the `fmt ` and `data` chunks.
///
/// Immutable once parsed. Only 16-bit linear PCM with one or two channels
/// passes validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatDescriptor {
    /// Format tag (1 = linear PCM).
    pub format_tag: u16,
    /// Number of interleaved channels.
    pub channels: u16,
    /// Frames per second.
    pub sample_rate: u32,
    /// Bits per sample.
    pub bits_per_sample: u16,
    /// Size of the PCM payload in bytes.
    pub payload_size: u64,
}

impl FormatDescriptor {
    /// Creates a 16-bit PCM descriptor.
    pub fn pcm16(channels: u16, sample_rate: u32, payload_size: u64) -> Self {
        Self {
            format_tag: FORMAT_PCM,
            channels,
            sample_rate,
            bits_per_sample: SUPPORTED_BITS_PER_SAMPLE,
            payload_size,
        }
    }

    /// Returns `true` for two-channel audio.
    pub fn is_stereo(&self) -> bool {
        self.channels == 2
    }

    /// Bytes per frame (one sample for every channel).
    pub fn block_align(&self) -> u16 {
        self.channels.saturating_mul(self.bits_per_sample / 8)
    }

    /// Bytes per second of playback, or `None` if that does not fit a `u32`.
    pub fn byte_rate(&self) -> Option<u32> {
        self.sample_rate.checked_mul(u32::from(self.block_align()))
    }

    /// Number of complete frames in the payload.
    pub fn frames(&self) -> u64 {
        match self.block_align() {
            0 => 0,
            align => self.payload_size / u64::from(align),
        }
    }

    /// Playback length of the payload.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / f64::from(self.sample_rate))
    }
}

/// A parsed container header: the format plus where its payload begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    /// Validated encoding metadata.
    pub format: FormatDescriptor,
    /// Absolute byte offset of the first payload byte.
    pub payload_offset: u64,
}
