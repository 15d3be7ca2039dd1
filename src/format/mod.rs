//! Sample conversion for output devices.
//!
//! Containers carry little-endian 16-bit PCM in one or two channels at any
//! sample rate, while output devices have their own channel count and rate.
//! This module provides:
//! - Byte decoding and sample format conversion (LE bytes → i16 → f32)
//! - Channel mapping (mono/stereo → any device channel count)
//! - Sample rate conversion (linear interpolation)

mod convert;
mod resample;

pub use convert::{i16_to_f32, map_channels, pcm_bytes_to_i16};
pub use resample::Resampler;
