//! Sample format and channel conversion.

/// Converts i16 samples to f32.
///
/// Output will be in the range [-1.0, 1.0].
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / 32768.0
}

/// Decodes little-endian 16-bit PCM bytes into samples.
///
/// A trailing odd byte (half a sample) is ignored.
pub fn pcm_bytes_to_i16(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Re-lays interleaved frames from `from` channels onto `to` channels.
///
/// - Same count: copied unchanged
/// - Mono source: the sample is duplicated into every output channel
/// - Multi-channel into mono: channels are averaged
/// - Otherwise: leading channels are copied, extra outputs are silent
pub fn map_channels(samples: &[i16], from: u16, to: u16) -> Vec<i16> {
    if from == to || from == 0 || to == 0 {
        return samples.to_vec();
    }

    let from = usize::from(from);
    let to = usize::from(to);
    let frames = samples.len() / from;
    let mut output = Vec::with_capacity(frames * to);

    for frame in samples.chunks_exact(from) {
        if from == 1 {
            output.extend(std::iter::repeat(frame[0]).take(to));
        } else if to == 1 {
            // Average the channels, avoiding overflow
            let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
            output.push((sum / from as i32) as i16);
        } else {
            for channel in 0..to {
                output.push(frame.get(channel).copied().unwrap_or(0));
            }
        }
    }

    output
}
