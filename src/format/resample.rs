//! Sample rate conversion.
//!
//! Linear interpolation over interleaved audio. A [`Resampler`] is fed one
//! buffer at a time and carries its read position and the previous buffer's
//! last frame across calls, so consecutive buffers join without a repeated
//! or skipped frame and the output length tracks the rate ratio exactly.

/// Streaming linear resampler for interleaved `i16` audio.
///
/// # Example
///
/// ```
/// use stream_wav::format::Resampler;
///
/// let mut resampler = Resampler::new(1, 1, 2);
/// let mut out = resampler.process(&[0, 100]);
/// out.extend(resampler.process(&[200, 300]));
/// assert_eq!(out, [0, 50, 100, 150, 200, 250]);
/// ```
#[derive(Debug, Clone)]
pub struct Resampler {
    channels: usize,
    from_rate: u32,
    to_rate: u32,
    /// Input frames advanced per output frame.
    step: f64,
    /// Read position relative to the next input's first frame; `-1.0`
    /// addresses `last`.
    position: f64,
    last: Vec<i16>,
}

impl Resampler {
    /// Creates a resampler from `from_rate` to `to_rate` for `channels`.
    pub fn new(channels: u16, from_rate: u32, to_rate: u32) -> Self {
        let channels = usize::from(channels.max(1));
        Self {
            channels,
            from_rate,
            to_rate,
            step: f64::from(from_rate.max(1)) / f64::from(to_rate.max(1)),
            position: 0.0,
            last: Vec::with_capacity(channels),
        }
    }

    /// Returns `true` if this resampler converts `channels` at `from_rate` to `to_rate`.
    pub fn matches(&self, channels: u16, from_rate: u32, to_rate: u32) -> bool {
        self.channels == usize::from(channels.max(1))
            && self.from_rate == from_rate
            && self.to_rate == to_rate
    }

    /// Returns `true` when no conversion is needed.
    pub fn is_passthrough(&self) -> bool {
        self.from_rate == self.to_rate || self.from_rate == 0 || self.to_rate == 0
    }

    /// Forgets the carried position, as after a discontinuity.
    pub fn reset(&mut self) {
        self.position = 0.0;
        self.last.clear();
    }

    /// Converts the next piece of the stream.
    ///
    /// A trailing partial frame is dropped. The final input frame is held
    /// back until the next call needs it as an interpolation partner.
    pub fn process(&mut self, samples: &[i16]) -> Vec<i16> {
        if self.is_passthrough() {
            return samples.to_vec();
        }

        let channels = self.channels;
        let frames = samples.len() / channels;
        if frames == 0 {
            return Vec::new();
        }
        if self.last.is_empty() {
            // Nothing carried: start exactly on the first frame
            self.position = self.position.max(0.0);
        }

        let end = (frames - 1) as f64;
        let estimate = ((end - self.position) / self.step).max(0.0).ceil() as usize + 1;
        let mut output = Vec::with_capacity(estimate * channels);
        let mut position = self.position;
        while position < end {
            let index = position.floor();
            let frac = position - index;
            let a = frame(samples, &self.last, channels, index as isize);
            let b = frame(samples, &self.last, channels, index as isize + 1);
            for (&s1, &s2) in a.iter().zip(b) {
                let (s1, s2) = (f64::from(s1), f64::from(s2));
                output.push((s1 + (s2 - s1) * frac) as i16);
            }
            position += self.step;
        }

        self.position = position - frames as f64;
        self.last.clear();
        self.last
            .extend_from_slice(&samples[(frames - 1) * channels..frames * channels]);
        output
    }
}

/// Frame `index` of `samples`, where `-1` is the carried frame.
fn frame<'a>(samples: &'a [i16], last: &'a [i16], channels: usize, index: isize) -> &'a [i16] {
    if index < 0 {
        last
    } else {
        let start = index as usize * channels;
        &samples[start..start + channels]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resample_same_rate() {
        let samples = vec![100i16, 200, 300];
        let mut resampler = Resampler::new(1, 16000, 16000);
        assert!(resampler.is_passthrough());
        assert_eq!(resampler.process(&samples), samples);
    }

    #[test]
    fn test_resample_empty() {
        let mut resampler = Resampler::new(1, 16000, 8000);
        assert!(resampler.process(&[]).is_empty());
    }

    #[test]
    fn test_resample_downsample() {
        // 48kHz to 16kHz = 3:1 ratio
        let samples: Vec<i16> = (0..480).map(|i| (i * 10) as i16).collect();
        let resampled = Resampler::new(1, 48000, 16000).process(&samples);
        assert_eq!(resampled.len(), 160);
        assert_eq!(resampled[1], 30);
    }

    #[test]
    fn test_resample_precision_boundary() {
        // 2x upsample: original samples land on even indices
        let samples = vec![0i16, 100, 200, 300];
        let result = Resampler::new(1, 1, 2).process(&samples);

        assert_eq!(result, [0, 50, 100, 150, 200, 250]);
    }

    #[test]
    fn test_split_input_matches_whole() {
        let samples: Vec<i16> = (0..64).map(|i| (i * 100) as i16).collect();
        let whole = Resampler::new(1, 1, 2).process(&samples);

        let mut resampler = Resampler::new(1, 1, 2);
        let split: Vec<i16> = samples
            .chunks(10)
            .flat_map(|chunk| resampler.process(chunk))
            .collect();

        assert_eq!(split, whole);
    }

    #[test]
    fn test_no_drift_across_buffers() {
        // 110 buffers of 400 frames at 44.1kHz is 44000 frames; at 48kHz
        // that is 47891.2 frames, less the one frame still held back
        let mut resampler = Resampler::new(1, 44100, 48000);
        let total: usize = (0..110)
            .map(|_| resampler.process(&[0i16; 400]).len())
            .sum();
        assert!((47_889..=47_892).contains(&total), "got {total}");
    }

    #[test]
    fn test_buffer_boundary_not_repeated() {
        // 2:1 downsample of a ramp split mid-way keeps the ramp strictly rising
        let samples: Vec<i16> = (0..21).map(|i| i as i16).collect();
        let mut resampler = Resampler::new(1, 2, 1);
        let mut out = resampler.process(&samples[..7]);
        out.extend(resampler.process(&samples[7..]));
        assert_eq!(out, [0, 2, 4, 6, 8, 10, 12, 14, 16, 18]);
    }

    #[test]
    fn test_interleaved_keeps_channels_apart() {
        // Left is constant 100, right is constant -100
        let samples: Vec<i16> = (0..8).flat_map(|_| [100i16, -100]).collect();
        let mut resampler = Resampler::new(2, 8000, 16000);
        let mut result = resampler.process(&samples);
        result.extend(resampler.process(&samples));

        assert_eq!(result.len() % 2, 0);
        assert!(!result.is_empty());
        assert!(result.chunks_exact(2).all(|f| f[0] == 100 && f[1] == -100));
    }

    #[test]
    fn test_reset_forgets_carried_frame() {
        let mut resampler = Resampler::new(1, 1, 2);
        resampler.process(&[1000, 1000]);
        resampler.reset();
        assert_eq!(resampler.process(&[0, 100]), [0, 50]);
    }

    #[test]
    fn test_matches() {
        let resampler = Resampler::new(2, 44100, 48000);
        assert!(resampler.matches(2, 44100, 48000));
        assert!(!resampler.matches(1, 44100, 48000));
        assert!(!resampler.matches(2, 22050, 48000));
    }
}
